use crate::render;
use anyhow::{anyhow, bail, Result};
use cardwise_core::{ClientContext, Credentials, Registration, Route, SessionEvent};
use std::io::{self, BufRead, Write};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// Terminal front-end over a [`ClientContext`].
pub struct TerminalApp {
    context: ClientContext,
    events: UnboundedReceiver<SessionEvent>,
    runtime: Runtime,
    json: bool,
}

impl TerminalApp {
    pub fn new(
        context: ClientContext,
        events: UnboundedReceiver<SessionEvent>,
        runtime: Runtime,
    ) -> Self {
        Self {
            context,
            events,
            runtime,
            json: false,
        }
    }

    /// Print machine-readable JSON instead of formatted text.
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let credentials = Credentials::new(username, password);
        let signed_in = self.runtime.block_on(self.context.login(&credentials));
        self.pump_events();
        if !signed_in {
            bail!("Sign-in failed. Check your username and password.");
        }
        let name = self
            .context
            .auth()
            .user()
            .map(|user| user.display_name())
            .unwrap_or_else(|| username.to_string());
        println!("Signed in as {name}.");
        Ok(())
    }

    pub fn register(&mut self, registration: &Registration) -> Result<()> {
        let created = self
            .runtime
            .block_on(self.context.auth().register(registration));
        self.pump_events();
        if !created {
            bail!("Registration failed.");
        }
        println!(
            "Account {} created. Sign in with `cardwise login {}`.",
            registration.username, registration.username
        );
        Ok(())
    }

    pub fn logout(&mut self) {
        self.context.logout();
        self.pump_events();
        println!("Signed out.");
    }

    pub fn whoami(&mut self, refresh: bool) -> Result<()> {
        self.enter(Route::Profile)?;
        if refresh && !self.runtime.block_on(self.context.auth().get_user_info()) {
            self.pump_events();
            bail!("Could not refresh your profile.");
        }
        let user = self
            .context
            .auth()
            .user()
            .ok_or_else(|| anyhow!("No profile is stored for this session."))?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&user)?);
        } else {
            println!("{}", render::user(&user));
        }
        Ok(())
    }

    pub fn list_cards(&mut self) -> Result<()> {
        self.enter(Route::Cards)?;
        let cards = self.runtime.block_on(self.context.cards().list());
        self.pump_events();
        let cards = cards.map_err(|err| anyhow!(err.user_message()))?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&cards)?);
            return Ok(());
        }
        if cards.is_empty() {
            println!("No cards available.");
        }
        for card in &cards {
            println!("{}", render::card_line(card));
        }
        Ok(())
    }

    pub fn show_card(&mut self, id: i64) -> Result<()> {
        self.enter(Route::CardDetail(id))?;
        let card = self.runtime.block_on(self.context.cards().detail(id));
        self.pump_events();
        let card = card.map_err(|err| anyhow!(err.user_message()))?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&card)?);
        } else {
            println!("{}", render::card_detail(&card));
        }
        Ok(())
    }

    pub fn compare_cards(&mut self, ids: &[i64]) -> Result<()> {
        if ids.len() < 2 {
            bail!("Pick at least two cards to compare.");
        }
        self.enter(Route::Compare)?;
        let cards = self.runtime.block_on(self.context.cards().compare(ids));
        self.pump_events();
        let cards = cards.map_err(|err| anyhow!(err.user_message()))?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&cards)?);
        } else {
            println!("{}", render::comparison(&cards));
        }
        Ok(())
    }

    pub fn history(&mut self) -> Result<()> {
        self.enter(Route::Chat)?;
        let conversation = self.context.conversation().clone();
        let loaded = self.runtime.block_on(conversation.load_history());
        self.pump_events();
        if !loaded {
            bail!(conversation
                .error()
                .unwrap_or_else(|| "Could not load chat history.".to_string()));
        }
        for message in conversation.messages() {
            println!("{}", render::message(&message));
        }
        Ok(())
    }

    /// Sends one message and prints the reply.
    pub fn ask(&mut self, text: &str) -> Result<()> {
        self.enter(Route::Chat)?;
        let conversation = self.context.conversation().clone();
        let reply = self.runtime.block_on(conversation.send_message(text));
        self.pump_events();
        match reply {
            Some(message) => {
                println!("{}", render::message(&message));
                Ok(())
            }
            None => match conversation.error() {
                Some(error) => bail!(error),
                None => Ok(()),
            },
        }
    }

    /// Interactive chat on stdin until `/quit` or end of input.
    pub fn chat(&mut self) -> Result<()> {
        self.enter(Route::Chat)?;
        println!("Ask about credit cards. Commands: /new /history /clear /delete ID /reset /quit");
        let conversation = self.context.conversation().clone();
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();

        loop {
            print!("> ");
            io::stdout().flush()?;
            let Some(line) = lines.next() else {
                break;
            };
            let line = line?;
            let input = line.trim();

            match input {
                "" => continue,
                "/quit" | "/exit" => break,
                "/reset" => {
                    conversation.clear_chat();
                    println!("(local conversation cleared)");
                }
                "/new" => {
                    if self.runtime.block_on(conversation.new_conversation()) {
                        println!("(started a new conversation)");
                    }
                }
                "/clear" => {
                    if self.runtime.block_on(conversation.clear_history()) {
                        println!("(history deleted)");
                    }
                }
                "/history" => {
                    if self.runtime.block_on(conversation.load_history()) {
                        for message in conversation.messages() {
                            println!("{}", render::message(&message));
                        }
                    }
                }
                command if command.starts_with("/delete") => {
                    let id = command.trim_start_matches("/delete").trim().parse::<i64>();
                    match id {
                        Ok(id) => {
                            if self.runtime.block_on(conversation.delete_message(id)) {
                                println!("(deleted exchange {id})");
                            }
                        }
                        Err(_) => println!("usage: /delete ID"),
                    }
                }
                text => {
                    if let Some(reply) = self.runtime.block_on(conversation.send_message(text)) {
                        println!("{}", render::message(&reply));
                    }
                }
            }

            if let Some(error) = conversation.error() {
                eprintln!("error: {error}");
            }
            if self.pump_events() {
                bail!("Your session has expired. Sign in again with `cardwise login`.");
            }
        }

        info!(messages = conversation.messages().len(), "chat session ended");
        Ok(())
    }

    fn enter(&mut self, target: Route) -> Result<()> {
        let entered = self.context.navigate(target.clone());
        self.pump_events();
        if entered != target {
            bail!("Please sign in first with `cardwise login <username>`.");
        }
        Ok(())
    }

    /// Drains pending session events. Returns whether the credential expired.
    fn pump_events(&mut self) -> bool {
        let mut expired = false;
        while let Ok(event) = self.events.try_recv() {
            debug!(?event, "session event");
            if let SessionEvent::AuthExpired { path } = &event {
                eprintln!("Your session has expired ({path}). Please sign in again.");
                expired = true;
            }
        }
        expired
    }
}
