use anyhow::anyhow;
use cardwise::{demo_backend, TerminalApp};
use cardwise_core::{telemetry, ClientContext, ClientSettings, FileStorage, Registration, Url};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "cardwise", version, about = "Credit-card assistant in the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Override the API base URL from cardwise.yaml.
    #[arg(long, global = true)]
    api_url: Option<Url>,
    /// Directory holding the stored session.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Talk to a built-in demo backend instead of the network.
    #[arg(long, global = true)]
    offline: bool,
    /// Print JSON instead of formatted text.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in; prompts for the password when it is not given.
    Login {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    Register {
        username: String,
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    Logout,
    /// Show the signed-in user.
    Whoami {
        #[arg(long)]
        refresh: bool,
    },
    #[command(subcommand)]
    Cards(CardsCommand),
    /// Interactive chat, or a single question with `--message`.
    Chat {
        #[arg(long, short)]
        message: Option<String>,
    },
    /// Print the stored chat history.
    History,
}

#[derive(Subcommand, Debug)]
enum CardsCommand {
    List,
    Show { id: i64 },
    Compare { ids: Vec<i64> },
}

fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(telemetry::env_filter())?;
    let cli = Cli::parse();

    let mut settings = ClientSettings::load().map_err(|err| anyhow!(err.user_message()))?;
    if let Some(url) = cli.api_url {
        settings.api_base_url = url;
    }
    if let Some(dir) = cli.data_dir {
        settings.data_dir = Some(dir);
    }

    let storage = Arc::new(FileStorage::open(&settings.storage_dir())?);
    let runtime = Runtime::new()?;
    let (context, events) = if cli.offline {
        ClientContext::with_transport(settings, Arc::new(demo_backend()), storage)
    } else {
        ClientContext::connect(settings, storage)?
    };
    let mut app = TerminalApp::new(context, events, runtime).with_json(cli.json);

    match cli.command {
        Command::Login { username, password } => {
            let password = password_or_prompt(password)?;
            app.login(&username, &password)
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let password = password_or_prompt(password)?;
            app.register(&Registration {
                username,
                email,
                password,
            })
        }
        Command::Logout => {
            app.logout();
            Ok(())
        }
        Command::Whoami { refresh } => app.whoami(refresh),
        Command::Cards(CardsCommand::List) => app.list_cards(),
        Command::Cards(CardsCommand::Show { id }) => app.show_card(id),
        Command::Cards(CardsCommand::Compare { ids }) => app.compare_cards(&ids),
        Command::Chat { message: Some(text) } => app.ask(&text),
        Command::Chat { message: None } => app.chat(),
        Command::History => app.history(),
    }
}

fn password_or_prompt(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    print!("password: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
