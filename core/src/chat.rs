use crate::api::{ChatApi, HistoryEntry, HistoryRole};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use scopeguard::ScopeGuard;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Server-side record id, known only for messages loaded from history.
    #[serde(default)]
    pub remote_id: Option<i64>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            remote_id: None,
        }
    }
}

impl From<HistoryEntry> for Message {
    fn from(entry: HistoryEntry) -> Self {
        let role = match entry.role {
            HistoryRole::User => MessageRole::User,
            HistoryRole::Assistant => MessageRole::Assistant,
        };
        Self {
            role,
            content: entry.content,
            timestamp: entry.created_at,
            remote_id: Some(entry.id),
        }
    }
}

/// Point-in-time copy of the conversation for rendering.
#[derive(Debug, Clone, Default)]
pub struct ConversationSnapshot {
    pub messages: Vec<Message>,
    pub session_id: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct ConversationState {
    messages: Vec<Message>,
    session_id: Option<String>,
    error: Option<String>,
    /// Operations issued and not yet settled, queued ones included.
    pending: usize,
    /// Bumped by every reset; replies started under an older epoch are dropped.
    epoch: u64,
}

impl ConversationState {
    fn reset(&mut self, session_id: Option<String>) {
        self.messages.clear();
        self.session_id = session_id;
        self.error = None;
        self.epoch += 1;
    }
}

fn new_session_id() -> String {
    Uuid::now_v7().to_string()
}

/// Ordered chat log with its session id and loading/error flags.
///
/// Network-backed operations run one at a time in call order, so every
/// assistant reply lands directly after the user message that triggered it.
#[derive(Clone)]
pub struct ConversationStore {
    state: Arc<RwLock<ConversationState>>,
    turn: Arc<Mutex<()>>,
    api: ChatApi,
}

impl ConversationStore {
    pub fn new(api: ChatApi) -> Self {
        Self {
            state: Arc::new(RwLock::new(ConversationState::default())),
            turn: Arc::new(Mutex::new(())),
            api,
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.read().messages.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.state.read().session_id.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().pending > 0
    }

    pub fn error(&self) -> Option<String> {
        self.state.read().error.clone()
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        let state = self.state.read();
        ConversationSnapshot {
            messages: state.messages.clone(),
            session_id: state.session_id.clone(),
            is_loading: state.pending > 0,
            error: state.error.clone(),
        }
    }

    /// Appends `text` as a user message and, on success, the assistant reply.
    ///
    /// Failures are recorded in [`error`](Self::error); the user message stays.
    /// Returns the appended assistant message.
    pub async fn send_message(&self, text: &str) -> Option<Message> {
        if text.trim().is_empty() {
            return None;
        }
        let _loading = self.track_loading();
        let _turn = self.turn.lock().await;

        let (session_id, epoch) = {
            let mut state = self.state.write();
            let session_id = state
                .session_id
                .get_or_insert_with(new_session_id)
                .clone();
            state.error = None;
            state.messages.push(Message::new(MessageRole::User, text));
            (session_id, state.epoch)
        };
        debug!(session_id = %session_id, "sending chat message");

        match self.api.send(text, &session_id).await {
            Ok(reply) => {
                let mut state = self.state.write();
                if state.epoch != epoch {
                    debug!("conversation was cleared while waiting, dropping reply");
                    return None;
                }
                let message = Message::new(MessageRole::Assistant, reply.response);
                state.messages.push(message.clone());
                Some(message)
            }
            Err(err) => {
                warn!(%err, "chat message failed");
                let mut state = self.state.write();
                if state.epoch == epoch {
                    state.error = Some(err.user_message());
                }
                None
            }
        }
    }

    /// Local reset: no network call.
    pub fn clear_chat(&self) {
        self.state.write().reset(None);
    }

    /// Replaces the log with the server-side history, oldest first.
    pub async fn load_history(&self) -> bool {
        let _loading = self.track_loading();
        let _turn = self.turn.lock().await;
        let epoch = self.begin_turn();

        match self.api.history().await {
            Ok(mut entries) => {
                // The backend lists newest rows first, each as a user/assistant pair.
                entries.sort_by_key(|entry| (entry.created_at, entry.id));
                let messages: Vec<Message> = entries.into_iter().map(Message::from).collect();
                info!(count = messages.len(), "loaded chat history");
                self.apply(epoch, |state| state.messages = messages);
                true
            }
            Err(err) => self.record_failure("load chat history", err, epoch),
        }
    }

    /// Starts a new server-side conversation and resets the local log.
    pub async fn new_conversation(&self) -> bool {
        let _loading = self.track_loading();
        let _turn = self.turn.lock().await;
        let epoch = self.begin_turn();

        match self.api.new_conversation().await {
            Ok(created) => {
                self.apply(epoch, |state| state.reset(created.session_id));
                true
            }
            Err(err) => self.record_failure("start a new conversation", err, epoch),
        }
    }

    /// Deletes the server-side history and resets the local log.
    pub async fn clear_history(&self) -> bool {
        let _loading = self.track_loading();
        let _turn = self.turn.lock().await;
        let epoch = self.begin_turn();

        match self.api.clear_history().await {
            Ok(_) => {
                self.apply(epoch, |state| state.reset(None));
                true
            }
            Err(err) => self.record_failure("clear chat history", err, epoch),
        }
    }

    /// Deletes one stored exchange and drops its local copies.
    pub async fn delete_message(&self, id: i64) -> bool {
        let _loading = self.track_loading();
        let _turn = self.turn.lock().await;
        let epoch = self.begin_turn();

        match self.api.delete_message(id).await {
            Ok(_) => {
                self.apply(epoch, |state| {
                    state.messages.retain(|message| message.remote_id != Some(id))
                });
                true
            }
            Err(err) => self.record_failure("delete chat message", err, epoch),
        }
    }

    /// Clears the previous error and returns the epoch the turn runs under.
    fn begin_turn(&self) -> u64 {
        let mut state = self.state.write();
        state.error = None;
        state.epoch
    }

    /// Runs `update` unless the conversation was reset since `epoch`.
    fn apply(&self, epoch: u64, update: impl FnOnce(&mut ConversationState)) {
        let mut state = self.state.write();
        if state.epoch != epoch {
            debug!("conversation was cleared while waiting, dropping result");
            return;
        }
        update(&mut state);
    }

    fn record_failure(&self, action: &str, err: crate::error::ApiError, epoch: u64) -> bool {
        warn!(%err, action, "chat operation failed");
        let message = err.user_message();
        self.apply(epoch, |state| state.error = Some(message));
        false
    }

    /// Counts the caller as in flight until the returned guard drops, including
    /// when the future is cancelled.
    fn track_loading(
        &self,
    ) -> ScopeGuard<Arc<RwLock<ConversationState>>, impl FnOnce(Arc<RwLock<ConversationState>>)>
    {
        self.state.write().pending += 1;
        scopeguard::guard(self.state.clone(), |state| {
            let mut state = state.write();
            state.pending = state.pending.saturating_sub(1);
        })
    }
}
