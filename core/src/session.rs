use crate::api::{AuthApi, CardsApi, ChatApi, Credentials};
use crate::auth::{AuthHandle, AuthStore};
use crate::chat::ConversationStore;
use crate::config::ClientSettings;
use crate::pipeline::{AuthExpired, AuthExpiryHandler, CredentialSource, Pipeline};
use crate::router::{Navigator, Route};
use crate::storage::DurableStorage;
use crate::transport::{ReqwestTransport, Transport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// Notifications for the front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    AuthExpired { path: String },
    Navigated { route: Route },
    LoggedIn { user_id: i64 },
    LoggedOut,
}

/// Single owner of the reaction to a rejected credential: clear the session,
/// wipe durable storage and send the user to the login view.
///
/// A 401 for a request that carried a token other than the current one is
/// ignored, so a reply still in flight across a re-login keeps the new session.
struct ExpiryCoordinator {
    auth: AuthHandle,
    navigator: Navigator,
    events: UnboundedSender<SessionEvent>,
}

impl AuthExpiryHandler for ExpiryCoordinator {
    fn auth_expired(&self, signal: &AuthExpired) {
        if let Some(sent) = signal.credential_sent.as_deref() {
            if self.auth.bearer_token().as_deref() != Some(sent) {
                debug!(path = %signal.path, "rejected credential was already replaced");
                return;
            }
        }
        info!(method = %signal.method, path = %signal.path, "credential expired");
        self.auth.clear();
        self.events
            .send(SessionEvent::AuthExpired {
                path: signal.path.clone(),
            })
            .ok();
        self.navigator.force_login();
    }
}

/// Everything a running client needs, built once at startup and passed by reference.
pub struct ClientContext {
    settings: ClientSettings,
    auth: AuthStore,
    conversation: ConversationStore,
    cards: CardsApi,
    navigator: Navigator,
    events_tx: UnboundedSender<SessionEvent>,
}

impl ClientContext {
    /// Wires the context over the network transport.
    pub fn connect(
        settings: ClientSettings,
        storage: Arc<dyn DurableStorage>,
    ) -> anyhow::Result<(Self, UnboundedReceiver<SessionEvent>)> {
        let transport = Arc::new(ReqwestTransport::new(settings.request_timeout)?);
        Ok(Self::with_transport(settings, transport, storage))
    }

    pub fn with_transport(
        settings: ClientSettings,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn DurableStorage>,
    ) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = unbounded_channel();
        let handle = AuthHandle::new(storage);
        let navigator = Navigator::new(events_tx.clone());
        let expiry: Arc<dyn AuthExpiryHandler> = Arc::new(ExpiryCoordinator {
            auth: handle.clone(),
            navigator: navigator.clone(),
            events: events_tx.clone(),
        });

        let authenticated = Pipeline::authenticated(
            settings.api_base_url.clone(),
            transport.clone(),
            Arc::new(handle.clone()),
            expiry.clone(),
        );
        let public = Pipeline::public(settings.public_base_url(), transport, expiry);

        let context = Self {
            auth: AuthStore::new(handle, AuthApi::new(public, authenticated.clone())),
            conversation: ConversationStore::new(ChatApi::new(authenticated.clone())),
            cards: CardsApi::new(authenticated),
            navigator,
            events_tx,
            settings,
        };
        context.auth.init();
        (context, events_rx)
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub fn conversation(&self) -> &ConversationStore {
        &self.conversation
    }

    pub fn cards(&self) -> &CardsApi {
        &self.cards
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// Applies the navigation guard against the current auth state.
    pub fn navigate(&self, target: Route) -> Route {
        self.navigator
            .navigate(target, self.auth.is_authenticated())
    }

    pub async fn login(&self, credentials: &Credentials) -> bool {
        if !self.auth.login(credentials).await {
            return false;
        }
        if let Some(user) = self.auth.user() {
            self.events_tx
                .send(SessionEvent::LoggedIn { user_id: user.id })
                .ok();
        }
        true
    }

    /// Signs out and drops the local conversation with it.
    pub fn logout(&self) {
        self.auth.logout();
        self.conversation.clear_chat();
        self.events_tx.send(SessionEvent::LoggedOut).ok();
        self.navigator.force_login();
    }
}
