use crate::api::{AuthApi, Credentials, Registration, User};
use crate::pipeline::CredentialSource;
use crate::storage::{DurableStorage, TOKEN_KEY, USER_KEY};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

/// Opaque bearer credential. Expiry is informational; the server decides.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Default, Clone)]
struct Session {
    credential: Option<Credential>,
    user: Option<User>,
}

/// Sole owner of the in-memory credential and user, mirrored into durable storage.
///
/// Clones share the same state. The authenticated flag is always derived from
/// the current credential and user.
#[derive(Clone)]
pub struct AuthHandle {
    session: Arc<RwLock<Session>>,
    storage: Arc<dyn DurableStorage>,
}

impl AuthHandle {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self {
            session: Arc::new(RwLock::new(Session::default())),
            storage,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        let session = self.session.read();
        session.credential.is_some() && session.user.is_some()
    }

    pub fn user(&self) -> Option<User> {
        self.session.read().user.clone()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.session.read().credential.clone()
    }

    /// Loads credential and user from durable storage without contacting the server.
    fn restore(&self) {
        let credential = self.storage.get(TOKEN_KEY).map(Credential::new);
        let user = self
            .storage
            .get(USER_KEY)
            .and_then(|raw| match serde_json::from_str::<User>(&raw) {
                Ok(user) => Some(user),
                Err(err) => {
                    warn!(%err, "stored user profile is unreadable, ignoring it");
                    None
                }
            });
        let mut session = self.session.write();
        session.credential = credential;
        session.user = user;
    }

    fn establish(&self, credential: Credential, user: User) {
        self.persist(Some(&credential.token), Some(&user));
        let mut session = self.session.write();
        session.credential = Some(credential);
        session.user = Some(user);
    }

    fn replace_user(&self, user: User) {
        self.persist(None, Some(&user));
        self.session.write().user = Some(user);
    }

    /// Drops credential and user from memory and durable storage.
    pub(crate) fn clear(&self) {
        {
            let mut session = self.session.write();
            session.credential = None;
            session.user = None;
        }
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(err) = self.storage.remove(key) {
                warn!(%err, key, "failed to clear client storage entry");
            }
        }
    }

    fn persist(&self, token: Option<&str>, user: Option<&User>) {
        if let Some(token) = token {
            if let Err(err) = self.storage.set(TOKEN_KEY, token) {
                warn!(%err, "failed to persist credential");
            }
        }
        if let Some(user) = user {
            match serde_json::to_string(user) {
                Ok(serialized) => {
                    if let Err(err) = self.storage.set(USER_KEY, &serialized) {
                        warn!(%err, "failed to persist user profile");
                    }
                }
                Err(err) => warn!(%err, "failed to serialize user profile"),
            }
        }
    }
}

impl CredentialSource for AuthHandle {
    fn bearer_token(&self) -> Option<String> {
        self.session
            .read()
            .credential
            .as_ref()
            .map(|credential| credential.token.clone())
    }
}

/// Login, logout and profile refresh on top of [`AuthHandle`].
#[derive(Clone)]
pub struct AuthStore {
    handle: AuthHandle,
    api: AuthApi,
}

impl AuthStore {
    pub fn new(handle: AuthHandle, api: AuthApi) -> Self {
        Self { handle, api }
    }

    pub fn handle(&self) -> &AuthHandle {
        &self.handle
    }

    pub fn is_authenticated(&self) -> bool {
        self.handle.is_authenticated()
    }

    pub fn user(&self) -> Option<User> {
        self.handle.user()
    }

    pub fn token(&self) -> Option<String> {
        self.handle.bearer_token()
    }

    /// Restores the previous session from durable storage. Stale tokens are
    /// discovered by the first authenticated call.
    pub fn init(&self) {
        self.handle.restore();
        info!(
            authenticated = self.handle.is_authenticated(),
            "restored client session"
        );
    }

    pub async fn login(&self, credentials: &Credentials) -> bool {
        match self.api.login(credentials).await {
            Ok(grant) => {
                let user = grant.user;
                info!(user_id = user.id, "signed in");
                self.handle
                    .establish(Credential::new(grant.access_token), user);
                true
            }
            Err(err) => {
                warn!(%err, username = %credentials.username, "login failed");
                false
            }
        }
    }

    pub fn logout(&self) {
        self.handle.clear();
        info!("signed out");
    }

    pub async fn get_user_info(&self) -> bool {
        match self.api.profile().await {
            Ok(user) => {
                self.handle.replace_user(user);
                true
            }
            Err(err) => {
                warn!(%err, "failed to refresh user profile");
                false
            }
        }
    }

    /// Creates an account. The caller signs in separately afterwards.
    pub async fn register(&self, registration: &Registration) -> bool {
        match self.api.register(registration).await {
            Ok(_) => {
                info!(username = %registration.username, "registered account");
                true
            }
            Err(err) => {
                warn!(%err, username = %registration.username, "registration failed");
                false
            }
        }
    }
}
