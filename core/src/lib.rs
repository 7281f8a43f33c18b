pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod router;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod transport;

pub use api::{CreditCard, Credentials, Registration, User};
pub use auth::{AuthHandle, AuthStore, Credential};
pub use chat::{ConversationSnapshot, ConversationStore, Message, MessageRole};
pub use config::{ClientSettings, ConfigError};
pub use error::{ApiError, FailureKind};
pub use pipeline::{AuthExpired, AuthExpiryHandler, CredentialSource, Pipeline};
pub use router::{guard, GuardDecision, Navigator, Route};
pub use session::{ClientContext, SessionEvent};
pub use storage::{DurableStorage, FileStorage, MemoryStorage};
pub use transport::{MockReply, MockTransport, ReqwestTransport, Transport};

pub use reqwest::Method;
pub use url::Url;
