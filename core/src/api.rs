//! Typed facades for the backend endpoints.
//!
//! Each endpoint decodes into an explicit schema so that a drifting backend
//! fails with [`ApiError::Decode`] instead of leaking missing fields upward.

use crate::error::ApiError;
use crate::pipeline::Pipeline;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Identity record returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Profile fields this client does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn display_name(&self) -> String {
        self.full_name
            .clone()
            .or_else(|| self.username.clone())
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| format!("user #{}", self.id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginGrant {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualFee {
    pub first_year: String,
    pub regular: String,
    pub waiver_condition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsRule {
    pub domestic: String,
    pub overseas: String,
    pub special: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationCondition {
    pub income: String,
    pub credit_score: String,
    pub age: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditCard {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub bank: String,
    #[serde(default)]
    pub annual_fee: Option<AnnualFee>,
    #[serde(default)]
    pub points_rule: Option<PointsRule>,
    #[serde(default)]
    pub benefits: Option<Vec<String>>,
    #[serde(default)]
    pub card_type: Option<String>,
    #[serde(default)]
    pub credit_level: Option<String>,
    #[serde(default)]
    pub foreign_transaction_fee: Option<String>,
    #[serde(default)]
    pub card_organization: Option<String>,
    #[serde(default)]
    pub application_condition: Option<ApplicationCondition>,
}

#[derive(Debug, Clone, Serialize)]
struct CompareRequest<'a> {
    card_ids: &'a [i64],
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    session_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    #[serde(alias = "message")]
    pub response: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub role: HistoryRole,
    pub content: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewConversation {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Acknowledgement body of mutating chat endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
}

/// Accepts RFC 3339 as well as the naive ISO timestamps the backend emits.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// Registration, login and profile endpoints.
#[derive(Clone)]
pub struct AuthApi {
    public: Pipeline,
    authenticated: Pipeline,
}

impl AuthApi {
    pub const GRANT_TYPE: &'static str = "password";

    pub fn new(public: Pipeline, authenticated: Pipeline) -> Self {
        Self {
            public,
            authenticated,
        }
    }

    pub async fn register(&self, registration: &Registration) -> Result<TokenGrant, ApiError> {
        self.public.post_json("/auth/register", registration).await
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, ApiError> {
        self.public
            .post_form(
                "/auth/login",
                &[
                    ("username", credentials.username.as_str()),
                    ("password", credentials.password.as_str()),
                    ("grant_type", Self::GRANT_TYPE),
                ],
            )
            .await
    }

    pub async fn profile(&self) -> Result<User, ApiError> {
        self.authenticated.get("/auth/me").await
    }
}

#[derive(Clone)]
pub struct CardsApi {
    pipeline: Pipeline,
}

impl CardsApi {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    pub async fn list(&self) -> Result<Vec<CreditCard>, ApiError> {
        self.pipeline.get("/cards").await
    }

    pub async fn detail(&self, id: i64) -> Result<CreditCard, ApiError> {
        self.pipeline.get(&format!("/cards/{id}")).await
    }

    pub async fn compare(&self, ids: &[i64]) -> Result<Vec<CreditCard>, ApiError> {
        self.pipeline
            .post_json("/cards/compare", &CompareRequest { card_ids: ids })
            .await
    }
}

#[derive(Clone)]
pub struct ChatApi {
    pipeline: Pipeline,
}

impl ChatApi {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    pub async fn send(&self, message: &str, session_id: &str) -> Result<ChatReply, ApiError> {
        self.pipeline
            .post_json("/chat", &ChatRequest { message, session_id })
            .await
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>, ApiError> {
        self.pipeline.get("/chat/history").await
    }

    pub async fn new_conversation(&self) -> Result<NewConversation, ApiError> {
        self.pipeline.post_empty("/chat/new").await
    }

    pub async fn clear_history(&self) -> Result<Ack, ApiError> {
        self.pipeline.delete("/chat/history").await
    }

    pub async fn delete_message(&self, id: i64) -> Result<Ack, ApiError> {
        self.pipeline.delete(&format!("/chat/message/{id}")).await
    }
}
