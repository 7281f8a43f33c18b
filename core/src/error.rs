use serde::Deserialize;
use serde_json::Value;

/// Coarse failure classes surfaced to the stores and the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The backend rejected the credential (HTTP 401).
    AuthFailure,
    /// Timeout or connectivity problem; the request never produced a response.
    NetworkFailure,
    /// The backend answered with a non-401 error status.
    ValidationFailure,
    /// The backend answered successfully but the body did not match its schema.
    DecodeFailure,
}

/// Failure of a single call through the request pipeline.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response shape from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode request body for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid request path `{0}`")]
    InvalidPath(String),
}

impl ApiError {
    /// HTTP status of the failed call, when there was a response at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unauthorized { .. } => FailureKind::AuthFailure,
            Self::Timeout | Self::Network(_) => FailureKind::NetworkFailure,
            Self::Status { .. } | Self::Encode { .. } | Self::InvalidPath(_) => {
                FailureKind::ValidationFailure
            }
            Self::Decode { .. } => FailureKind::DecodeFailure,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Human-readable message suitable for a store's `error` field.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized { .. } => {
                "Your session has expired. Please sign in again.".to_string()
            }
            Self::Status { message, .. } => message.clone(),
            Self::Timeout => "The server took too long to respond.".to_string(),
            Self::Network(detail) => format!("Could not reach the server: {detail}"),
            Self::Decode { path, .. } => {
                format!("The server sent an unexpected response for {path}.")
            }
            Self::Encode { path, .. } => format!("Could not prepare the request for {path}."),
            Self::InvalidPath(path) => format!("Invalid request path {path}."),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Value,
}

/// Extracts the human-readable message from an error response body.
///
/// FastAPI answers `{"detail": "..."}` for handled errors and
/// `{"detail": [{"msg": "..."}, ...]}` for validation failures.
pub(crate) fn error_message(status: u16, body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        match parsed.detail {
            Value::String(detail) if !detail.trim().is_empty() => return detail,
            Value::Array(items) => {
                let messages: Vec<String> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str))
                    .map(str::to_owned)
                    .collect();
                if !messages.is_empty() {
                    return messages.join("; ");
                }
            }
            _ => {}
        }
    }
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("HTTP {status}"))
}
