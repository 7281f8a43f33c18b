//! Outbound request pipeline scoped to the single backend origin.
//!
//! Every call builds a fresh [`OutboundRequest`], optionally stamps the bearer
//! credential on it, and classifies the response. A 401 from any endpoint is
//! reported to the installed [`AuthExpiryHandler`] before the error is handed
//! back to the caller.

use crate::error::{error_message, ApiError};
use crate::transport::{OutboundRequest, Transport, TransportError};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Supplies the bearer token attached to authenticated calls.
pub trait CredentialSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Emitted once per 401 response.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthExpired {
    pub method: Method,
    pub path: String,
    /// Bearer token the rejected request carried, if any.
    pub credential_sent: Option<String>,
}

impl std::fmt::Debug for AuthExpired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthExpired")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("credential_sent", &self.credential_sent.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Receives [`AuthExpired`] synchronously, before the failing call returns.
pub trait AuthExpiryHandler: Send + Sync {
    fn auth_expired(&self, signal: &AuthExpired);
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

#[derive(Clone)]
pub struct Pipeline {
    base_url: Url,
    transport: Arc<dyn Transport>,
    credentials: Option<Arc<dyn CredentialSource>>,
    expiry: Arc<dyn AuthExpiryHandler>,
}

impl Pipeline {
    /// Pipeline that attaches `Authorization: Bearer <token>` when a token is held.
    pub fn authenticated(
        base_url: Url,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
        expiry: Arc<dyn AuthExpiryHandler>,
    ) -> Self {
        Self {
            base_url: normalize_base(base_url),
            transport,
            credentials: Some(credentials),
            expiry,
        }
    }

    /// Pipeline that never attaches a credential but shares the 401 policy.
    pub fn public(
        base_url: Url,
        transport: Arc<dyn Transport>,
        expiry: Arc<dyn AuthExpiryHandler>,
    ) -> Self {
        Self {
            base_url: normalize_base(base_url),
            transport,
            credentials: None,
            expiry,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn injects_credential(&self) -> bool {
        self.credentials.is_some()
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        headers: Option<HeaderMap>,
    ) -> Result<Response, ApiError> {
        let credential_sent = self.credentials.as_ref().and_then(|c| c.bearer_token());
        let request = self.build(
            method.clone(),
            path,
            body,
            headers,
            credential_sent.as_deref(),
        )?;
        debug!(
            %method,
            path,
            authenticated = request.headers.contains_key(AUTHORIZATION),
            "dispatching request"
        );

        let raw = self.transport.execute(request).await.map_err(|err| {
            warn!(%method, path, %err, "request failed before a response arrived");
            match err {
                TransportError::Timeout => ApiError::Timeout,
                TransportError::Connect(detail) | TransportError::Other(detail) => {
                    ApiError::Network(detail)
                }
            }
        })?;

        match raw.status {
            200..=299 => {
                debug!(%method, path, status = raw.status, "request succeeded");
                Ok(Response {
                    status: raw.status,
                    body: raw.body,
                })
            }
            401 => {
                let message = error_message(raw.status, &raw.body);
                warn!(%method, path, %message, "credential rejected");
                self.expiry.auth_expired(&AuthExpired {
                    method,
                    path: path.to_string(),
                    credential_sent,
                });
                Err(ApiError::Unauthorized { message })
            }
            status => {
                let message = error_message(status, &raw.body);
                warn!(%method, path, status, %message, "request rejected");
                Err(ApiError::Status { status, message })
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(Method::GET, path, RequestBody::Empty, None)
            .await?
            .json(path)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let value = serde_json::to_value(body).map_err(|source| ApiError::Encode {
            path: path.to_string(),
            source,
        })?;
        self.send(Method::POST, path, RequestBody::Json(value), None)
            .await?
            .json(path)
    }

    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        fields: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let fields = fields
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        self.send(Method::POST, path, RequestBody::Form(fields), None)
            .await?
            .json(path)
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(Method::POST, path, RequestBody::Empty, None)
            .await?
            .json(path)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(Method::DELETE, path, RequestBody::Empty, None)
            .await?
            .json(path)
    }

    fn build(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        headers: Option<HeaderMap>,
        token: Option<&str>,
    ) -> Result<OutboundRequest, ApiError> {
        let url = self.resolve(path)?;
        let mut request_headers = HeaderMap::new();
        request_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let body = match body {
            RequestBody::Empty => None,
            RequestBody::Json(value) => {
                request_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                let bytes = serde_json::to_vec(&value).map_err(|source| ApiError::Encode {
                    path: path.to_string(),
                    source,
                })?;
                Some(bytes)
            }
            RequestBody::Form(fields) => {
                request_headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                );
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields)
                    .finish();
                Some(encoded.into_bytes())
            }
        };

        if let Some(extra) = headers {
            request_headers.extend(extra);
        }

        if let Some(token) = token {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    request_headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!(path, "stored credential is not a valid header value"),
            }
        }

        Ok(OutboundRequest {
            method,
            url,
            headers: request_headers,
            body,
        })
    }

    fn resolve(&self, path: &str) -> Result<Url, ApiError> {
        let relative = path.trim_start_matches('/');
        let url = self
            .base_url
            .join(relative)
            .map_err(|_| ApiError::InvalidPath(path.to_string()))?;
        if url.origin() != self.base_url.origin() {
            return Err(ApiError::InvalidPath(path.to_string()));
        }
        Ok(url)
    }
}

/// `Url::join` drops the last segment unless the base ends with a slash.
fn normalize_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}
