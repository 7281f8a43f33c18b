use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

/// A fully built request, rebuilt for every call and never persisted.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl OutboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body_text(&self) -> Option<&str> {
        self.body
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn body_json(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: OutboundRequest) -> Result<RawResponse, TransportError>;
}

/// Network transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Every call through this transport is bounded by `timeout`.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: OutboundRequest) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// One scripted answer of the [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockReply {
    outcome: Result<RawResponse, TransportError>,
    delay: Option<Duration>,
}

impl MockReply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            outcome: Ok(RawResponse {
                status,
                body: serde_json::to_vec(&body).unwrap_or_default(),
            }),
            delay: None,
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    /// Error status with a FastAPI-style `{"detail": ...}` body.
    pub fn detail(status: u16, detail: &str) -> Self {
        Self::json(status, serde_json::json!({ "detail": detail }))
    }

    pub fn raw(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            outcome: Ok(RawResponse {
                status,
                body: body.into(),
            }),
            delay: None,
        }
    }

    pub fn failure(error: TransportError) -> Self {
        Self {
            outcome: Err(error),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Responder = Arc<dyn Fn(&OutboundRequest) -> MockReply + Send + Sync>;

enum MockRoute {
    Fixed(MockReply),
    /// Replies are consumed in order; the last one keeps answering.
    Queue(VecDeque<MockReply>),
    Responder(Responder),
}

impl MockRoute {
    fn reply(&mut self, request: &OutboundRequest) -> MockReply {
        match self {
            Self::Fixed(reply) => reply.clone(),
            Self::Queue(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(not_found),
            Self::Queue(queue) => queue.front().cloned().unwrap_or_else(not_found),
            Self::Responder(responder) => responder(request),
        }
    }
}

fn not_found() -> MockReply {
    MockReply::detail(404, "Not Found")
}

/// In-process transport with scripted routes and a request log.
///
/// Routes match on method and on the trailing segments of the request path,
/// so `/chat` answers `http://localhost:8000/api/chat`. When several routes
/// match, the longest one wins.
#[derive(Clone, Default)]
pub struct MockTransport {
    routes: Arc<Mutex<HashMap<(Method, String), MockRoute>>>,
    requests: Arc<Mutex<Vec<OutboundRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, method: Method, path: &str, reply: MockReply) -> &Self {
        self.insert(method, path, MockRoute::Fixed(reply))
    }

    pub fn route_sequence(
        &self,
        method: Method,
        path: &str,
        replies: impl IntoIterator<Item = MockReply>,
    ) -> &Self {
        self.insert(method, path, MockRoute::Queue(replies.into_iter().collect()))
    }

    pub fn route_with<F>(&self, method: Method, path: &str, responder: F) -> &Self
    where
        F: Fn(&OutboundRequest) -> MockReply + Send + Sync + 'static,
    {
        self.insert(method, path, MockRoute::Responder(Arc::new(responder)))
    }

    fn insert(&self, method: Method, path: &str, route: MockRoute) -> &Self {
        self.routes.lock().insert((method, path.to_string()), route);
        self
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<OutboundRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.url.path().ends_with(path))
            .cloned()
            .collect()
    }

    pub fn last_request(&self) -> Option<OutboundRequest> {
        self.requests.lock().last().cloned()
    }

    fn resolve(&self, request: &OutboundRequest) -> MockReply {
        let mut routes = self.routes.lock();
        let request_path = request.url.path();
        let key = routes
            .keys()
            .filter(|(method, path)| *method == request.method && path_matches(request_path, path))
            .max_by_key(|(_, path)| path.len())
            .cloned();
        match key.and_then(|key| routes.get_mut(&key)) {
            Some(route) => route.reply(request),
            None => not_found(),
        }
    }
}

fn path_matches(request_path: &str, route: &str) -> bool {
    let request_path = request_path.trim_end_matches('/');
    let route = route.trim_end_matches('/');
    match request_path.strip_suffix(route) {
        Some(prefix) => route.starts_with('/') || prefix.is_empty() || prefix.ends_with('/'),
        None => false,
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: OutboundRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().push(request.clone());
        let reply = self.resolve(&request);
        if let Some(delay) = reply.delay {
            sleep(delay).await;
        }
        reply.outcome
    }
}
