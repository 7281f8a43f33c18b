use cardwise_core::{
    ClientContext, ClientSettings, DurableStorage, MemoryStorage, Method, MockReply,
    MockTransport, SessionEvent, Url,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub const API_BASE: &str = "http://localhost:8000/api";

pub fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

pub fn settings() -> ClientSettings {
    ClientSettings::with_base_url(Url::parse(API_BASE).expect("base url"))
}

/// A client context over a scripted transport and shared storage.
pub struct Harness {
    pub transport: MockTransport,
    pub storage: Arc<dyn DurableStorage>,
    pub context: ClientContext,
    pub events: UnboundedReceiver<SessionEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()))
    }

    pub fn with_storage(storage: Arc<dyn DurableStorage>) -> Self {
        Self::build(settings(), MockTransport::new(), storage)
    }

    pub fn build(
        settings: ClientSettings,
        transport: MockTransport,
        storage: Arc<dyn DurableStorage>,
    ) -> Self {
        let (context, events) =
            ClientContext::with_transport(settings, Arc::new(transport.clone()), storage.clone());
        Self {
            transport,
            storage,
            context,
            events,
        }
    }

    /// Simulates a page reload: a fresh context over the same storage and backend.
    pub fn reload(&self) -> Self {
        Self::build(
            self.context.settings().clone(),
            self.transport.clone(),
            self.storage.clone(),
        )
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// `alice` / `p` signs in as user 1 with token `T1`; anything else is rejected.
pub fn script_login(transport: &MockTransport) {
    transport.route_with(Method::POST, "/auth/login", |request| {
        match request.body_text() {
            Some("username=alice&password=p&grant_type=password") => MockReply::ok(json!({
                "access_token": "T1",
                "token_type": "bearer",
                "user": {"id": 1}
            })),
            _ => MockReply::detail(401, "Incorrect username/email or password"),
        }
    });
}

/// Chat replies echo the message; messages starting with `slow` take longer.
pub fn script_echo_chat(transport: &MockTransport) {
    transport.route_with(Method::POST, "/chat", |request| {
        let body = request.body_json().unwrap_or_default();
        let message = body["message"].as_str().unwrap_or_default().to_string();
        let delay = if message.starts_with("slow") { 80 } else { 5 };
        MockReply::ok(json!({
            "response": format!("re: {message}"),
            "status": "success"
        }))
        .with_delay(Duration::from_millis(delay))
    });
}

pub fn sign_in(runtime: &tokio::runtime::Runtime, harness: &Harness) {
    script_login(&harness.transport);
    let credentials = cardwise_core::Credentials::new("alice", "p");
    assert!(runtime.block_on(harness.context.login(&credentials)));
}
