use crate::support::{script_login, settings, sign_in, test_runtime, Harness};
use cardwise_core::storage::{TOKEN_KEY, USER_KEY};
use cardwise_core::{
    ClientSettings, Credentials, FileStorage, MemoryStorage, Method, MockReply,
    MockTransport, Registration, SessionEvent, Url,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn login_sends_form_and_authorizes_profile() {
    let runtime = test_runtime();
    let mut harness = Harness::new();
    script_login(&harness.transport);
    harness.transport.route(
        Method::GET,
        "/auth/me",
        MockReply::ok(json!({"id": 1, "username": "alice", "email": "alice@example.com"})),
    );

    let ok = runtime.block_on(harness.context.login(&Credentials::new("alice", "p")));
    assert!(ok);
    assert!(harness.context.auth().is_authenticated());
    assert_eq!(harness.context.auth().token().as_deref(), Some("T1"));

    let login = harness.transport.requests_to("/auth/login");
    assert_eq!(login.len(), 1);
    assert_eq!(
        login[0].header("content-type"),
        Some("application/x-www-form-urlencoded")
    );
    assert!(login[0].header("authorization").is_none());

    assert!(runtime.block_on(harness.context.auth().get_user_info()));
    let profile = harness.transport.last_request().expect("profile request");
    assert_eq!(profile.url.path(), "/api/auth/me");
    assert_eq!(profile.header("authorization"), Some("Bearer T1"));
    let user = harness.context.auth().user().expect("user");
    assert_eq!(user.username.as_deref(), Some("alice"));

    assert!(harness
        .drain_events()
        .contains(&SessionEvent::LoggedIn { user_id: 1 }));
}

#[test]
fn failed_login_leaves_prior_session() {
    let runtime = test_runtime();
    let harness = Harness::new();
    sign_in(&runtime, &harness);

    harness.transport.route(
        Method::POST,
        "/auth/login",
        MockReply::detail(500, "Database connection error"),
    );
    let ok = runtime.block_on(harness.context.login(&Credentials::new("bob", "x")));
    assert!(!ok);
    assert!(harness.context.auth().is_authenticated());
    assert_eq!(harness.context.auth().token().as_deref(), Some("T1"));
    assert_eq!(harness.storage.get(TOKEN_KEY).as_deref(), Some("T1"));
}

#[test]
fn malformed_login_response_is_a_failure() {
    let runtime = test_runtime();
    let harness = Harness::new();
    harness.transport.route(
        Method::POST,
        "/auth/login",
        MockReply::ok(json!({"access_token": "T9"})),
    );

    let ok = runtime.block_on(harness.context.login(&Credentials::new("alice", "p")));
    assert!(!ok);
    assert!(!harness.context.auth().is_authenticated());
    assert!(harness.storage.get(TOKEN_KEY).is_none());
}

#[test]
fn reload_restores_session_until_logout() {
    let runtime = test_runtime();
    let harness = Harness::new();
    sign_in(&runtime, &harness);
    let before = harness.context.auth().is_authenticated();

    let reloaded = harness.reload();
    assert_eq!(reloaded.context.auth().is_authenticated(), before);
    assert_eq!(reloaded.context.auth().user().map(|u| u.id), Some(1));
    assert_eq!(reloaded.context.auth().token().as_deref(), Some("T1"));

    reloaded.context.logout();
    assert!(reloaded.storage.get(TOKEN_KEY).is_none());
    assert!(reloaded.storage.get(USER_KEY).is_none());

    let after_logout = reloaded.reload();
    assert!(!after_logout.context.auth().is_authenticated());
    assert!(after_logout.context.auth().user().is_none());
}

#[test]
fn file_storage_session_survives_restart() {
    let runtime = test_runtime();
    let dir = TempDir::new().expect("temp dir");
    let transport = MockTransport::new();
    script_login(&transport);

    {
        let storage = Arc::new(FileStorage::open(dir.path()).expect("storage"));
        let harness = Harness::build(settings(), transport.clone(), storage);
        assert!(runtime.block_on(harness.context.login(&Credentials::new("alice", "p"))));
    }

    let storage = Arc::new(FileStorage::open(dir.path()).expect("storage"));
    let harness = Harness::build(settings(), transport, storage);
    assert!(harness.context.auth().is_authenticated());
    assert_eq!(harness.context.auth().token().as_deref(), Some("T1"));
}

#[test]
fn logout_stops_attaching_the_credential() {
    let runtime = test_runtime();
    let mut harness = Harness::new();
    sign_in(&runtime, &harness);
    harness.transport.route(
        Method::GET,
        "/auth/me",
        MockReply::detail(401, "Not authenticated"),
    );

    harness.context.logout();
    assert!(!harness.context.auth().is_authenticated());
    assert!(!runtime.block_on(harness.context.auth().get_user_info()));

    let request = harness.transport.last_request().expect("profile request");
    assert!(request.header("authorization").is_none());
    let events = harness.drain_events();
    assert!(events.contains(&SessionEvent::LoggedOut));
    assert!(events.contains(&SessionEvent::AuthExpired {
        path: "/auth/me".to_string()
    }));
}

#[test]
fn failed_profile_refresh_keeps_user() {
    let runtime = test_runtime();
    let harness = Harness::new();
    sign_in(&runtime, &harness);
    harness.transport.route(
        Method::GET,
        "/auth/me",
        MockReply::detail(404, "User not found"),
    );

    assert!(!runtime.block_on(harness.context.auth().get_user_info()));
    assert!(harness.context.auth().is_authenticated());
    assert_eq!(harness.context.auth().user().map(|u| u.id), Some(1));
}

#[test]
fn register_posts_json_without_signing_in() {
    let runtime = test_runtime();
    let harness = Harness::new();
    harness.transport.route(
        Method::POST,
        "/auth/register",
        MockReply::ok(json!({"access_token": "R1", "token_type": "bearer"})),
    );
    let registration = Registration {
        username: "carol".into(),
        email: "carol@example.com".into(),
        password: "secret".into(),
    };

    assert!(runtime.block_on(harness.context.auth().register(&registration)));
    assert!(!harness.context.auth().is_authenticated());
    let request = harness.transport.last_request().expect("register request");
    assert_eq!(request.header("content-type"), Some("application/json"));
    let body = request.body_json().expect("json body");
    assert_eq!(body["username"], "carol");
    assert_eq!(body["email"], "carol@example.com");

    harness.transport.route(
        Method::POST,
        "/auth/register",
        MockReply::detail(400, "Username already registered"),
    );
    assert!(!runtime.block_on(harness.context.auth().register(&registration)));
}

#[test]
fn public_origin_carries_no_credential() {
    let runtime = test_runtime();
    let transport = MockTransport::new();
    script_login(&transport);
    transport.route(Method::GET, "/cards", MockReply::ok(json!([])));
    let settings = ClientSettings {
        public_base_url: Some(Url::parse("http://auth.localhost:9000/api").expect("url")),
        ..settings()
    };
    let harness = Harness::build(
        settings,
        transport,
        Arc::new(MemoryStorage::new()),
    );

    assert!(runtime.block_on(harness.context.login(&Credentials::new("alice", "p"))));
    let login = harness.transport.last_request().expect("login request");
    assert_eq!(login.url.as_str(), "http://auth.localhost:9000/api/auth/login");
    assert!(login.header("authorization").is_none());

    runtime
        .block_on(harness.context.cards().list())
        .expect("cards");
    let cards = harness.transport.last_request().expect("cards request");
    assert_eq!(cards.url.host_str(), Some("localhost"));
    assert_eq!(cards.header("authorization"), Some("Bearer T1"));
}
