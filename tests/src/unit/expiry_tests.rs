use crate::support::{script_echo_chat, sign_in, test_runtime, Harness};
use cardwise_core::storage::{TOKEN_KEY, USER_KEY};
use cardwise_core::{ApiError, Credentials, FailureKind, Method, MockReply, Route, SessionEvent};
use serde_json::json;
use std::time::Duration;

fn assert_signed_out(harness: &Harness) {
    assert!(!harness.context.auth().is_authenticated());
    assert!(harness.context.auth().token().is_none());
    assert!(harness.context.auth().user().is_none());
    assert!(harness.storage.get(TOKEN_KEY).is_none());
    assert!(harness.storage.get(USER_KEY).is_none());
    assert_eq!(harness.context.navigator().current(), Route::Login);
}

#[test]
fn rejected_card_listing_signs_out() {
    let runtime = test_runtime();
    let mut harness = Harness::new();
    sign_in(&runtime, &harness);
    harness.context.navigate(Route::Cards);
    harness.drain_events();
    harness.transport.route(
        Method::GET,
        "/cards",
        MockReply::detail(401, "Token has expired"),
    );

    let err = runtime
        .block_on(harness.context.cards().list())
        .expect_err("listing must fail");
    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert_eq!(err.kind(), FailureKind::AuthFailure);
    assert_signed_out(&harness);

    let events = harness.drain_events();
    assert_eq!(
        events,
        [
            SessionEvent::AuthExpired {
                path: "/cards".to_string()
            },
            SessionEvent::Navigated {
                route: Route::Login
            },
        ]
    );
}

#[test]
fn rejected_chat_message_signs_out_and_records_error() {
    let runtime = test_runtime();
    let harness = Harness::new();
    sign_in(&runtime, &harness);
    harness.transport.route(
        Method::POST,
        "/chat",
        MockReply::detail(401, "Could not validate credentials"),
    );
    let conversation = harness.context.conversation();

    assert!(runtime.block_on(conversation.send_message("hello")).is_none());
    assert_signed_out(&harness);
    assert_eq!(conversation.messages().len(), 1);
    assert!(conversation.error().is_some());
    assert!(!conversation.is_loading());
}

#[test]
fn expiry_clears_state_before_the_caller_resumes() {
    let runtime = test_runtime();
    let harness = Harness::new();
    sign_in(&runtime, &harness);
    harness.transport.route(
        Method::GET,
        "/cards/3",
        MockReply::detail(401, "Token has expired"),
    );

    let outcome = runtime.block_on(async {
        let result = harness.context.cards().detail(3).await;
        (result.is_err(), harness.context.auth().is_authenticated())
    });
    assert_eq!(outcome, (true, false));
}

#[test]
fn later_calls_go_out_without_a_credential() {
    let runtime = test_runtime();
    let harness = Harness::new();
    sign_in(&runtime, &harness);
    script_echo_chat(&harness.transport);
    harness.transport.route_sequence(
        Method::GET,
        "/cards",
        [
            MockReply::detail(401, "Token has expired"),
            MockReply::ok(serde_json::json!([])),
        ],
    );

    runtime.block_on(harness.context.cards().list()).ok();
    runtime
        .block_on(harness.context.cards().list())
        .expect("second listing");
    let requests = harness.transport.requests_to("/cards");
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].header("authorization"), Some("Bearer T1"));
    assert!(requests[1].header("authorization").is_none());
}

#[test]
fn forbidden_is_not_treated_as_expiry() {
    let runtime = test_runtime();
    let mut harness = Harness::new();
    sign_in(&runtime, &harness);
    harness.drain_events();
    harness.transport.route(
        Method::GET,
        "/cards",
        MockReply::detail(403, "Not enough permissions"),
    );

    let err = runtime
        .block_on(harness.context.cards().list())
        .expect_err("listing must fail");
    assert_eq!(err.status(), Some(403));
    assert!(harness.context.auth().is_authenticated());
    assert!(harness.drain_events().is_empty());
}

#[test]
fn reload_after_expiry_stays_signed_out() {
    let runtime = test_runtime();
    let harness = Harness::new();
    sign_in(&runtime, &harness);
    harness.transport.route(
        Method::GET,
        "/auth/me",
        MockReply::detail(401, "Token has expired"),
    );

    assert!(!runtime.block_on(harness.context.auth().get_user_info()));
    let reloaded = harness.reload();
    assert!(!reloaded.context.auth().is_authenticated());
    assert_eq!(reloaded.context.navigate(Route::Chat), Route::Login);
}

#[test]
fn rejection_of_a_replaced_token_keeps_the_new_session() {
    let runtime = test_runtime();
    let harness = Harness::new();
    sign_in(&runtime, &harness);
    harness.transport.route(
        Method::GET,
        "/cards",
        MockReply::detail(401, "Token has expired").with_delay(Duration::from_millis(50)),
    );
    harness.transport.route(
        Method::POST,
        "/auth/login",
        MockReply::ok(json!({"access_token": "T2", "user": {"id": 1}})),
    );

    let (listing, relogged) = runtime.block_on(async {
        futures::join!(harness.context.cards().list(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            harness.context.login(&Credentials::new("alice", "p")).await
        })
    });

    assert!(matches!(listing, Err(ApiError::Unauthorized { .. })));
    assert!(relogged);
    assert!(harness.context.auth().is_authenticated());
    assert_eq!(harness.context.auth().token().as_deref(), Some("T2"));
    assert_eq!(harness.storage.get(TOKEN_KEY).as_deref(), Some("T2"));
    let cards = harness.transport.requests_to("/cards");
    assert_eq!(cards[0].header("authorization"), Some("Bearer T1"));
}
