use crate::support::{sign_in, test_runtime, Harness};
use cardwise_core::{Route, SessionEvent};

#[test]
fn signed_out_visitor_is_sent_to_login() {
    let mut harness = Harness::new();
    for target in [
        Route::Chat,
        Route::Cards,
        Route::CardDetail(5),
        Route::Compare,
        Route::Profile,
    ] {
        assert_eq!(harness.context.navigate(target), Route::Login);
        assert_eq!(harness.context.navigator().current(), Route::Login);
    }
    let events = harness.drain_events();
    assert_eq!(events.len(), 5);
    assert!(events.iter().all(|event| *event
        == SessionEvent::Navigated {
            route: Route::Login
        }));
}

#[test]
fn public_views_are_always_open() {
    let harness = Harness::new();
    for target in [Route::Home, Route::Login, Route::Register] {
        assert_eq!(harness.context.navigate(target.clone()), target);
    }
}

#[test]
fn signed_in_user_reaches_protected_views() {
    let runtime = test_runtime();
    let harness = Harness::new();
    sign_in(&runtime, &harness);

    assert_eq!(harness.context.navigate(Route::Chat), Route::Chat);
    assert_eq!(
        harness.context.navigate(Route::CardDetail(9)),
        Route::CardDetail(9)
    );
    assert_eq!(harness.context.navigator().current(), Route::CardDetail(9));
}

#[test]
fn restored_session_passes_the_guard() {
    let runtime = test_runtime();
    let harness = Harness::new();
    sign_in(&runtime, &harness);

    let reloaded = harness.reload();
    assert_eq!(reloaded.context.navigator().current(), Route::Home);
    assert_eq!(reloaded.context.navigate(Route::Profile), Route::Profile);
}

#[test]
fn logout_returns_to_login() {
    let runtime = test_runtime();
    let mut harness = Harness::new();
    sign_in(&runtime, &harness);
    harness.context.navigate(Route::Chat);
    harness.drain_events();

    harness.context.logout();
    assert_eq!(harness.context.navigator().current(), Route::Login);
    assert_eq!(harness.context.navigate(Route::Chat), Route::Login);
    let events = harness.drain_events();
    assert_eq!(events.first(), Some(&SessionEvent::LoggedOut));
}
