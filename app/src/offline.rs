//! Scripted backend for `--offline`, useful for demos without a running server.

use cardwise_core::transport::OutboundRequest;
use cardwise_core::{Method, MockReply, MockTransport};
use serde_json::{json, Value};
use std::time::Duration;
use url::form_urlencoded;

const TOKEN: &str = "offline-token";

fn catalogue() -> Vec<Value> {
    vec![
        json!({
            "id": 1,
            "name": "Everyday Cashback",
            "bank": "Demo Bank",
            "card_type": "cashback",
            "credit_level": "gold",
            "card_organization": "Visa",
            "foreign_transaction_fee": "1.5%",
            "annual_fee": {"first_year": "0", "regular": "100", "waiver_condition": "12 purchases a year"},
            "points_rule": {"domestic": "1 per 10", "overseas": "1 per 5", "special": "5x groceries"},
            "application_condition": {"income": "30k", "credit_score": "650", "age": "18-65"},
            "benefits": ["grocery cashback", "fuel discount"]
        }),
        json!({
            "id": 2,
            "name": "Voyager",
            "bank": "Demo Bank",
            "card_type": "travel",
            "credit_level": "platinum",
            "card_organization": "Mastercard",
            "foreign_transaction_fee": "0%",
            "annual_fee": {"first_year": "0", "regular": "800", "waiver_condition": "none"},
            "points_rule": {"domestic": "1 per 5", "overseas": "2 per 5", "special": "airline partners"},
            "application_condition": {"income": "120k", "credit_score": "720", "age": "21-65"},
            "benefits": ["lounge access", "travel insurance"]
        }),
    ]
}

fn user(username: &str) -> Value {
    json!({"id": 1, "username": username, "email": format!("{username}@example.com")})
}

/// Any non-empty username and password signs in.
pub fn demo_backend() -> MockTransport {
    let transport = MockTransport::new();
    let cards = catalogue();

    transport
        .route_with(Method::POST, "/auth/login", |request| {
            let fields: Vec<(String, String)> =
                form_urlencoded::parse(request.body.as_deref().unwrap_or_default())
                    .into_owned()
                    .collect();
            let field = |name: &str| {
                fields
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.clone())
                    .unwrap_or_default()
            };
            let username = field("username");
            if username.is_empty() || field("password").is_empty() {
                return MockReply::detail(401, "Incorrect username/email or password");
            }
            MockReply::ok(json!({
                "access_token": TOKEN,
                "token_type": "bearer",
                "user": user(&username)
            }))
        })
        .route(
            Method::POST,
            "/auth/register",
            MockReply::ok(json!({"access_token": TOKEN, "token_type": "bearer"})),
        )
        .route(Method::GET, "/auth/me", MockReply::ok(user("demo")))
        .route(Method::GET, "/cards", MockReply::ok(Value::Array(cards.clone())))
        .route_with(Method::POST, "/cards/compare", {
            let cards = cards.clone();
            move |request: &OutboundRequest| {
                let wanted: Vec<i64> = request
                    .body_json()
                    .and_then(|body| serde_json::from_value(body["card_ids"].clone()).ok())
                    .unwrap_or_default();
                let picked: Vec<Value> = cards
                    .iter()
                    .filter(|card| card["id"].as_i64().is_some_and(|id| wanted.contains(&id)))
                    .cloned()
                    .collect();
                MockReply::ok(Value::Array(picked))
            }
        })
        .route_with(Method::POST, "/chat", |request| {
            let message = request
                .body_json()
                .and_then(|body| body["message"].as_str().map(str::to_owned))
                .unwrap_or_default();
            MockReply::ok(json!({
                "response": format!("(offline) For \"{message}\", Everyday Cashback fits daily spending and Voyager suits frequent travel."),
                "status": "success"
            }))
            .with_delay(Duration::from_millis(150))
        })
        .route(Method::GET, "/chat/history", MockReply::ok(json!([])))
        .route(
            Method::POST,
            "/chat/new",
            MockReply::ok(json!({"message": "New conversation started"})),
        )
        .route(
            Method::DELETE,
            "/chat/history",
            MockReply::ok(json!({"message": "Chat history cleared"})),
        );

    for card in cards {
        if let Some(id) = card["id"].as_i64() {
            transport.route(Method::GET, &format!("/cards/{id}"), MockReply::ok(card));
        }
    }
    transport
}
