use cardwise_core::{CreditCard, Message, MessageRole, User};
use std::fmt::Write;

pub fn role_badge(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "You",
        MessageRole::Assistant => "Cardwise",
    }
}

pub fn message(message: &Message) -> String {
    let stamp = message.timestamp.format("%H:%M");
    match message.remote_id {
        Some(id) => format!(
            "[{stamp}] {} (#{id}): {}",
            role_badge(message.role),
            message.content
        ),
        None => format!("[{stamp}] {}: {}", role_badge(message.role), message.content),
    }
}

pub fn user(user: &User) -> String {
    let mut out = format!("{} (id {})", user.display_name(), user.id);
    if let Some(email) = &user.email {
        let _ = write!(out, "\n  email: {email}");
    }
    if let Some(username) = &user.username {
        let _ = write!(out, "\n  username: {username}");
    }
    out
}

pub fn card_line(card: &CreditCard) -> String {
    let id = card
        .id
        .map(|id| format!("{id:>4}"))
        .unwrap_or_else(|| "   -".to_string());
    let fee = card
        .annual_fee
        .as_ref()
        .map(|fee| fee.regular.as_str())
        .unwrap_or("n/a");
    format!("{id}  {} / {}  (annual fee: {fee})", card.name, card.bank)
}

pub fn card_detail(card: &CreditCard) -> String {
    let mut out = format!("{} / {}", card.name, card.bank);
    let optional = [
        ("type", &card.card_type),
        ("level", &card.credit_level),
        ("network", &card.card_organization),
        ("foreign transaction fee", &card.foreign_transaction_fee),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            let _ = write!(out, "\n  {label}: {value}");
        }
    }
    if let Some(fee) = &card.annual_fee {
        let _ = write!(
            out,
            "\n  annual fee: {} first year, {} after ({})",
            fee.first_year, fee.regular, fee.waiver_condition
        );
    }
    if let Some(points) = &card.points_rule {
        let _ = write!(
            out,
            "\n  points: domestic {}, overseas {}, special {}",
            points.domestic, points.overseas, points.special
        );
    }
    if let Some(condition) = &card.application_condition {
        let _ = write!(
            out,
            "\n  apply: income {}, credit score {}, age {}",
            condition.income, condition.credit_score, condition.age
        );
    }
    if let Some(benefits) = card.benefits.as_ref().filter(|b| !b.is_empty()) {
        out.push_str("\n  benefits:");
        for benefit in benefits {
            let _ = write!(out, "\n    - {benefit}");
        }
    }
    out
}

pub fn comparison(cards: &[CreditCard]) -> String {
    cards
        .iter()
        .map(card_detail)
        .collect::<Vec<_>>()
        .join("\n\n")
}
