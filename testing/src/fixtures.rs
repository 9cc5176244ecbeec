//! Valid payloads, actors and proptest strategies.
//!
//! Raw payloads are the JSON clients send; typed payloads are what the registry produces from
//! them.

use proptest::prelude::*;
use request_desk_core::ids::ActorId;
use request_desk_core::payload::{FeedbackPayload, Priority, RequestPayload};
use request_desk_core::request::{Actor, RequestType};
use serde_json::{Value, json};

/// A fresh investor.
#[must_use]
pub fn investor() -> Actor {
    Actor::investor(ActorId::new())
}

/// A fresh administrator.
#[must_use]
pub fn admin() -> Actor {
    Actor::admin(ActorId::new())
}

/// Feedback with a 25-character message and no priority (defaults to `medium`).
#[must_use]
pub fn feedback() -> Value {
    json!({
        "subject": "Test issue",
        "message": "I would like more reports",
    })
}

/// Typed form of [`feedback`].
#[must_use]
pub fn feedback_payload() -> RequestPayload {
    RequestPayload::Feedback(FeedbackPayload {
        subject: "Test issue".to_string(),
        message: "I would like more reports".to_string(),
        priority: Priority::Medium,
        category: None,
    })
}

/// A complete partnership proposal.
#[must_use]
pub fn partnership() -> Value {
    json!({
        "company_name": "Acme Robotics",
        "contact_name": "Dana Whitfield",
        "contact_email": "Dana@Acme.example",
        "contact_phone": "(415) 555-0132",
        "partnership_type": "strategic",
        "proposal": "We would like to co-develop a warehouse automation line with your portfolio companies.",
        "website": "https://acme.example",
    })
}

/// A complete board nomination (needs one confirmed attachment before submission).
#[must_use]
pub fn board_nomination() -> Value {
    json!({
        "nominee_name": "Morgan Reyes",
        "nominee_email": "morgan.reyes@example.com",
        "nominee_bio": "Morgan has twenty years of experience in industrial logistics, served as CFO of two listed companies and chairs an audit committee.",
        "relationship": "shareholder",
        "shares_held": 1500,
    })
}

/// A complete signup.
#[must_use]
pub fn signup() -> Value {
    json!({
        "full_name": "Alex Kim",
        "email": "alex.kim@example.com",
        "investor_type": "individual",
        "country": "us",
    })
}

/// A valid raw payload for `request_type`.
#[must_use]
pub fn valid_payload(request_type: RequestType) -> Value {
    match request_type {
        RequestType::Feedback => feedback(),
        RequestType::Partnership => partnership(),
        RequestType::BoardNomination => board_nomination(),
        RequestType::Signup => signup(),
    }
}

/// Raw feedback payloads that satisfy every constraint.
pub fn feedback_strategy() -> impl Strategy<Value = Value> {
    (
        "[A-Za-z][A-Za-z ]{2,60}[A-Za-z]",
        "[A-Za-z][A-Za-z .,]{20,200}[a-z]",
        prop::sample::select(vec!["low", "medium", "high"]),
    )
        .prop_map(|(subject, message, priority)| {
            json!({ "subject": subject, "message": message, "priority": priority })
        })
}

/// Any registered request type.
pub fn request_type_strategy() -> impl Strategy<Value = RequestType> {
    prop::sample::select(RequestType::ALL.to_vec())
}
