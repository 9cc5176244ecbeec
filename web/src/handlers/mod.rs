//! HTTP request handlers.

pub mod attachments;
pub mod health;
pub mod requests;

pub use health::{health_check, metrics, readiness_check};
