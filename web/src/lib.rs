//! HTTP surface of Request Desk.
//!
//! Handlers stay thin: extract the caller from headers, decode the body, call the
//! [`RequestEngine`](request_desk_runtime::RequestEngine), and map the result.
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at an Axum handler
//! 2. **Extract** the actor (`X-Actor-Id`, `X-Actor-Role`) and the JSON body
//! 3. **Call** the engine, which validates, persists and audits in one step
//! 4. **Map** the result or the [`LifecycleError`](request_desk_core::LifecycleError) to a response
//!
//! # Example
//!
//! ```ignore
//! use request_desk_web::{build_router, AppState};
//!
//! let app = build_router(AppState::new(engine));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use config::{Config, ConfigError, ServerConfig};
pub use error::AppError;
pub use extractors::{ApiJson, AuthenticatedActor};
pub use middleware::{correlation_id_layer, CorrelationId, CORRELATION_ID_HEADER};
pub use router::build_router;
pub use state::{AlwaysReady, AppState, ReadinessProbe};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
