//! Health, readiness and metrics endpoints.

use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Liveness body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok`.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
}

/// `GET /health`: the process is up. Dependencies are not checked.
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Readiness body.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Whether the service should receive traffic.
    pub ready: bool,
    /// Name of the dependency checked.
    pub dependency: &'static str,
    /// Failure reason, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `GET /ready`: 200 when the backing store answers, 503 otherwise.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let dependency = state.readiness.name();
    match state.readiness.check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                dependency,
                error: None,
            }),
        ),
        Err(error) => {
            tracing::warn!(dependency, %error, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    ready: false,
                    dependency,
                    error: Some(error),
                }),
            )
        }
    }
}

/// `GET /metrics`: Prometheus text exposition, or 404 when no recorder is installed.
#[allow(clippy::unused_async)]
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.as_ref().and_then(|m| m.render()) {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, Json(body)) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
    }
}
