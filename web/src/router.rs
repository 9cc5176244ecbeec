//! Router configuration.

use crate::handlers::{attachments, health, requests};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the complete router: health endpoints at the root, the API under `/api`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/requests", post(requests::create_request))
        .route(
            "/requests/:id",
            get(requests::get_request).patch(requests::update_request),
        )
        .route("/requests/:id/submit", post(requests::submit_request))
        .route("/requests/:id/transition", post(requests::transition_request))
        .route("/requests/:id/withdraw", post(requests::withdraw_request))
        .route("/requests/:id/audit", get(requests::get_audit))
        .route(
            "/requests/:id/attachments/presign",
            post(attachments::presign_attachment),
        )
        .route(
            "/requests/:id/attachments/:attachment_id/confirm",
            post(attachments::confirm_attachment),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
