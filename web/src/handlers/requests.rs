//! Request endpoints:
//!
//! - `POST /api/requests` - create a draft
//! - `GET /api/requests/:id` - request, attachments and allowed actions
//! - `PATCH /api/requests/:id` - replace the payload of an editable request
//! - `POST /api/requests/:id/submit` - submit or resubmit
//! - `POST /api/requests/:id/transition` - admin review actions
//! - `POST /api/requests/:id/withdraw` - withdraw by the submitter
//! - `GET /api/requests/:id/audit` - audit history

use crate::error::AppError;
use crate::extractors::{ApiJson, AuthenticatedActor};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use request_desk_core::audit::AuditEntry;
use request_desk_core::ids::RequestId;
use request_desk_core::request::Request;
use request_desk_core::state_machine::LifecycleAction;
use request_desk_core::version::Version;
use request_desk_runtime::RequestView;
use serde::Deserialize;
use serde_json::Value;

/// Body of `POST /api/requests`.
#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    /// Type tag.
    #[serde(rename = "type")]
    pub request_type: String,
    /// Raw payload, validated against the type's schema.
    pub payload: Value,
}

/// Body of `PATCH /api/requests/:id`.
#[derive(Debug, Deserialize)]
pub struct UpdateRequestBody {
    /// Full replacement payload.
    pub payload: Value,
    /// Version the client last read.
    pub expected_version: Version,
}

/// Body of `submit` and `withdraw`.
#[derive(Debug, Deserialize)]
pub struct VersionedBody {
    /// Version the client last read.
    pub expected_version: Version,
}

/// Body of `POST /api/requests/:id/transition`.
#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    /// Action name, e.g. `start_review` or `request_info`.
    pub action: String,
    /// Version the client last read.
    pub expected_version: Version,
    /// Reviewer notes; required by `reject` and `request_info`.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Create a draft owned by the caller.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/requests \
///   -H "X-Actor-Id: <uuid>" -H "X-Actor-Role: investor" \
///   -H "Content-Type: application/json" \
///   -d '{"type": "feedback", "payload": {"subject": "Reports", "message": "..."}}'
/// ```
pub async fn create_request(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    ApiJson(body): ApiJson<CreateRequestBody>,
) -> Result<(StatusCode, Json<Request>), AppError> {
    let request = state
        .engine
        .create_draft(&actor, &body.request_type, &body.payload)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Load a request with its attachments and the actions the caller may take next.
pub async fn get_request(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<RequestId>,
) -> Result<Json<RequestView>, AppError> {
    Ok(Json(state.engine.get_request(request_id, &actor).await?))
}

/// Replace the payload of a draft or a request awaiting more information.
pub async fn update_request(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<RequestId>,
    ApiJson(body): ApiJson<UpdateRequestBody>,
) -> Result<Json<Request>, AppError> {
    let request = state
        .engine
        .update_draft(request_id, &actor, body.expected_version, &body.payload)
        .await?;
    Ok(Json(request))
}

/// Submit a draft, or resubmit after `needs_info`.
pub async fn submit_request(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<RequestId>,
    ApiJson(body): ApiJson<VersionedBody>,
) -> Result<Json<Request>, AppError> {
    let request = state
        .engine
        .submit(request_id, &actor, body.expected_version)
        .await?;
    Ok(Json(request))
}

/// Apply an admin review action.
pub async fn transition_request(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<RequestId>,
    ApiJson(body): ApiJson<TransitionBody>,
) -> Result<Json<Request>, AppError> {
    let action: LifecycleAction = body.action.parse().map_err(AppError::bad_request)?;
    let request = state
        .engine
        .admin_transition(request_id, &actor, action, body.expected_version, body.notes)
        .await?;
    Ok(Json(request))
}

/// Withdraw a request before a decision.
pub async fn withdraw_request(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<RequestId>,
    ApiJson(body): ApiJson<VersionedBody>,
) -> Result<Json<Request>, AppError> {
    let request = state
        .engine
        .withdraw(request_id, &actor, body.expected_version)
        .await?;
    Ok(Json(request))
}

/// Audit history ordered by sequence.
pub async fn get_audit(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<RequestId>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    Ok(Json(state.engine.get_history(request_id, &actor).await?))
}
