//! Error types for web handlers.
//!
//! [`AppError`] bridges [`LifecycleError`] and HTTP: each error code maps to one status, and the
//! structured parts of the error (field errors, versions, statuses) travel in `details`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use request_desk_core::error::LifecycleError;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

/// Application error type for web handlers.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Structured context for the client
    details: Option<Value>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.into(),
            details: None,
            source: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

/// HTTP status for each lifecycle error.
#[must_use]
pub const fn status_for(error: &LifecycleError) -> StatusCode {
    match error {
        LifecycleError::InvalidPayload(_) | LifecycleError::UnknownRequestType(_) => {
            StatusCode::BAD_REQUEST
        }
        LifecycleError::GuardRejected(_)
        | LifecycleError::IllegalTransition { .. }
        | LifecycleError::NotEditable(_)
        | LifecycleError::AttachmentNotConfirmed(_)
        | LifecycleError::UploadVerificationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LifecycleError::VersionConflict { .. } => StatusCode::CONFLICT,
        LifecycleError::AttachmentExpired(_) => StatusCode::GONE,
        LifecycleError::Forbidden(_) => StatusCode::FORBIDDEN,
        LifecycleError::RequestNotFound(_) | LifecycleError::AttachmentNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        LifecycleError::Storage(_) => StatusCode::BAD_GATEWAY,
        LifecycleError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn details_for(error: &LifecycleError) -> Option<Value> {
    match error {
        LifecycleError::InvalidPayload(errors) | LifecycleError::GuardRejected(errors) => {
            Some(json!({ "fields": errors }))
        }
        LifecycleError::VersionConflict {
            expected, actual, ..
        } => Some(json!({ "expected_version": expected, "current_version": actual })),
        LifecycleError::IllegalTransition { from, to, action } => {
            Some(json!({ "from": from, "to": to, "action": action }))
        }
        LifecycleError::NotEditable(status) => Some(json!({ "status": status })),
        LifecycleError::AttachmentExpired(id)
        | LifecycleError::AttachmentNotConfirmed(id)
        | LifecycleError::AttachmentNotFound(id) => Some(json!({ "attachment_id": id })),
        LifecycleError::UploadVerificationFailed {
            attachment_id,
            reason,
        } => Some(json!({ "attachment_id": attachment_id, "reason": reason })),
        _ => None,
    }
}

impl From<LifecycleError> for AppError {
    fn from(error: LifecycleError) -> Self {
        let status = status_for(&error);
        let message = if status.is_server_error() {
            "The request could not be completed".to_string()
        } else {
            error.to_string()
        };

        let mut app_error = Self::new(status, error.code(), message);
        app_error.details = details_for(&error);
        if status.is_server_error() {
            app_error.source = Some(anyhow::Error::new(error));
        }
        app_error
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };

        (self.status, Json(body)).into_response()
    }
}
