//! Error taxonomy of the lifecycle engine.
//!
//! Every variant carries enough structure (a stable [`code`](LifecycleError::code) plus context)
//! for a client to drive its UI. Nothing is swallowed: the engine surfaces these verbatim.

use crate::ids::{AttachmentId, RequestId};
use crate::repository::RepositoryError;
use crate::request::{RequestStatus, UnknownRequestType};
use crate::state_machine::LifecycleAction;
use crate::storage::StorageError;
use crate::validation::FieldErrors;
use crate::version::Version;
use thiserror::Error;

/// Errors returned by lifecycle engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Submitted input violates the schema (create, update, staging parameters).
    #[error("Validation failed: {0}")]
    InvalidPayload(FieldErrors),

    /// The request is well-formed but a guard rejected it (submission checks, missing notes).
    #[error("Request cannot proceed: {0}")]
    GuardRejected(FieldErrors),

    /// The type tag is not registered.
    #[error("Unknown request type: {0}")]
    UnknownRequestType(String),

    /// The request changed since the caller last read it.
    #[error("Version conflict on request {request_id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Request being written.
        request_id: RequestId,
        /// Version the caller sent.
        expected: Version,
        /// Version currently stored.
        actual: Version,
    },

    /// The action is not legal from the current status.
    #[error("Illegal transition: cannot {action} from {from} to {to}")]
    IllegalTransition {
        /// Current status.
        from: RequestStatus,
        /// Attempted target status.
        to: RequestStatus,
        /// Attempted action.
        action: LifecycleAction,
    },

    /// Payload and attachments are frozen in this status.
    #[error("Request is not editable in status {0}")]
    NotEditable(RequestStatus),

    /// The upload slot expired before confirmation; the file must be re-staged.
    #[error("Attachment expired: {0}")]
    AttachmentExpired(AttachmentId),

    /// An attachment has not been confirmed yet.
    #[error("Attachment not confirmed: {0}")]
    AttachmentNotConfirmed(AttachmentId),

    /// Storage does not hold an object matching the staged slot.
    #[error("Upload verification failed for {attachment_id}: {reason}")]
    UploadVerificationFailed {
        /// Attachment being confirmed.
        attachment_id: AttachmentId,
        /// What did not match.
        reason: String,
    },

    /// The actor's role or ownership does not permit the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No such request.
    #[error("Request not found: {0}")]
    RequestNotFound(RequestId),

    /// No such attachment on the request.
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(AttachmentId),

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Repository backend failure.
    #[error("Repository error: {0}")]
    Repository(RepositoryError),
}

impl LifecycleError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) | Self::GuardRejected(_) => "VALIDATION_ERROR",
            Self::UnknownRequestType(_) => "UNKNOWN_REQUEST_TYPE",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            Self::NotEditable(_) => "NOT_EDITABLE",
            Self::AttachmentExpired(_) => "ATTACHMENT_EXPIRED",
            Self::AttachmentNotConfirmed(_) => "ATTACHMENT_NOT_CONFIRMED",
            Self::UploadVerificationFailed { .. } => "UPLOAD_VERIFICATION_FAILED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::RequestNotFound(_) | Self::AttachmentNotFound(_) => "NOT_FOUND",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Repository(_) => "REPOSITORY_ERROR",
        }
    }

    /// Field errors carried by validation failures.
    #[must_use]
    pub const fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::InvalidPayload(errors) | Self::GuardRejected(errors) => Some(errors),
            _ => None,
        }
    }

    /// Whether the caller can recover by refetching and retrying.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

impl From<RepositoryError> for LifecycleError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::VersionConflict {
                request_id,
                expected,
                actual,
            } => Self::VersionConflict {
                request_id,
                expected,
                actual,
            },
            RepositoryError::NotFound(id) => Self::RequestNotFound(id),
            RepositoryError::AttachmentNotFound(id) => Self::AttachmentNotFound(id),
            RepositoryError::AttachmentExpired(id) => Self::AttachmentExpired(id),
            other => Self::Repository(other),
        }
    }
}

impl From<UnknownRequestType> for LifecycleError {
    fn from(error: UnknownRequestType) -> Self {
        Self::UnknownRequestType(error.0)
    }
}
