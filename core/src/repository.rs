//! Request repository port.
//!
//! The repository owns the atomic persistence of a request row together with the audit entry that
//! describes the change. Every mutating call carries the caller's last observed [`Version`]; if the
//! stored version has moved on, the call fails with [`RepositoryError::VersionConflict`] and
//! nothing is written. On success the stored version becomes `expected + 1` and the audit entry
//! (whose `sequence` must equal that new version) becomes visible in the same unit.
//!
//! Because the version is compared on every write, a mutation can never apply to a status other
//! than the one the engine checked its guards against.
//!
//! # Implementations
//!
//! - `PostgresRequestRepository` (in `request-desk-postgres`): one transaction per mutation.
//! - `InMemoryRequestRepository` (in `request-desk-testing`): check-and-write under one mutex.

use crate::audit::AuditEntry;
use crate::ids::{ActorId, AttachmentId, RequestId};
use crate::payload::RequestPayload;
use crate::request::{Attachment, Request, RequestStatus};
use crate::version::Version;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by repository and audit ports.
pub type RepositoryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Errors from a repository backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The stored version differs from the caller's expected version.
    #[error("Version conflict on request {request_id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Request being written.
        request_id: RequestId,
        /// Version the caller expected.
        expected: Version,
        /// Version actually stored.
        actual: Version,
    },

    /// No request with this id.
    #[error("Request not found: {0}")]
    NotFound(RequestId),

    /// No attachment with this id on the request.
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(AttachmentId),

    /// The attachment is no longer pending: its slot lapsed (or was swept) before the write.
    #[error("Attachment expired: {0}")]
    AttachmentExpired(AttachmentId),

    /// A request with this id already exists.
    #[error("Request already exists: {0}")]
    AlreadyExists(RequestId),

    /// Backend failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Stored data could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Status change applied by [`RequestRepository::transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    /// New status.
    pub to: RequestStatus,
    /// Admin who performed the change, if any. `None` keeps the stored reviewer.
    pub reviewer_id: Option<ActorId>,
    /// Replacement reviewer notes. `None` keeps the stored notes.
    pub review_notes: Option<String>,
}

/// Verification result recorded by [`RequestRepository::confirm_upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedUpload {
    /// Attachment being confirmed.
    pub attachment_id: AttachmentId,
    /// When verification succeeded.
    pub confirmed_at: DateTime<Utc>,
    /// Checksum reported by storage, if any.
    pub checksum_sha256: Option<String>,
}

/// Atomic persistence of requests, their attachments and their audit history.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so it can be held as
/// `Arc<dyn RequestRepository>` by the engine.
pub trait RequestRepository: Send + Sync {
    /// Persist a new draft (at [`Version::INITIAL`]) with its `created` entry.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::AlreadyExists`] if the id is taken, or a backend error.
    fn insert_draft(&self, request: Request, entry: AuditEntry) -> RepositoryFuture<'_, Request>;

    /// Replace the payload of a request.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::VersionConflict`], [`RepositoryError::NotFound`] or a backend error.
    fn update_payload(
        &self,
        request_id: RequestId,
        expected_version: Version,
        payload: RequestPayload,
        entry: AuditEntry,
    ) -> RepositoryFuture<'_, Request>;

    /// Apply a status change.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::VersionConflict`], [`RepositoryError::NotFound`] or a backend error.
    fn transition(
        &self,
        request_id: RequestId,
        expected_version: Version,
        change: StatusChange,
        entry: AuditEntry,
    ) -> RepositoryFuture<'_, Request>;

    /// Record a new pending attachment on a request.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::VersionConflict`], [`RepositoryError::NotFound`] or a backend error.
    fn attach_upload(
        &self,
        request_id: RequestId,
        expected_version: Version,
        attachment: Attachment,
        entry: AuditEntry,
    ) -> RepositoryFuture<'_, Request>;

    /// Flip a pending attachment to confirmed.
    ///
    /// The write only applies while the attachment is still `pending` and
    /// `upload.confirmed_at` is before its deadline; the version check alone does not cover a
    /// sweep that ran in between.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::VersionConflict`], [`RepositoryError::NotFound`],
    /// [`RepositoryError::AttachmentNotFound`], [`RepositoryError::AttachmentExpired`] or a
    /// backend error.
    fn confirm_upload(
        &self,
        request_id: RequestId,
        expected_version: Version,
        upload: ConfirmedUpload,
        entry: AuditEntry,
    ) -> RepositoryFuture<'_, (Request, Attachment)>;

    /// Load a request.
    ///
    /// # Errors
    ///
    /// Backend errors only; a missing request is `Ok(None)`.
    fn get(&self, request_id: RequestId) -> RepositoryFuture<'_, Option<Request>>;

    /// Attachments of a request in staging order.
    ///
    /// # Errors
    ///
    /// Backend errors only.
    fn attachments(&self, request_id: RequestId) -> RepositoryFuture<'_, Vec<Attachment>>;

    /// Load one attachment.
    ///
    /// # Errors
    ///
    /// Backend errors only; a missing attachment is `Ok(None)`.
    fn attachment(&self, attachment_id: AttachmentId) -> RepositoryFuture<'_, Option<Attachment>>;

    /// Persist `expired` for every pending attachment whose deadline is at or before `now`.
    ///
    /// This does not bump request versions or write audit entries: expiry is a lazily observable
    /// fact, not a mutation performed by an actor.
    ///
    /// # Errors
    ///
    /// Backend errors only.
    fn expire_stale_attachments(&self, now: DateTime<Utc>) -> RepositoryFuture<'_, Vec<Attachment>>;

    /// Audit history of a request ordered by sequence.
    ///
    /// # Errors
    ///
    /// Backend errors only.
    fn history(&self, request_id: RequestId) -> RepositoryFuture<'_, Vec<AuditEntry>>;
}

/// Check a caller's expected version against the stored one.
///
/// Shared by repository implementations so the conflict error is built the same way everywhere.
///
/// # Errors
///
/// [`RepositoryError::VersionConflict`] when the versions differ.
pub fn check_version(
    request_id: RequestId,
    expected: Version,
    actual: Version,
) -> Result<(), RepositoryError> {
    if expected == actual {
        Ok(())
    } else {
        Err(RepositoryError::VersionConflict {
            request_id,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_versions_pass() {
        assert_eq!(
            check_version(RequestId::new(), Version::new(3), Version::new(3)),
            Ok(())
        );
    }

    #[test]
    fn stale_version_conflicts() {
        let id = RequestId::new();
        assert_eq!(
            check_version(id, Version::new(2), Version::new(3)),
            Err(RepositoryError::VersionConflict {
                request_id: id,
                expected: Version::new(2),
                actual: Version::new(3),
            })
        );
    }
}
