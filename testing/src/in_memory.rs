//! In-memory repository and audit log.
//!
//! Fast, deterministic stand-ins for the Postgres adapters:
//! - [`InMemoryRequestRepository`]: requests, attachments and history behind one mutex; every
//!   mutation is a check-and-write under that lock.
//! - [`InMemoryAuditLog`]: the audit sink, either standalone or as a view over a repository's
//!   history.

use request_desk_core::audit::{AuditEntry, AuditLog};
use request_desk_core::ids::{AttachmentId, RequestId};
use request_desk_core::payload::RequestPayload;
use request_desk_core::repository::{
    ConfirmedUpload, RepositoryError, RepositoryFuture, RequestRepository, StatusChange,
    check_version,
};
use request_desk_core::request::{Attachment, Request, UploadStatus};
use request_desk_core::version::Version;
use request_desk_core::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    requests: HashMap<RequestId, Request>,
    attachments: HashMap<AttachmentId, Attachment>,
    history: HashMap<RequestId, Vec<AuditEntry>>,
}

type Shared = Arc<Mutex<State>>;

fn lock(state: &Shared) -> Result<MutexGuard<'_, State>, RepositoryError> {
    state
        .lock()
        .map_err(|_| RepositoryError::Database("in-memory state lock poisoned".to_string()))
}

/// In-memory [`RequestRepository`].
///
/// # Example
///
/// ```
/// use request_desk_testing::InMemoryRequestRepository;
///
/// let repository = InMemoryRequestRepository::new();
/// assert_eq!(repository.request_count(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryRequestRepository {
    state: Shared,
}

impl InMemoryRequestRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An audit log reading and writing this repository's history.
    #[must_use]
    pub fn audit_log(&self) -> InMemoryAuditLog {
        InMemoryAuditLog {
            state: Arc::clone(&self.state),
        }
    }

    /// Number of stored requests.
    #[must_use]
    pub fn request_count(&self) -> usize {
        lock(&self.state).map_or(0, |s| s.requests.len())
    }

    /// Number of audit entries for a request.
    #[must_use]
    pub fn history_len(&self, request_id: RequestId) -> usize {
        lock(&self.state).map_or(0, |s| s.history.get(&request_id).map_or(0, Vec::len))
    }

    /// Apply a versioned mutation: check the version and the entry's sequence, run `apply` on a
    /// copy of the request, then commit request and entry together.
    ///
    /// `apply` must not touch `attachments` before it has decided to succeed.
    fn mutate<T>(
        &self,
        request_id: RequestId,
        expected_version: Version,
        entry: AuditEntry,
        apply: impl FnOnce(&mut Request, &mut HashMap<AttachmentId, Attachment>) -> Result<T, RepositoryError>,
    ) -> Result<(Request, T), RepositoryError> {
        let mut state = lock(&self.state)?;
        let State {
            requests,
            attachments,
            history,
        } = &mut *state;

        let stored = requests
            .get(&request_id)
            .ok_or(RepositoryError::NotFound(request_id))?;
        check_version(request_id, expected_version, stored.version)?;

        let next = expected_version.next();
        if entry.request_id != request_id || entry.sequence != next {
            return Err(RepositoryError::Database(format!(
                "audit entry sequence {} does not match version {next}",
                entry.sequence
            )));
        }

        let mut updated = stored.clone();
        let output = apply(&mut updated, attachments)?;
        updated.version = next;
        updated.updated_at = entry.timestamp;

        requests.insert(request_id, updated.clone());
        history.entry(request_id).or_default().push(entry);
        Ok((updated, output))
    }
}

impl RequestRepository for InMemoryRequestRepository {
    fn insert_draft(&self, request: Request, entry: AuditEntry) -> RepositoryFuture<'_, Request> {
        let result = (|| {
            let mut state = lock(&self.state)?;
            if state.requests.contains_key(&request.id) {
                return Err(RepositoryError::AlreadyExists(request.id));
            }
            if request.version != Version::INITIAL || entry.sequence != Version::INITIAL {
                return Err(RepositoryError::Database(
                    "new drafts start at the initial version".to_string(),
                ));
            }
            state.history.insert(request.id, vec![entry]);
            state.requests.insert(request.id, request.clone());
            Ok(request)
        })();
        Box::pin(std::future::ready(result))
    }

    fn update_payload(
        &self,
        request_id: RequestId,
        expected_version: Version,
        payload: RequestPayload,
        entry: AuditEntry,
    ) -> RepositoryFuture<'_, Request> {
        let result = self
            .mutate(request_id, expected_version, entry, |request, _| {
                request.payload = payload;
                Ok(())
            })
            .map(|(request, ())| request);
        Box::pin(std::future::ready(result))
    }

    fn transition(
        &self,
        request_id: RequestId,
        expected_version: Version,
        change: StatusChange,
        entry: AuditEntry,
    ) -> RepositoryFuture<'_, Request> {
        let result = self
            .mutate(request_id, expected_version, entry, |request, _| {
                request.status = change.to;
                if change.reviewer_id.is_some() {
                    request.reviewer_id = change.reviewer_id;
                }
                if change.review_notes.is_some() {
                    request.review_notes = change.review_notes;
                }
                Ok(())
            })
            .map(|(request, ())| request);
        Box::pin(std::future::ready(result))
    }

    fn attach_upload(
        &self,
        request_id: RequestId,
        expected_version: Version,
        attachment: Attachment,
        entry: AuditEntry,
    ) -> RepositoryFuture<'_, Request> {
        let result = self
            .mutate(request_id, expected_version, entry, |request, attachments| {
                if attachment.request_id != request_id {
                    return Err(RepositoryError::Database(
                        "attachment belongs to another request".to_string(),
                    ));
                }
                request.attachment_ids.push(attachment.id);
                attachments.insert(attachment.id, attachment);
                Ok(())
            })
            .map(|(request, ())| request);
        Box::pin(std::future::ready(result))
    }

    fn confirm_upload(
        &self,
        request_id: RequestId,
        expected_version: Version,
        upload: ConfirmedUpload,
        entry: AuditEntry,
    ) -> RepositoryFuture<'_, (Request, Attachment)> {
        let result = self.mutate(request_id, expected_version, entry, |_, attachments| {
            let attachment = attachments
                .get_mut(&upload.attachment_id)
                .filter(|a| a.request_id == request_id)
                .ok_or(RepositoryError::AttachmentNotFound(upload.attachment_id))?;
            if attachment.effective_status(upload.confirmed_at) != UploadStatus::Pending {
                return Err(RepositoryError::AttachmentExpired(upload.attachment_id));
            }
            attachment.upload_status = UploadStatus::Confirmed;
            attachment.confirmed_at = Some(upload.confirmed_at);
            attachment.checksum_sha256 = upload.checksum_sha256;
            Ok(attachment.clone())
        });
        Box::pin(std::future::ready(result))
    }

    fn get(&self, request_id: RequestId) -> RepositoryFuture<'_, Option<Request>> {
        let result = lock(&self.state).map(|s| s.requests.get(&request_id).cloned());
        Box::pin(std::future::ready(result))
    }

    fn attachments(&self, request_id: RequestId) -> RepositoryFuture<'_, Vec<Attachment>> {
        let result = lock(&self.state).map(|s| {
            s.requests
                .get(&request_id)
                .map(|r| {
                    r.attachment_ids
                        .iter()
                        .filter_map(|id| s.attachments.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default()
        });
        Box::pin(std::future::ready(result))
    }

    fn attachment(&self, attachment_id: AttachmentId) -> RepositoryFuture<'_, Option<Attachment>> {
        let result = lock(&self.state).map(|s| s.attachments.get(&attachment_id).cloned());
        Box::pin(std::future::ready(result))
    }

    fn expire_stale_attachments(&self, now: DateTime<Utc>) -> RepositoryFuture<'_, Vec<Attachment>> {
        let result = lock(&self.state).map(|mut s| {
            s.attachments
                .values_mut()
                .filter(|a| a.upload_status == UploadStatus::Pending && a.expires_at <= now)
                .map(|a| {
                    a.upload_status = UploadStatus::Expired;
                    a.clone()
                })
                .collect()
        });
        Box::pin(std::future::ready(result))
    }

    fn history(&self, request_id: RequestId) -> RepositoryFuture<'_, Vec<AuditEntry>> {
        let result = lock(&self.state).map(|s| s.history.get(&request_id).cloned().unwrap_or_default());
        Box::pin(std::future::ready(result))
    }
}

/// In-memory [`AuditLog`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditLog {
    state: Shared,
}

impl InMemoryAuditLog {
    /// Create an empty, standalone log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditLog for InMemoryAuditLog {
    fn append(&self, entry: AuditEntry) -> RepositoryFuture<'_, ()> {
        let result = lock(&self.state).and_then(|mut s| {
            let entries = s.history.entry(entry.request_id).or_default();
            if let Some(last) = entries.last() {
                if entry.sequence != last.sequence.next() {
                    return Err(RepositoryError::VersionConflict {
                        request_id: entry.request_id,
                        expected: entry.sequence,
                        actual: last.sequence.next(),
                    });
                }
            }
            entries.push(entry);
            Ok(())
        });
        Box::pin(std::future::ready(result))
    }

    fn history(&self, request_id: RequestId) -> RepositoryFuture<'_, Vec<AuditEntry>> {
        let result = lock(&self.state).map(|s| s.history.get(&request_id).cloned().unwrap_or_default());
        Box::pin(std::future::ready(result))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fixtures;
    use request_desk_core::audit::AuditAction;
    use request_desk_core::request::RequestStatus;
    use serde_json::json;

    fn draft() -> (Request, AuditEntry) {
        let actor = fixtures::investor();
        let request = Request::new_draft(
            RequestId::new(),
            actor.id,
            fixtures::feedback_payload(),
            crate::test_time(),
        );
        let entry = AuditEntry::new(
            request.id,
            Version::INITIAL,
            &actor,
            AuditAction::Created,
            None,
            RequestStatus::Draft,
            crate::test_time(),
            json!({}),
        );
        (request, entry)
    }

    fn submit_entry(request: &Request, sequence: Version) -> AuditEntry {
        AuditEntry::new(
            request.id,
            sequence,
            &fixtures::investor(),
            AuditAction::Submitted,
            Some(RequestStatus::Draft),
            RequestStatus::Submitted,
            crate::test_time(),
            json!({}),
        )
    }

    fn submitted() -> StatusChange {
        StatusChange {
            to: RequestStatus::Submitted,
            reviewer_id: None,
            review_notes: None,
        }
    }

    #[tokio::test]
    async fn transition_bumps_version_and_appends_history() {
        let repository = InMemoryRequestRepository::new();
        let (request, entry) = draft();
        repository.insert_draft(request.clone(), entry).await.unwrap();

        let updated = repository
            .transition(
                request.id,
                Version::INITIAL,
                submitted(),
                submit_entry(&request, Version::new(2)),
            )
            .await
            .unwrap();

        assert_eq!(updated.status, RequestStatus::Submitted);
        assert_eq!(updated.version, Version::new(2));
        assert_eq!(repository.history_len(request.id), 2);
    }

    #[tokio::test]
    async fn stale_version_writes_nothing() {
        let repository = InMemoryRequestRepository::new();
        let (request, entry) = draft();
        repository.insert_draft(request.clone(), entry).await.unwrap();

        let result = repository
            .transition(
                request.id,
                Version::new(7),
                submitted(),
                submit_entry(&request, Version::new(8)),
            )
            .await;

        assert!(matches!(
            result,
            Err(RepositoryError::VersionConflict { actual, .. }) if actual == Version::INITIAL
        ));
        let stored = repository.get(request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Draft);
        assert_eq!(repository.history_len(request.id), 1);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let repository = InMemoryRequestRepository::new();
        let (request, entry) = draft();
        repository.insert_draft(request.clone(), entry.clone()).await.unwrap();

        assert_eq!(
            repository.insert_draft(request.clone(), entry).await,
            Err(RepositoryError::AlreadyExists(request.id))
        );
    }

    #[tokio::test]
    async fn audit_log_view_shares_history() {
        let repository = InMemoryRequestRepository::new();
        let (request, entry) = draft();
        repository.insert_draft(request.clone(), entry).await.unwrap();

        let log = repository.audit_log();
        let history = log.history(request.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, AuditAction::Created);
    }

    fn staged(request: &Request, sequence: Version) -> (Attachment, AuditEntry) {
        let id = AttachmentId::new();
        let attachment = Attachment {
            id,
            request_id: request.id,
            storage_key: format!("requests/{}/{id}/deck.pdf", request.id),
            filename: "deck.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            declared_size_bytes: 1024,
            upload_status: UploadStatus::Pending,
            expires_at: crate::test_time() + chrono::Duration::minutes(15),
            confirmed_at: None,
            checksum_sha256: None,
        };
        let entry = AuditEntry::new(
            request.id,
            sequence,
            &fixtures::investor(),
            AuditAction::AttachmentStaged,
            Some(RequestStatus::Draft),
            RequestStatus::Draft,
            crate::test_time(),
            json!({ "attachment_id": id }),
        );
        (attachment, entry)
    }

    fn confirmed_entry(request: &Request, sequence: Version) -> AuditEntry {
        AuditEntry::new(
            request.id,
            sequence,
            &fixtures::investor(),
            AuditAction::AttachmentConfirmed,
            Some(RequestStatus::Draft),
            RequestStatus::Draft,
            crate::test_time(),
            json!({}),
        )
    }

    #[tokio::test]
    async fn confirming_swept_attachment_writes_nothing() {
        let repository = InMemoryRequestRepository::new();
        let (request, entry) = draft();
        repository.insert_draft(request.clone(), entry).await.unwrap();
        let (attachment, entry) = staged(&request, Version::new(2));
        let request = repository
            .attach_upload(request.id, Version::INITIAL, attachment.clone(), entry)
            .await
            .unwrap();

        let later = crate::test_time() + chrono::Duration::minutes(20);
        let swept = repository.expire_stale_attachments(later).await.unwrap();
        assert_eq!(swept.len(), 1);

        let result = repository
            .confirm_upload(
                request.id,
                request.version,
                ConfirmedUpload {
                    attachment_id: attachment.id,
                    confirmed_at: later,
                    checksum_sha256: None,
                },
                confirmed_entry(&request, Version::new(3)),
            )
            .await;

        assert_eq!(result, Err(RepositoryError::AttachmentExpired(attachment.id)));
        assert_eq!(repository.history_len(request.id), 2);
        let stored = repository.get(request.id).await.unwrap().unwrap();
        assert_eq!(stored.version, Version::new(2));
        let stored = repository.attachment(attachment.id).await.unwrap().unwrap();
        assert_eq!(stored.upload_status, UploadStatus::Expired);
    }

    #[tokio::test]
    async fn confirming_past_deadline_is_rejected_before_sweep() {
        let repository = InMemoryRequestRepository::new();
        let (request, entry) = draft();
        repository.insert_draft(request.clone(), entry).await.unwrap();
        let (attachment, entry) = staged(&request, Version::new(2));
        let request = repository
            .attach_upload(request.id, Version::INITIAL, attachment.clone(), entry)
            .await
            .unwrap();

        let result = repository
            .confirm_upload(
                request.id,
                request.version,
                ConfirmedUpload {
                    attachment_id: attachment.id,
                    confirmed_at: attachment.expires_at,
                    checksum_sha256: None,
                },
                confirmed_entry(&request, Version::new(3)),
            )
            .await;

        assert_eq!(result, Err(RepositoryError::AttachmentExpired(attachment.id)));
        assert_eq!(repository.history_len(request.id), 2);
    }

    #[tokio::test]
    async fn standalone_log_rejects_gaps() {
        let log = InMemoryAuditLog::new();
        let (request, entry) = draft();
        log.append(entry).await.unwrap();

        let gap = submit_entry(&request, Version::new(3));
        assert!(matches!(
            log.append(gap).await,
            Err(RepositoryError::VersionConflict { .. })
        ));
        log.append(submit_entry(&request, Version::new(2))).await.unwrap();
        assert_eq!(log.history(request.id).await.unwrap().len(), 2);
    }
}
