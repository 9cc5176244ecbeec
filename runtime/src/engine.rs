//! The request lifecycle engine.
//!
//! [`RequestEngine`] is the only component that mutates requests. Every operation follows the same
//! shape:
//!
//! 1. Validate the caller's input (payload, declared file, notes).
//! 2. Load the persisted request and check guards against it (ownership, status, version).
//! 3. Hand the change and its audit entry to the repository, which compares the caller's version
//!    and writes both atomically.
//! 4. After commit, emit one [`LifecycleEvent`] to the dispatcher.
//!
//! Version conflicts are surfaced to the caller unchanged. A dispatch failure never undoes a
//! committed mutation; it is logged and counted.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = RequestEngine::new(registry, repository, staging, dispatcher);
//!
//! let draft = engine
//!     .create_draft(&investor, "feedback", &json!({"subject": "Test issue", "message": message}))
//!     .await?;
//! let submitted = engine.submit(draft.id, &investor, draft.version).await?;
//! assert_eq!(submitted.status, RequestStatus::Submitted);
//! ```

use crate::metrics::{AttachmentMetrics, DispatchMetrics, EngineMetrics};
use crate::staging::{AttachmentStagingService, StageRequest};
use request_desk_core::audit::{AuditAction, AuditEntry};
use request_desk_core::environment::{Clock, SystemClock};
use request_desk_core::error::LifecycleError;
use request_desk_core::event::{Event, LifecycleEvent, NotificationDispatcher};
use request_desk_core::ids::{AttachmentId, RequestId};
use request_desk_core::payload::RequestPayload;
use request_desk_core::registry::{TypeRegistry, ValidationFailure};
use request_desk_core::repository::{RepositoryError, RequestRepository, StatusChange};
use request_desk_core::request::{Actor, Attachment, Request, RequestStatus, RequestType};
use request_desk_core::state_machine::{self, LifecycleAction};
use request_desk_core::storage::PresignedUpload;
use request_desk_core::version::Version;
use serde::Serialize;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// A freshly staged attachment and the capability to upload it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedUpload {
    /// The pending attachment row.
    pub attachment: Attachment,
    /// Presigned write capability for the client.
    pub upload: PresignedUpload,
    /// Request version after staging.
    pub version: Version,
}

/// A confirmed attachment and the request version it is current at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedAttachment {
    /// The confirmed attachment.
    pub attachment: Attachment,
    /// Request version after confirmation.
    pub version: Version,
}

/// A request as seen by one actor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestView {
    /// The request.
    pub request: Request,
    /// Its attachments, with lapsed slots reported as expired.
    pub attachments: Vec<Attachment>,
    /// Actions the viewing actor may attempt from the current status.
    pub allowed_actions: Vec<LifecycleAction>,
}

/// Orchestrates validation, state machine guards, staging, persistence and notification.
///
/// Cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct RequestEngine {
    registry: Arc<TypeRegistry>,
    repository: Arc<dyn RequestRepository>,
    staging: AttachmentStagingService,
    dispatcher: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl RequestEngine {
    /// Create an engine using the system clock.
    #[must_use]
    pub fn new(
        registry: Arc<TypeRegistry>,
        repository: Arc<dyn RequestRepository>,
        staging: AttachmentStagingService,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            registry,
            repository,
            staging,
            dispatcher,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock (tests drive expiry with a manual clock).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The type registry in use.
    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Validate `raw` against the schema for `type_tag` and persist a new draft owned by `actor`.
    ///
    /// File references cannot resolve on a brand-new request, so any reference is rejected.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::UnknownRequestType`] for an unregistered tag.
    /// - [`LifecycleError::InvalidPayload`] with every field error found.
    /// - [`LifecycleError::Repository`] if the write fails.
    #[tracing::instrument(skip(self, raw), fields(actor_id = %actor.id))]
    pub async fn create_draft(
        &self,
        actor: &Actor,
        type_tag: &str,
        raw: &Value,
    ) -> Result<Request, LifecycleError> {
        self.observe("create_draft", async {
            let payload = self.registry.validate(type_tag, raw).map_err(invalid)?;
            let references = self.registry.file_references(&payload);
            state_machine::check_references(&references, &[])
                .into_result()
                .map_err(LifecycleError::InvalidPayload)?;

            let now = self.clock.now();
            let request = Request::new_draft(RequestId::new(), actor.id, payload, now);
            let entry = AuditEntry::new(
                request.id,
                Version::INITIAL,
                actor,
                AuditAction::Created,
                None,
                RequestStatus::Draft,
                now,
                json!({ "type": request.request_type }),
            );
            let event = event_for(&entry, request.request_type, actor, None);

            let request = self.repository.insert_draft(request, entry).await?;

            EngineMetrics::record_created(request.request_type.as_str());
            EngineMetrics::record_mutation(AuditAction::Created.as_str());
            tracing::info!(
                request_id = %request.id,
                request_type = %request.request_type,
                "Draft created"
            );

            self.publish(event).await;
            Ok(request)
        })
        .await
    }

    /// Replace the payload of a draft (or a request sent back for more information).
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::RequestNotFound`] if the request does not exist.
    /// - [`LifecycleError::Forbidden`] unless `actor` is the submitter.
    /// - [`LifecycleError::NotEditable`] outside `Draft` and `NeedsInfo`.
    /// - [`LifecycleError::VersionConflict`] if `expected_version` is stale.
    /// - [`LifecycleError::InvalidPayload`] with every field error found, including file
    ///   references that do not name an attachment of this request.
    #[tracing::instrument(skip(self, raw), fields(actor_id = %actor.id))]
    pub async fn update_draft(
        &self,
        request_id: RequestId,
        actor: &Actor,
        expected_version: Version,
        raw: &Value,
    ) -> Result<Request, LifecycleError> {
        self.observe("update_draft", async {
            let request = self.load(request_id).await?;
            ensure_editable_by(&request, actor)?;
            ensure_version(&request, expected_version)?;

            let payload = self
                .registry
                .validate_typed(request.request_type, raw)
                .map_err(invalid)?;
            let attachments = self.repository.attachments(request_id).await?;
            let references = self.registry.file_references(&payload);
            state_machine::check_references(&references, &attachments)
                .into_result()
                .map_err(LifecycleError::InvalidPayload)?;

            let now = self.clock.now();
            let entry = AuditEntry::new(
                request_id,
                expected_version.next(),
                actor,
                AuditAction::Updated,
                Some(request.status),
                request.status,
                now,
                json!({ "changed_fields": changed_fields(&request.payload, &payload) }),
            );
            let event = event_for(&entry, request.request_type, actor, None);

            let updated = self
                .repository
                .update_payload(request_id, expected_version, payload, entry)
                .await?;

            EngineMetrics::record_mutation(AuditAction::Updated.as_str());
            tracing::info!(%request_id, version = %updated.version, "Draft updated");

            self.publish(event).await;
            Ok(updated)
        })
        .await
    }

    /// Stage a new attachment: record a pending slot and return a presigned upload for it.
    ///
    /// `expected_version` is optional; without it the write is made against the version just
    /// read, and still fails if another writer gets in between.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::RequestNotFound`], [`LifecycleError::Forbidden`],
    ///   [`LifecycleError::NotEditable`], [`LifecycleError::VersionConflict`] as for
    ///   [`RequestEngine::update_draft`].
    /// - [`LifecycleError::InvalidPayload`] for a bad filename, content type or size.
    /// - [`LifecycleError::Storage`] if the upload cannot be signed.
    #[tracing::instrument(skip(self, file), fields(actor_id = %actor.id, filename = %file.filename))]
    pub async fn presign_attachment(
        &self,
        request_id: RequestId,
        actor: &Actor,
        file: StageRequest,
        expected_version: Option<Version>,
    ) -> Result<StagedUpload, LifecycleError> {
        self.observe("presign_attachment", async {
            let request = self.load(request_id).await?;
            ensure_editable_by(&request, actor)?;
            let expected = expected_version.unwrap_or(request.version);
            ensure_version(&request, expected)?;

            let now = self.clock.now();
            let slot = self.staging.stage(&request, &file, now).await?;
            let attachment_id = slot.attachment.id;

            let entry = AuditEntry::new(
                request_id,
                expected.next(),
                actor,
                AuditAction::AttachmentStaged,
                Some(request.status),
                request.status,
                now,
                json!({
                    "attachment_id": attachment_id,
                    "filename": slot.attachment.filename,
                    "content_type": slot.attachment.content_type,
                    "declared_size_bytes": slot.attachment.declared_size_bytes,
                }),
            );
            let event = event_for(&entry, request.request_type, actor, Some(attachment_id));

            let updated = self
                .repository
                .attach_upload(request_id, expected, slot.attachment.clone(), entry)
                .await?;

            EngineMetrics::record_mutation(AuditAction::AttachmentStaged.as_str());
            tracing::info!(
                %request_id,
                %attachment_id,
                expires_at = %slot.attachment.expires_at,
                "Attachment staged"
            );

            self.publish(event).await;
            Ok(StagedUpload {
                attachment: slot.attachment,
                upload: slot.upload,
                version: updated.version,
            })
        })
        .await
    }

    /// Verify an upload against storage and mark the attachment confirmed.
    ///
    /// Confirming an attachment that is already confirmed returns it unchanged.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::RequestNotFound`] / [`LifecycleError::AttachmentNotFound`].
    /// - [`LifecycleError::Forbidden`] unless `actor` is the submitter.
    /// - [`LifecycleError::NotEditable`] outside `Draft` and `NeedsInfo`.
    /// - [`LifecycleError::AttachmentExpired`] if the slot lapsed; nothing is written.
    /// - [`LifecycleError::UploadVerificationFailed`] if storage does not hold a matching object.
    /// - [`LifecycleError::VersionConflict`] if the request changed during verification.
    #[tracing::instrument(skip(self, checksum_sha256), fields(actor_id = %actor.id))]
    pub async fn confirm_attachment(
        &self,
        request_id: RequestId,
        attachment_id: AttachmentId,
        actor: &Actor,
        checksum_sha256: Option<&str>,
    ) -> Result<ConfirmedAttachment, LifecycleError> {
        self.observe("confirm_attachment", async {
            let request = self.load(request_id).await?;
            if !request.is_submitter(actor) {
                return Err(LifecycleError::Forbidden(
                    "only the submitter may confirm uploads".to_string(),
                ));
            }
            let attachment = self.load_attachment(request_id, attachment_id).await?;

            if attachment.is_confirmed() {
                tracing::debug!(%attachment_id, "Attachment already confirmed");
                return Ok(ConfirmedAttachment {
                    attachment,
                    version: request.version,
                });
            }
            if !request.status.is_editable() {
                return Err(LifecycleError::NotEditable(request.status));
            }

            let now = self.clock.now();
            let upload = self.staging.verify(&attachment, checksum_sha256, now).await?;

            let entry = AuditEntry::new(
                request_id,
                request.version.next(),
                actor,
                AuditAction::AttachmentConfirmed,
                Some(request.status),
                request.status,
                now,
                json!({
                    "attachment_id": attachment_id,
                    "checksum_sha256": upload.checksum_sha256,
                }),
            );
            let event = event_for(&entry, request.request_type, actor, Some(attachment_id));

            let (updated, attachment) = match self
                .repository
                .confirm_upload(request_id, request.version, upload, entry)
                .await
            {
                Ok(confirmed) => confirmed,
                Err(conflict @ RepositoryError::VersionConflict { .. }) => {
                    // A concurrent confirmation of the same upload won the race.
                    let current = self.load_attachment(request_id, attachment_id).await?;
                    if !current.is_confirmed() {
                        return Err(conflict.into());
                    }
                    let request = self.load(request_id).await?;
                    return Ok(ConfirmedAttachment {
                        attachment: current,
                        version: request.version,
                    });
                }
                Err(e) => return Err(e.into()),
            };

            EngineMetrics::record_mutation(AuditAction::AttachmentConfirmed.as_str());
            tracing::info!(%request_id, %attachment_id, "Attachment confirmed");

            self.publish(event).await;
            Ok(ConfirmedAttachment {
                attachment,
                version: updated.version,
            })
        })
        .await
    }

    /// Submit a draft, or resubmit a request sent back for more information.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::IllegalTransition`] outside `Draft` and `NeedsInfo`.
    /// - [`LifecycleError::Forbidden`] unless `actor` is the submitter.
    /// - [`LifecycleError::VersionConflict`] if `expected_version` is stale.
    /// - [`LifecycleError::AttachmentNotConfirmed`] if an upload is still outstanding.
    /// - [`LifecycleError::GuardRejected`] if the payload no longer validates, a file reference
    ///   dangles, or the type's minimum attachment count is not met.
    #[tracing::instrument(skip(self), fields(actor_id = %actor.id))]
    pub async fn submit(
        &self,
        request_id: RequestId,
        actor: &Actor,
        expected_version: Version,
    ) -> Result<Request, LifecycleError> {
        self.observe(
            "submit",
            self.apply(request_id, actor, LifecycleAction::Submit, expected_version, None),
        )
        .await
    }

    /// Perform a reviewer action (`start_review`, `approve`, `reject`, `request_info`).
    ///
    /// Submitter actions are accepted too and checked against the same transition table.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::IllegalTransition`] if the action is not legal from the current status.
    /// - [`LifecycleError::Forbidden`] if `actor` may not perform it.
    /// - [`LifecycleError::GuardRejected`] if required notes are missing.
    /// - [`LifecycleError::VersionConflict`] if `expected_version` is stale.
    #[tracing::instrument(skip(self, notes), fields(actor_id = %actor.id))]
    pub async fn admin_transition(
        &self,
        request_id: RequestId,
        actor: &Actor,
        action: LifecycleAction,
        expected_version: Version,
        notes: Option<String>,
    ) -> Result<Request, LifecycleError> {
        self.observe(
            "admin_transition",
            self.apply(request_id, actor, action, expected_version, notes),
        )
        .await
    }

    /// Withdraw a request that has not reached a terminal status.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::IllegalTransition`] from a terminal status.
    /// - [`LifecycleError::Forbidden`] unless `actor` is the submitter.
    /// - [`LifecycleError::VersionConflict`] if `expected_version` is stale.
    #[tracing::instrument(skip(self), fields(actor_id = %actor.id))]
    pub async fn withdraw(
        &self,
        request_id: RequestId,
        actor: &Actor,
        expected_version: Version,
    ) -> Result<Request, LifecycleError> {
        self.observe(
            "withdraw",
            self.apply(request_id, actor, LifecycleAction::Withdraw, expected_version, None),
        )
        .await
    }

    /// Load a request with its attachments and the actions open to `actor`.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::RequestNotFound`] if the request does not exist.
    /// - [`LifecycleError::Forbidden`] if `actor` is neither the submitter nor an admin.
    #[tracing::instrument(skip(self), fields(actor_id = %actor.id))]
    pub async fn get_request(
        &self,
        request_id: RequestId,
        actor: &Actor,
    ) -> Result<RequestView, LifecycleError> {
        self.observe("get_request", async {
            let request = self.load_visible(request_id, actor).await?;
            let now = self.clock.now();
            let attachments = self
                .repository
                .attachments(request_id)
                .await?
                .into_iter()
                .map(|mut a| {
                    a.upload_status = a.effective_status(now);
                    a
                })
                .collect();
            let allowed_actions = state_machine::allowed_actions(&request, actor);

            Ok(RequestView {
                request,
                attachments,
                allowed_actions,
            })
        })
        .await
    }

    /// Audit history of a request, ordered by sequence.
    ///
    /// # Errors
    ///
    /// As for [`RequestEngine::get_request`].
    #[tracing::instrument(skip(self), fields(actor_id = %actor.id))]
    pub async fn get_history(
        &self,
        request_id: RequestId,
        actor: &Actor,
    ) -> Result<Vec<AuditEntry>, LifecycleError> {
        self.observe("get_history", async {
            self.load_visible(request_id, actor).await?;
            Ok(self.repository.history(request_id).await?)
        })
        .await
    }

    /// Persist `expired` on every pending attachment past its deadline. Returns how many changed.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Repository`] if the sweep query fails.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired_attachments(&self) -> Result<usize, LifecycleError> {
        self.observe("sweep_expired_attachments", async {
            let expired = self
                .repository
                .expire_stale_attachments(self.clock.now())
                .await?;

            if !expired.is_empty() {
                AttachmentMetrics::record_expired(expired.len());
                tracing::info!(count = expired.len(), "Expired stale upload slots");
            }
            Ok(expired.len())
        })
        .await
    }

    async fn apply(
        &self,
        request_id: RequestId,
        actor: &Actor,
        action: LifecycleAction,
        expected_version: Version,
        notes: Option<String>,
    ) -> Result<Request, LifecycleError> {
        let request = self.load(request_id).await?;
        ensure_version(&request, expected_version)?;
        let rule = state_machine::plan(&request, action, actor, notes.as_deref())?;

        let now = self.clock.now();
        if rule.requires_submission_check() {
            let attachments = self.repository.attachments(request_id).await?;
            state_machine::check_submission(&self.registry, &request, &attachments, now)?;
        }

        let notes = notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let change = if action.is_admin_action() {
            StatusChange {
                to: rule.to,
                reviewer_id: Some(actor.id),
                review_notes: notes.clone(),
            }
        } else {
            StatusChange {
                to: rule.to,
                reviewer_id: None,
                review_notes: None,
            }
        };

        let audit_action = match action {
            LifecycleAction::Submit => AuditAction::Submitted,
            LifecycleAction::Withdraw => AuditAction::Withdrawn,
            _ => AuditAction::Transitioned,
        };
        let entry = AuditEntry::new(
            request_id,
            expected_version.next(),
            actor,
            audit_action,
            Some(request.status),
            rule.to,
            now,
            json!({ "action": action, "notes": notes }),
        );
        let event = event_for(&entry, request.request_type, actor, None);

        let updated = self
            .repository
            .transition(request_id, expected_version, change, entry)
            .await?;

        EngineMetrics::record_mutation(audit_action.as_str());
        EngineMetrics::record_transition(request.status.as_str(), rule.to.as_str());
        tracing::info!(
            %request_id,
            %action,
            from = %request.status,
            to = %rule.to,
            version = %updated.version,
            "Request transitioned"
        );

        self.publish(event).await;
        Ok(updated)
    }

    async fn load(&self, request_id: RequestId) -> Result<Request, LifecycleError> {
        self.repository
            .get(request_id)
            .await?
            .ok_or(LifecycleError::RequestNotFound(request_id))
    }

    async fn load_visible(
        &self,
        request_id: RequestId,
        actor: &Actor,
    ) -> Result<Request, LifecycleError> {
        let request = self.load(request_id).await?;
        if request.is_visible_to(actor) {
            Ok(request)
        } else {
            Err(LifecycleError::Forbidden(
                "request belongs to another submitter".to_string(),
            ))
        }
    }

    async fn load_attachment(
        &self,
        request_id: RequestId,
        attachment_id: AttachmentId,
    ) -> Result<Attachment, LifecycleError> {
        self.repository
            .attachment(attachment_id)
            .await?
            .filter(|a| a.request_id == request_id)
            .ok_or(LifecycleError::AttachmentNotFound(attachment_id))
    }

    /// Hand a committed event to the dispatcher. Failures are logged, never returned.
    async fn publish(&self, event: LifecycleEvent) {
        let event_type = event.event_type();
        let request_id = event.request_id;
        if let Err(error) = self.dispatcher.dispatch(event).await {
            DispatchMetrics::record_failure(event_type);
            tracing::warn!(%request_id, event_type, %error, "Failed to dispatch lifecycle event");
        }
    }

    /// Time an operation and record its outcome.
    async fn observe<T, F>(&self, operation: &'static str, future: F) -> Result<T, LifecycleError>
    where
        F: Future<Output = Result<T, LifecycleError>>,
    {
        let started = Instant::now();
        let result = future.await;

        let code = result.as_ref().err().map(LifecycleError::code);
        if let Err(error) = &result {
            match error {
                LifecycleError::VersionConflict { .. } => {
                    EngineMetrics::record_conflict(operation);
                    tracing::warn!(operation, %error, "Version conflict");
                }
                LifecycleError::InvalidPayload(errors) => {
                    tracing::debug!(operation, %errors, "Input rejected");
                }
                LifecycleError::Storage(_) | LifecycleError::Repository(_) => {
                    tracing::error!(operation, %error, "Operation failed");
                }
                _ => {
                    tracing::warn!(operation, code = error.code(), %error, "Operation rejected");
                }
            }
        }

        EngineMetrics::record_operation(operation, started.elapsed(), code);
        result
    }
}

fn invalid(failure: ValidationFailure) -> LifecycleError {
    match failure {
        ValidationFailure::UnknownType(unknown) => unknown.into(),
        ValidationFailure::Invalid(errors) => LifecycleError::InvalidPayload(errors),
    }
}

fn ensure_editable_by(request: &Request, actor: &Actor) -> Result<(), LifecycleError> {
    if !request.is_submitter(actor) {
        return Err(LifecycleError::Forbidden(
            "only the submitter may modify this request".to_string(),
        ));
    }
    if !request.status.is_editable() {
        return Err(LifecycleError::NotEditable(request.status));
    }
    Ok(())
}

fn ensure_version(request: &Request, expected: Version) -> Result<(), LifecycleError> {
    if request.version == expected {
        Ok(())
    } else {
        Err(LifecycleError::VersionConflict {
            request_id: request.id,
            expected,
            actual: request.version,
        })
    }
}

fn event_for(
    entry: &AuditEntry,
    request_type: RequestType,
    actor: &Actor,
    attachment_id: Option<AttachmentId>,
) -> LifecycleEvent {
    LifecycleEvent {
        request_id: entry.request_id,
        request_type,
        action: entry.action,
        from_status: entry.previous_status,
        to_status: entry.new_status,
        actor: *actor,
        version: entry.sequence,
        occurred_at: entry.timestamp,
        attachment_id,
    }
}

/// Names of top-level payload fields whose value differs between `before` and `after`.
fn changed_fields(before: &RequestPayload, after: &RequestPayload) -> Vec<String> {
    let (Ok(Value::Object(before)), Ok(Value::Object(after))) =
        (before.to_fields(), after.to_fields())
    else {
        return Vec::new();
    };

    let mut changed: Vec<String> = after
        .iter()
        .filter(|(name, value)| before.get(*name) != Some(*value))
        .map(|(name, _)| name.clone())
        .chain(before.keys().filter(|name| !after.contains_key(*name)).cloned())
        .collect();
    changed.sort();
    changed
}
