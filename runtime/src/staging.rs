//! Attachment staging service.
//!
//! Implements the two halves of the staged-upload protocol:
//!
//! 1. **Stage**: validate the declared file, derive an object key scoped to the request, and ask
//!    storage for a time-boxed presigned write capability for exactly that key.
//! 2. **Verify**: before an attachment may be confirmed, ask storage what actually landed at the
//!    key. Client-reported success is never trusted.
//!
//! The service performs no repository writes; the engine records the results atomically with
//! their audit entries.

use crate::config::StagingConfig;
use crate::metrics::AttachmentMetrics;
use chrono::{DateTime, Utc};
use request_desk_core::error::LifecycleError;
use request_desk_core::ids::AttachmentId;
use request_desk_core::repository::ConfirmedUpload;
use request_desk_core::request::{Attachment, Request, UploadStatus};
use request_desk_core::storage::{ObjectStorage, PresignedUpload, UploadSlot};
use request_desk_core::validation::{Constraint, ErrorCode, FieldError, FieldErrors};
use std::sync::Arc;

/// Longest filename kept after sanitization.
const MAX_FILENAME_CHARS: usize = 200;

/// What the client declares about a file it wants to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRequest {
    /// Original filename.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// Upper bound on the size in bytes.
    pub size_bytes: u64,
}

/// A pending attachment and its write capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSlot {
    /// Attachment row to record.
    pub attachment: Attachment,
    /// Presigned upload for the client.
    pub upload: PresignedUpload,
}

/// Issues upload slots and verifies uploads against storage.
#[derive(Clone)]
pub struct AttachmentStagingService {
    storage: Arc<dyn ObjectStorage>,
    config: StagingConfig,
}

impl AttachmentStagingService {
    /// Create a staging service over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn ObjectStorage>, config: StagingConfig) -> Self {
        Self { storage, config }
    }

    /// Staging configuration.
    #[must_use]
    pub const fn config(&self) -> &StagingConfig {
        &self.config
    }

    /// Validate the declared file and issue a presigned slot for it.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::InvalidPayload`] for an empty filename, a disallowed content type or
    ///   an out-of-range size.
    /// - [`LifecycleError::Storage`] if storage cannot sign the upload.
    pub async fn stage(
        &self,
        request: &Request,
        file: &StageRequest,
        now: DateTime<Utc>,
    ) -> Result<StagedSlot, LifecycleError> {
        let filename = self.check_declaration(file)?;
        let content_type = file.content_type.trim().to_ascii_lowercase();

        let attachment_id = AttachmentId::new();
        let storage_key = format!(
            "{}/{}/{}/{}",
            self.config.key_prefix.trim_end_matches('/'),
            request.id,
            attachment_id,
            filename
        );
        let expires_at = now
            + chrono::Duration::from_std(self.config.upload_ttl)
                .unwrap_or_else(|_| chrono::Duration::minutes(15));

        let upload = self
            .storage
            .presign_upload(UploadSlot {
                key: storage_key.clone(),
                content_type: content_type.clone(),
                max_size_bytes: file.size_bytes,
                expires_at,
            })
            .await?;

        AttachmentMetrics::record_staged();
        tracing::debug!(%attachment_id, key = %storage_key, "Upload slot issued");

        Ok(StagedSlot {
            attachment: Attachment {
                id: attachment_id,
                request_id: request.id,
                storage_key,
                filename,
                content_type,
                declared_size_bytes: file.size_bytes,
                upload_status: UploadStatus::Pending,
                expires_at,
                confirmed_at: None,
                checksum_sha256: None,
            },
            upload,
        })
    }

    /// Check that the object behind `attachment` exists and matches what was staged.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::AttachmentExpired`] if the slot aged out before confirmation.
    /// - [`LifecycleError::UploadVerificationFailed`] if the object is missing, empty, larger
    ///   than declared, or its checksum does not match.
    /// - [`LifecycleError::Storage`] if storage cannot be reached.
    pub async fn verify(
        &self,
        attachment: &Attachment,
        checksum_sha256: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ConfirmedUpload, LifecycleError> {
        if attachment.effective_status(now) == UploadStatus::Expired {
            return Err(LifecycleError::AttachmentExpired(attachment.id));
        }

        let fail = |reason: String| {
            AttachmentMetrics::record_verification_failure();
            tracing::warn!(attachment_id = %attachment.id, %reason, "Upload verification failed");
            LifecycleError::UploadVerificationFailed {
                attachment_id: attachment.id,
                reason,
            }
        };

        let Some(object) = self.storage.head(attachment.storage_key.clone()).await? else {
            return Err(fail("object not found in storage".to_string()));
        };

        if object.size_bytes == 0 {
            return Err(fail("object is empty".to_string()));
        }
        if object.size_bytes > attachment.declared_size_bytes {
            return Err(fail(format!(
                "object is {} bytes, declared at most {}",
                object.size_bytes, attachment.declared_size_bytes
            )));
        }

        let expected = checksum_sha256.map(str::to_ascii_lowercase);
        let reported = object.checksum_sha256.map(|c| c.to_ascii_lowercase());
        if let (Some(expected), Some(reported)) = (&expected, &reported) {
            if expected != reported {
                return Err(fail("checksum mismatch".to_string()));
            }
        }

        AttachmentMetrics::record_confirmed();
        Ok(ConfirmedUpload {
            attachment_id: attachment.id,
            confirmed_at: now,
            checksum_sha256: reported.or(expected),
        })
    }

    fn check_declaration(&self, file: &StageRequest) -> Result<String, LifecycleError> {
        let mut errors = FieldErrors::new();

        let filename = sanitize_filename(&file.filename);
        if filename.is_empty() {
            errors.push(FieldError::new("filename", ErrorCode::Required, Constraint::Presence));
        }

        if !self.config.allows(file.content_type.trim()) {
            errors.push(FieldError::new(
                "content_type",
                ErrorCode::NotAllowed,
                Constraint::OneOf {
                    values: self.config.allowed_content_types.clone(),
                },
            ));
        }

        let max = i64::try_from(self.config.max_upload_bytes).unwrap_or(i64::MAX);
        let size = Constraint::Range {
            min: Some(1),
            max: Some(max),
        };
        if file.size_bytes == 0 {
            errors.push(FieldError::new("size", ErrorCode::BelowMinimum, size));
        } else if file.size_bytes > self.config.max_upload_bytes {
            errors.push(FieldError::new("size", ErrorCode::AboveMaximum, size));
        }

        errors
            .into_result()
            .map(|()| filename)
            .map_err(LifecycleError::InvalidPayload)
    }
}

/// Reduce a client filename to a safe final path segment.
///
/// Directory components are dropped, anything outside `[A-Za-z0-9._-]` becomes `_`, leading dots
/// are stripped and the result is truncated.
#[must_use]
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.chars().all(|c| c == '_') {
        return String::new();
    }
    trimmed.chars().take(MAX_FILENAME_CHARS).collect()
}
