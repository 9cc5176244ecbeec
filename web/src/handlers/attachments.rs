//! Attachment staging endpoints.
//!
//! Clients ask for a presigned slot, upload directly to storage, then confirm. Confirmation
//! re-checks the object in storage before the attachment counts as uploaded.

use crate::error::AppError;
use crate::extractors::{ApiJson, AuthenticatedActor};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use request_desk_core::ids::{AttachmentId, RequestId};
use request_desk_core::version::Version;
use request_desk_runtime::{ConfirmedAttachment, StageRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of the presign call.
#[derive(Debug, Deserialize)]
pub struct PresignBody {
    /// Original filename.
    pub filename: String,
    /// Declared MIME type.
    pub content_type: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Version the client last read; omitted means "whatever is current".
    #[serde(default)]
    pub expected_version: Option<Version>,
}

/// Upload slot handed to the client.
#[derive(Debug, Serialize)]
pub struct PresignResponse {
    /// Attachment to reference from the payload and to confirm later.
    pub attachment_id: AttachmentId,
    /// Where to `PUT` the file.
    pub upload_url: String,
    /// Headers the `PUT` must carry.
    pub upload_headers: BTreeMap<String, String>,
    /// Deadline for uploading and confirming.
    pub expires_at: DateTime<Utc>,
    /// Request version after staging.
    pub version: Version,
}

/// Body of the confirm call. May be omitted.
#[derive(Debug, Default, Deserialize)]
pub struct ConfirmBody {
    /// Checksum the client computed, compared with the one storage reports.
    #[serde(default)]
    pub checksum_sha256: Option<String>,
}

impl ConfirmBody {
    /// Decode an optional body: empty or `null` means no checksum, anything else must be valid.
    ///
    /// # Errors
    ///
    /// `BAD_REQUEST` if a non-empty body is not a valid confirm object.
    pub fn from_raw(raw: &[u8]) -> Result<Self, AppError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice::<Option<Self>>(raw)
            .map(Option::unwrap_or_default)
            .map_err(|e| AppError::bad_request(format!("Invalid confirm body: {e}")))
    }
}

/// `POST /api/requests/:id/attachments/presign`
pub async fn presign_attachment(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<RequestId>,
    ApiJson(body): ApiJson<PresignBody>,
) -> Result<Json<PresignResponse>, AppError> {
    let file = StageRequest {
        filename: body.filename,
        content_type: body.content_type,
        size_bytes: body.size,
    };
    let staged = state
        .engine
        .presign_attachment(request_id, &actor, file, body.expected_version)
        .await?;

    Ok(Json(PresignResponse {
        attachment_id: staged.attachment.id,
        upload_url: staged.upload.url,
        upload_headers: staged.upload.headers,
        expires_at: staged.attachment.expires_at,
        version: staged.version,
    }))
}

/// `POST /api/requests/:id/attachments/:attachment_id/confirm`
pub async fn confirm_attachment(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path((request_id, attachment_id)): Path<(RequestId, AttachmentId)>,
    body: Bytes,
) -> Result<Json<ConfirmedAttachment>, AppError> {
    let body = ConfirmBody::from_raw(&body)?;
    let confirmed = state
        .engine
        .confirm_attachment(
            request_id,
            attachment_id,
            &actor,
            body.checksum_sha256.as_deref(),
        )
        .await?;
    Ok(Json(confirmed))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn empty_or_null_body_means_no_checksum() {
        for raw in [&b""[..], b"  \n", b"null", b"{}"] {
            assert!(ConfirmBody::from_raw(raw).unwrap().checksum_sha256.is_none());
        }
    }

    #[test]
    fn checksum_is_read_from_body() {
        let body = ConfirmBody::from_raw(br#"{"checksum_sha256":"abc123"}"#).unwrap();
        assert_eq!(body.checksum_sha256.as_deref(), Some("abc123"));
    }

    #[test]
    fn malformed_body_is_rejected() {
        for raw in [&b"{\"checksum_sha256\":"[..], b"checksum", br#"{"checksum_sha256":42}"#] {
            let error = ConfirmBody::from_raw(raw).unwrap_err();
            assert_eq!(error.status(), StatusCode::BAD_REQUEST);
            assert_eq!(error.code(), "BAD_REQUEST");
        }
    }
}
