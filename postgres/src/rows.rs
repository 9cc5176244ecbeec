//! Row decoding and column conversions.

use chrono::{DateTime, Utc};
use request_desk_core::audit::{AuditAction, AuditEntry};
use request_desk_core::ids::{ActorId, AttachmentId, AuditEntryId, RequestId};
use request_desk_core::payload::RequestPayload;
use request_desk_core::repository::RepositoryError;
use request_desk_core::request::{
    ActorRole, Attachment, Request, RequestStatus, RequestType, UploadStatus,
};
use request_desk_core::version::Version;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

pub(crate) fn database(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Database(error.to_string())
}

fn corrupt(what: &str, value: &str) -> RepositoryError {
    RepositoryError::Serialization(format!("invalid {what} '{value}'"))
}

/// Whether the error is a unique-key violation (SQLSTATE 23505).
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|e| e.code())
        .is_some_and(|code| code == "23505")
}

pub(crate) fn version_to_db(version: Version) -> Result<i64, RepositoryError> {
    i64::try_from(version.value())
        .map_err(|_| RepositoryError::Serialization(format!("version {version} out of range")))
}

pub(crate) fn version_from_db(value: i64) -> Result<Version, RepositoryError> {
    u64::try_from(value)
        .map(Version::new)
        .map_err(|_| RepositoryError::Serialization(format!("negative version {value}")))
}

pub(crate) fn size_to_db(size: u64) -> Result<i64, RepositoryError> {
    i64::try_from(size)
        .map_err(|_| RepositoryError::Serialization(format!("size {size} out of range")))
}

pub(crate) fn payload_to_db(payload: &RequestPayload) -> Result<serde_json::Value, RepositoryError> {
    serde_json::to_value(payload).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

pub(crate) fn request_from_row(row: &PgRow) -> Result<Request, RepositoryError> {
    let request_type: String = row.try_get("request_type").map_err(database)?;
    let status: String = row.try_get("status").map_err(database)?;
    let payload: serde_json::Value = row.try_get("payload").map_err(database)?;
    let attachment_ids: Vec<Uuid> = row.try_get("attachment_ids").map_err(database)?;
    let reviewer_id: Option<Uuid> = row.try_get("reviewer_id").map_err(database)?;

    Ok(Request {
        id: RequestId::from_uuid(row.try_get("id").map_err(database)?),
        request_type: request_type
            .parse::<RequestType>()
            .map_err(|_| corrupt("request type", &request_type))?,
        submitter_id: ActorId::from_uuid(row.try_get("submitter_id").map_err(database)?),
        status: RequestStatus::parse(&status).ok_or_else(|| corrupt("status", &status))?,
        payload: serde_json::from_value(payload)
            .map_err(|e| RepositoryError::Serialization(format!("payload: {e}")))?,
        attachment_ids: attachment_ids.into_iter().map(AttachmentId::from_uuid).collect(),
        version: version_from_db(row.try_get("version").map_err(database)?)?,
        reviewer_id: reviewer_id.map(ActorId::from_uuid),
        review_notes: row.try_get("review_notes").map_err(database)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(database)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(database)?,
    })
}

pub(crate) fn attachment_from_row(row: &PgRow) -> Result<Attachment, RepositoryError> {
    let upload_status: String = row.try_get("upload_status").map_err(database)?;
    let declared: i64 = row.try_get("declared_size_bytes").map_err(database)?;

    Ok(Attachment {
        id: AttachmentId::from_uuid(row.try_get("id").map_err(database)?),
        request_id: RequestId::from_uuid(row.try_get("request_id").map_err(database)?),
        storage_key: row.try_get("storage_key").map_err(database)?,
        filename: row.try_get("filename").map_err(database)?,
        content_type: row.try_get("content_type").map_err(database)?,
        declared_size_bytes: u64::try_from(declared)
            .map_err(|_| corrupt("declared size", &declared.to_string()))?,
        upload_status: UploadStatus::parse(&upload_status)
            .ok_or_else(|| corrupt("upload status", &upload_status))?,
        expires_at: row.try_get("expires_at").map_err(database)?,
        confirmed_at: row.try_get("confirmed_at").map_err(database)?,
        checksum_sha256: row.try_get("checksum_sha256").map_err(database)?,
    })
}

pub(crate) fn audit_entry_from_row(row: &PgRow) -> Result<AuditEntry, RepositoryError> {
    let actor_role: String = row.try_get("actor_role").map_err(database)?;
    let action: String = row.try_get("action").map_err(database)?;
    let previous_status: Option<String> = row.try_get("previous_status").map_err(database)?;
    let new_status: String = row.try_get("new_status").map_err(database)?;

    Ok(AuditEntry {
        id: AuditEntryId::from_uuid(row.try_get("id").map_err(database)?),
        request_id: RequestId::from_uuid(row.try_get("request_id").map_err(database)?),
        sequence: version_from_db(row.try_get("sequence").map_err(database)?)?,
        actor_id: ActorId::from_uuid(row.try_get("actor_id").map_err(database)?),
        actor_role: ActorRole::parse(&actor_role).ok_or_else(|| corrupt("actor role", &actor_role))?,
        action: AuditAction::parse(&action).ok_or_else(|| corrupt("audit action", &action))?,
        previous_status: previous_status
            .map(|s| RequestStatus::parse(&s).ok_or_else(|| corrupt("status", &s)))
            .transpose()?,
        new_status: RequestStatus::parse(&new_status)
            .ok_or_else(|| corrupt("status", &new_status))?,
        timestamp: row.try_get("timestamp").map_err(database)?,
        metadata: row.try_get("metadata").map_err(database)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_round_trip_through_bigint() {
        assert_eq!(version_to_db(Version::new(7)), Ok(7));
        assert_eq!(version_from_db(7), Ok(Version::new(7)));
        assert!(matches!(
            version_from_db(-1),
            Err(RepositoryError::Serialization(_))
        ));
    }

    #[test]
    fn oversized_values_do_not_fit_bigint() {
        assert!(version_to_db(Version::new(u64::MAX)).is_err());
        assert!(size_to_db(u64::MAX).is_err());
    }
}
