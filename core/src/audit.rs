//! Append-only audit trail.
//!
//! Every mutation of a request produces exactly one [`AuditEntry`], written in the same atomic
//! unit as the mutation itself. The [`AuditLog`] port is a dumb ordered sink: the
//! one-entry-per-mutation invariant is enforced by the
//! [`RequestRepository`](crate::repository::RequestRepository), not here.

use crate::ids::{ActorId, AuditEntryId, RequestId};
use crate::repository::RepositoryFuture;
use crate::request::{Actor, ActorRole, RequestStatus};
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What kind of mutation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Draft created.
    Created,
    /// Payload edited.
    Updated,
    /// Submitted or resubmitted.
    Submitted,
    /// Admin transition (review, approve, reject, request info).
    Transitioned,
    /// Withdrawn by the submitter.
    Withdrawn,
    /// Upload slot issued.
    AttachmentStaged,
    /// Upload verified.
    AttachmentConfirmed,
}

impl AuditAction {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Submitted => "submitted",
            Self::Transitioned => "transitioned",
            Self::Withdrawn => "withdrawn",
            Self::AttachmentStaged => "attachment_staged",
            Self::AttachmentConfirmed => "attachment_confirmed",
        }
    }

    /// Parse from the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "submitted" => Some(Self::Submitted),
            "transitioned" => Some(Self::Transitioned),
            "withdrawn" => Some(Self::Withdrawn),
            "attachment_staged" => Some(Self::AttachmentStaged),
            "attachment_confirmed" => Some(Self::AttachmentConfirmed),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable record of a single mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier.
    pub id: AuditEntryId,
    /// Request the mutation applied to.
    pub request_id: RequestId,
    /// Position in the request's history; equals the request version the mutation produced.
    pub sequence: Version,
    /// Who performed the mutation.
    pub actor_id: ActorId,
    /// Role the actor held at the time.
    pub actor_role: ActorRole,
    /// Mutation kind.
    pub action: AuditAction,
    /// Status before the mutation (`None` for creation).
    pub previous_status: Option<RequestStatus>,
    /// Status after the mutation.
    pub new_status: RequestStatus,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Free-form context (changed fields, notes, attachment ids).
    pub metadata: Value,
}

impl AuditEntry {
    /// Build an entry for a mutation by `actor` that moves the request to `sequence`.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request_id: RequestId,
        sequence: Version,
        actor: &Actor,
        action: AuditAction,
        previous_status: Option<RequestStatus>,
        new_status: RequestStatus,
        timestamp: DateTime<Utc>,
        metadata: Value,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            request_id,
            sequence,
            actor_id: actor.id,
            actor_role: actor.role,
            action,
            previous_status,
            new_status,
            timestamp,
            metadata,
        }
    }
}

/// Durable, ordered sink for audit entries.
///
/// Repositories write entries inside their own transactions; this port exposes the sink on its
/// own for read paths and for backends where the log lives apart from the request rows.
///
/// Returns boxed futures so it can be held as `Arc<dyn AuditLog>`.
pub trait AuditLog: Send + Sync {
    /// Append one entry. Entries are never updated or removed.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`](crate::repository::RepositoryError::Database) if the write fails, or
    /// [`RepositoryError::VersionConflict`](crate::repository::RepositoryError::VersionConflict) if an entry already occupies `entry.sequence`.
    fn append(&self, entry: AuditEntry) -> RepositoryFuture<'_, ()>;

    /// All entries for a request ordered by sequence. Unknown requests yield an empty history.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`](crate::repository::RepositoryError) if the read fails.
    fn history(&self, request_id: RequestId) -> RepositoryFuture<'_, Vec<AuditEntry>>;
}

/// Replay a history into the sequence of statuses the request passed through.
///
/// Consecutive duplicates (edits and attachment activity that leave the status unchanged) are
/// collapsed, so the result is the request's status history.
#[must_use]
pub fn status_history(entries: &[AuditEntry]) -> Vec<RequestStatus> {
    let mut statuses: Vec<RequestStatus> = Vec::new();
    for entry in entries {
        if statuses.last() != Some(&entry.new_status) {
            statuses.push(entry.new_status);
        }
    }
    statuses
}
