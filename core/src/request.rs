//! Core entities: requests, attachments and the actors that touch them.

use crate::ids::{ActorId, AttachmentId, RequestId};
use crate::payload::RequestPayload;
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a type tag does not name a registered request type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown request type: {0}")]
pub struct UnknownRequestType(pub String);

/// The closed set of request categories.
///
/// Adding a category means adding a variant here, a payload variant in
/// [`RequestPayload`](crate::payload::RequestPayload) and a schema in the
/// [`TypeRegistry`](crate::registry::TypeRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Nomination of a candidate for the board of directors.
    BoardNomination,
    /// Partnership proposal from a company.
    Partnership,
    /// General investor feedback.
    Feedback,
    /// Investor signup / onboarding.
    Signup,
}

impl RequestType {
    /// Every registered type, in a stable order.
    pub const ALL: [Self; 4] = [
        Self::BoardNomination,
        Self::Partnership,
        Self::Feedback,
        Self::Signup,
    ];

    /// Wire tag of this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BoardNomination => "board_nomination",
            Self::Partnership => "partnership",
            Self::Feedback => "feedback",
            Self::Signup => "signup",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = UnknownRequestType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownRequestType(s.to_string()))
    }
}

/// Lifecycle status of a request.
///
/// ```text
/// Draft → Submitted → UnderReview → Approved | Rejected | NeedsInfo
///                                                            ↓
///                                     Submitted ←────────────┘
/// (any non-terminal) → Withdrawn
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Being prepared by the submitter.
    Draft,
    /// Handed in, waiting for an administrator.
    Submitted,
    /// An administrator is reviewing it.
    UnderReview,
    /// The reviewer asked the submitter for more information.
    NeedsInfo,
    /// Accepted (terminal).
    Approved,
    /// Declined (terminal).
    Rejected,
    /// Pulled back by the submitter (terminal).
    Withdrawn,
}

impl RequestStatus {
    /// Whether no transitions leave this status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Withdrawn)
    }

    /// Whether the submitter may still edit the payload and attachments.
    #[must_use]
    pub const fn is_editable(&self) -> bool {
        matches!(self, Self::Draft | Self::NeedsInfo)
    }

    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::NeedsInfo => "needs_info",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
        }
    }

    /// Parse from the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "under_review" => Some(Self::UnderReview),
            "needs_info" => Some(Self::NeedsInfo),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "withdrawn" => Some(Self::Withdrawn),
            _ => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of an authenticated actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// An investor; may own requests.
    Investor,
    /// A reviewing administrator.
    Admin,
}

impl ActorRole {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Investor => "investor",
            Self::Admin => "admin",
        }
    }

    /// Parse from the wire representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "investor" => Some(Self::Investor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller of an engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Actor identifier.
    pub id: ActorId,
    /// Actor role.
    pub role: ActorRole,
}

impl Actor {
    /// Create an actor.
    #[must_use]
    pub const fn new(id: ActorId, role: ActorRole) -> Self {
        Self { id, role }
    }

    /// Shorthand for an investor actor.
    #[must_use]
    pub const fn investor(id: ActorId) -> Self {
        Self::new(id, ActorRole::Investor)
    }

    /// Shorthand for an admin actor.
    #[must_use]
    pub const fn admin(id: ActorId) -> Self {
        Self::new(id, ActorRole::Admin)
    }

    /// Whether this actor holds the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

/// One investor-submitted item flowing through the review lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Request identifier.
    pub id: RequestId,
    /// Request category; always matches the payload variant.
    pub request_type: RequestType,
    /// Owner of the request.
    pub submitter_id: ActorId,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// Type-specific, validated payload.
    pub payload: RequestPayload,
    /// Attachments staged on this request, in staging order.
    pub attachment_ids: Vec<AttachmentId>,
    /// Optimistic concurrency version.
    pub version: Version,
    /// Last administrator to act on the request.
    pub reviewer_id: Option<ActorId>,
    /// Reviewer notes (rejection reason or information request).
    pub review_notes: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last mutation.
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Build a new draft at [`Version::INITIAL`].
    #[must_use]
    pub fn new_draft(
        id: RequestId,
        submitter_id: ActorId,
        payload: RequestPayload,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            request_type: payload.request_type(),
            submitter_id,
            status: RequestStatus::Draft,
            payload,
            attachment_ids: Vec::new(),
            version: Version::INITIAL,
            reviewer_id: None,
            review_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `actor` owns this request.
    #[must_use]
    pub fn is_submitter(&self, actor: &Actor) -> bool {
        self.submitter_id == actor.id
    }

    /// Whether `actor` may read this request and its history.
    #[must_use]
    pub fn is_visible_to(&self, actor: &Actor) -> bool {
        actor.is_admin() || self.is_submitter(actor)
    }
}

/// Upload state of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Slot issued, upload not yet verified.
    Pending,
    /// Object verified in storage.
    Confirmed,
    /// Slot aged out before confirmation.
    Expired,
}

impl UploadStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Expired => "expired",
        }
    }

    /// Parse from the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A supporting file staged on a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment identifier.
    pub id: AttachmentId,
    /// Owning request.
    pub request_id: RequestId,
    /// Opaque handle into external storage.
    pub storage_key: String,
    /// Sanitized original filename.
    pub filename: String,
    /// MIME type declared at staging.
    pub content_type: String,
    /// Upper bound on the object size declared at staging.
    pub declared_size_bytes: u64,
    /// Persisted upload status. Use [`Attachment::effective_status`] to account for expiry.
    pub upload_status: UploadStatus,
    /// Deadline for confirmation.
    pub expires_at: DateTime<Utc>,
    /// When the upload was verified.
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Checksum recorded at confirmation, if the storage backend reported one.
    pub checksum_sha256: Option<String>,
}

impl Attachment {
    /// Status as observed at `now`: a pending slot past its deadline reads as expired even
    /// before the sweep has persisted that.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> UploadStatus {
        match self.upload_status {
            UploadStatus::Pending if now >= self.expires_at => UploadStatus::Expired,
            status => status,
        }
    }

    /// Whether the attachment is confirmed.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.upload_status == UploadStatus::Confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn request_type_round_trips_through_tag() {
        for t in RequestType::ALL {
            assert_eq!(t.as_str().parse::<RequestType>(), Ok(t));
        }
    }

    #[test]
    fn unknown_request_type_is_rejected() {
        assert_eq!(
            "bake_sale".parse::<RequestType>(),
            Err(UnknownRequestType("bake_sale".to_string()))
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Withdrawn.is_terminal());
        assert!(!RequestStatus::NeedsInfo.is_terminal());
        assert!(!RequestStatus::Draft.is_terminal());
    }

    #[test]
    fn status_parse_matches_as_str() {
        for status in [
            RequestStatus::Draft,
            RequestStatus::Submitted,
            RequestStatus::UnderReview,
            RequestStatus::NeedsInfo,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Withdrawn,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn pending_attachment_expires_lazily() {
        let now = Utc::now();
        let attachment = Attachment {
            id: AttachmentId::new(),
            request_id: RequestId::new(),
            storage_key: "uploads/x".to_string(),
            filename: "deck.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            declared_size_bytes: 10,
            upload_status: UploadStatus::Pending,
            expires_at: now,
            confirmed_at: None,
            checksum_sha256: None,
        };

        assert_eq!(
            attachment.effective_status(now - Duration::seconds(1)),
            UploadStatus::Pending
        );
        assert_eq!(attachment.effective_status(now), UploadStatus::Expired);
    }
}
