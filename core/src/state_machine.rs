//! The request state machine.
//!
//! A static transition table is the single source of truth for which `(status, action)` pairs are
//! legal, who may perform them, and whether reviewer notes are required. Everything here is pure:
//! the engine loads the persisted request, asks [`plan`] whether the action is allowed, and only
//! then attempts the versioned write.

use crate::error::LifecycleError;
use crate::ids::AttachmentId;
use crate::registry::{TypeRegistry, ValidationFailure};
use crate::request::{Actor, Attachment, Request, RequestStatus, UploadStatus};
use crate::validation::{Constraint, ErrorCode, FieldError, FieldErrors};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An action that moves a request between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    /// Hand the request in (also used to resubmit after an information request).
    Submit,
    /// Admin picks the request up for review.
    StartReview,
    /// Admin accepts.
    Approve,
    /// Admin declines; notes required.
    Reject,
    /// Admin asks the submitter for more information; notes required.
    RequestInfo,
    /// Submitter pulls the request back.
    Withdraw,
}

impl LifecycleAction {
    /// Every action.
    pub const ALL: [Self; 6] = [
        Self::Submit,
        Self::StartReview,
        Self::Approve,
        Self::Reject,
        Self::RequestInfo,
        Self::Withdraw,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::StartReview => "start_review",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::RequestInfo => "request_info",
            Self::Withdraw => "withdraw",
        }
    }

    /// Status the action moves a request into.
    #[must_use]
    pub const fn target(&self) -> RequestStatus {
        match self {
            Self::Submit => RequestStatus::Submitted,
            Self::StartReview => RequestStatus::UnderReview,
            Self::Approve => RequestStatus::Approved,
            Self::Reject => RequestStatus::Rejected,
            Self::RequestInfo => RequestStatus::NeedsInfo,
            Self::Withdraw => RequestStatus::Withdrawn,
        }
    }

    /// Whether only administrators perform this action.
    #[must_use]
    pub const fn is_admin_action(&self) -> bool {
        matches!(
            self,
            Self::StartReview | Self::Approve | Self::Reject | Self::RequestInfo
        )
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action: {s}"))
    }
}

/// Who may perform a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRequirement {
    /// The request's submitter.
    Submitter,
    /// Any administrator.
    Admin,
}

impl ActorRequirement {
    fn permits(self, request: &Request, actor: &Actor) -> bool {
        match self {
            Self::Submitter => request.is_submitter(actor),
            Self::Admin => actor.is_admin(),
        }
    }
}

/// One legal row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    /// Status the request must currently be in.
    pub from: RequestStatus,
    /// Action performed.
    pub action: LifecycleAction,
    /// Resulting status.
    pub to: RequestStatus,
    /// Who may perform it.
    pub actor: ActorRequirement,
    /// Whether non-blank reviewer notes are required.
    pub notes_required: bool,
}

impl TransitionRule {
    /// Whether the submission guard (valid payload, confirmed attachments) applies.
    #[must_use]
    pub fn requires_submission_check(&self) -> bool {
        self.action == LifecycleAction::Submit
    }
}

const fn rule(
    from: RequestStatus,
    action: LifecycleAction,
    actor: ActorRequirement,
    notes_required: bool,
) -> TransitionRule {
    TransitionRule {
        from,
        action,
        to: action.target(),
        actor,
        notes_required,
    }
}

/// The complete transition table. Pairs not listed here are illegal.
pub static TRANSITIONS: &[TransitionRule] = &[
    rule(RequestStatus::Draft, LifecycleAction::Submit, ActorRequirement::Submitter, false),
    rule(RequestStatus::NeedsInfo, LifecycleAction::Submit, ActorRequirement::Submitter, false),
    rule(RequestStatus::Submitted, LifecycleAction::StartReview, ActorRequirement::Admin, false),
    rule(RequestStatus::UnderReview, LifecycleAction::Approve, ActorRequirement::Admin, false),
    rule(RequestStatus::UnderReview, LifecycleAction::Reject, ActorRequirement::Admin, true),
    rule(RequestStatus::UnderReview, LifecycleAction::RequestInfo, ActorRequirement::Admin, true),
    rule(RequestStatus::Draft, LifecycleAction::Withdraw, ActorRequirement::Submitter, false),
    rule(RequestStatus::Submitted, LifecycleAction::Withdraw, ActorRequirement::Submitter, false),
    rule(RequestStatus::UnderReview, LifecycleAction::Withdraw, ActorRequirement::Submitter, false),
    rule(RequestStatus::NeedsInfo, LifecycleAction::Withdraw, ActorRequirement::Submitter, false),
];

/// Look up the table row for `(from, action)`.
#[must_use]
pub fn resolve(from: RequestStatus, action: LifecycleAction) -> Option<&'static TransitionRule> {
    TRANSITIONS
        .iter()
        .find(|r| r.from == from && r.action == action)
}

/// Check the table, actor and notes guards for `action` on `request`.
///
/// # Errors
///
/// - [`LifecycleError::IllegalTransition`] if the pair is not in the table.
/// - [`LifecycleError::Forbidden`] if `actor` may not perform it.
/// - [`LifecycleError::GuardRejected`] naming `review_notes` if required notes are blank.
pub fn plan(
    request: &Request,
    action: LifecycleAction,
    actor: &Actor,
    notes: Option<&str>,
) -> Result<&'static TransitionRule, LifecycleError> {
    let rule = resolve(request.status, action).ok_or(LifecycleError::IllegalTransition {
        from: request.status,
        to: action.target(),
        action,
    })?;

    if !rule.actor.permits(request, actor) {
        let reason = match rule.actor {
            ActorRequirement::Submitter => "only the submitter may perform this action",
            ActorRequirement::Admin => "admin role required",
        };
        return Err(LifecycleError::Forbidden(reason.to_string()));
    }

    if rule.notes_required && notes.is_none_or(|n| n.trim().is_empty()) {
        return Err(LifecycleError::GuardRejected(FieldErrors::single(
            FieldError::new("review_notes", ErrorCode::Required, Constraint::Presence),
        )));
    }

    Ok(rule)
}

/// Actions `actor` could currently attempt on `request` (table and actor guards only).
#[must_use]
pub fn allowed_actions(request: &Request, actor: &Actor) -> Vec<LifecycleAction> {
    TRANSITIONS
        .iter()
        .filter(|r| r.from == request.status && r.actor.permits(request, actor))
        .map(|r| r.action)
        .collect()
}

/// Submission guard: every referenced attachment confirmed, payload valid, file references
/// resolvable, and the type's minimum attachment count met.
///
/// Attachment checks run first so that an unconfirmed upload is reported regardless of payload
/// validity. Pending slots block submission. Expired slots only block it when a payload field
/// still points at them; otherwise they are abandoned uploads and ignored.
///
/// # Errors
///
/// - [`LifecycleError::AttachmentNotConfirmed`] for the first blocking attachment.
/// - [`LifecycleError::GuardRejected`] with field errors for payload problems.
pub fn check_submission(
    registry: &TypeRegistry,
    request: &Request,
    attachments: &[Attachment],
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    let references = registry.file_references(&request.payload);
    let is_referenced = |id: AttachmentId| references.iter().any(|(_, r)| *r == id);

    for attachment in attachments {
        let blocking = match attachment.effective_status(now) {
            UploadStatus::Confirmed => false,
            UploadStatus::Pending => true,
            UploadStatus::Expired => is_referenced(attachment.id),
        };
        if blocking {
            return Err(LifecycleError::AttachmentNotConfirmed(attachment.id));
        }
    }

    let mut errors = match registry.revalidate(&request.payload) {
        Ok(_) => FieldErrors::new(),
        Err(ValidationFailure::Invalid(errors)) => errors,
        Err(ValidationFailure::UnknownType(unknown)) => {
            return Err(LifecycleError::UnknownRequestType(unknown.0));
        }
    };

    errors.extend(check_references(&references, attachments));

    let required = registry
        .schema(request.request_type)
        .map_or(0, crate::schema::RequestSchema::required_attachments);
    let confirmed = attachments.iter().filter(|a| a.is_confirmed()).count();
    if confirmed < required {
        errors.push(FieldError::new(
            "attachments",
            ErrorCode::BelowMinimum,
            Constraint::MinAttachments { min: required },
        ));
    }

    errors.into_result().map_err(LifecycleError::GuardRejected)
}

/// Field errors for file references that do not name one of `attachments`.
#[must_use]
pub fn check_references(
    references: &[(&'static str, AttachmentId)],
    attachments: &[Attachment],
) -> FieldErrors {
    let mut errors = FieldErrors::new();
    for (field, id) in references {
        if !attachments.iter().any(|a| a.id == *id) {
            errors.push(FieldError::new(
                *field,
                ErrorCode::InvalidReference,
                Constraint::AttachmentReference,
            ));
        }
    }
    errors
}
