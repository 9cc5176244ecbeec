//! Lifecycle events and the notification dispatch port.
//!
//! After every committed mutation the engine emits one [`LifecycleEvent`] to a
//! [`NotificationDispatcher`]. Delivery (e-mail, push, webhooks) lives outside the engine; the
//! dispatcher only hands the typed event over.
//!
//! # Example
//!
//! ```
//! use request_desk_core::event::Event;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! enum ReminderEvent {
//!     ReminderSent { request_id: String },
//! }
//!
//! impl Event for ReminderEvent {
//!     fn event_type(&self) -> &'static str {
//!         "ReminderSent.v1"
//!     }
//! }
//! ```

use crate::audit::AuditAction;
use crate::ids::{AttachmentId, RequestId};
use crate::request::{Actor, RequestStatus, RequestType};
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// An event that can be handed to downstream consumers.
///
/// `event_type()` returns a stable identifier with a version suffix (`"RequestSubmitted.v1"`) so
/// consumers can route and evolve schemas independently.
pub trait Event: Send + Sync + 'static {
    /// Versioned event type identifier.
    fn event_type(&self) -> &'static str;
}

/// Emitted once per committed mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Request that changed.
    pub request_id: RequestId,
    /// Its type.
    pub request_type: RequestType,
    /// Mutation kind (matches the audit entry).
    pub action: AuditAction,
    /// Status before (`None` on creation).
    pub from_status: Option<RequestStatus>,
    /// Status after.
    pub to_status: RequestStatus,
    /// Who did it.
    pub actor: Actor,
    /// Version after the mutation.
    pub version: Version,
    /// When it was committed.
    pub occurred_at: DateTime<Utc>,
    /// Attachment concerned, for staging and confirmation.
    pub attachment_id: Option<AttachmentId>,
}

impl LifecycleEvent {
    /// Whether the status changed.
    #[must_use]
    pub fn is_status_change(&self) -> bool {
        self.from_status != Some(self.to_status)
    }
}

impl Event for LifecycleEvent {
    fn event_type(&self) -> &'static str {
        match self.action {
            AuditAction::Created => "RequestCreated.v1",
            AuditAction::Updated => "RequestUpdated.v1",
            AuditAction::Submitted => "RequestSubmitted.v1",
            AuditAction::Withdrawn => "RequestWithdrawn.v1",
            AuditAction::AttachmentStaged => "AttachmentStaged.v1",
            AuditAction::AttachmentConfirmed => "AttachmentConfirmed.v1",
            AuditAction::Transitioned => match self.to_status {
                RequestStatus::UnderReview => "RequestReviewStarted.v1",
                RequestStatus::Approved => "RequestApproved.v1",
                RequestStatus::Rejected => "RequestRejected.v1",
                RequestStatus::NeedsInfo => "RequestInfoRequested.v1",
                _ => "RequestTransitioned.v1",
            },
        }
    }
}

/// Errors from a notification dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No consumer accepted the event.
    #[error("No subscribers for {0}")]
    NoSubscribers(String),

    /// The downstream channel failed.
    #[error("Dispatch failed: {0}")]
    Failed(String),
}

/// Boundary to the external notification system.
///
/// Dispatch happens after the mutation has committed; failures are reported but never roll the
/// mutation back.
pub trait NotificationDispatcher: Send + Sync {
    /// Hand one event to downstream consumers.
    ///
    /// # Errors
    ///
    /// [`DispatchError`] if the event could not be handed over.
    fn dispatch(
        &self,
        event: LifecycleEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + '_>>;
}
