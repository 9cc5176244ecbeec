//! # Request Desk Core
//!
//! Domain model and pure decision logic for the request lifecycle engine.
//!
//! Investors submit structured requests (board nominations, partnership proposals, feedback,
//! signups). Administrators review and resolve them. This crate holds everything that can be
//! decided without I/O:
//!
//! - **Type registry**: declarative per-type schemas evaluated by one generic validator
//! - **State machine**: the static transition table and its guards
//! - **Entities**: requests, attachments, audit entries, versions
//! - **Ports**: traits for the repository, audit log, object storage and notification dispatch
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell: this crate decides, `request-desk-runtime` performs I/O
//! - Every mutation is guarded by an optimistic version check at the repository boundary
//! - Every mutation writes exactly one audit entry in the same atomic unit
//! - Dependencies are injected as trait objects, never looked up globally
//!
//! ## Example
//!
//! ```
//! use request_desk_core::registry::TypeRegistry;
//! use serde_json::json;
//!
//! let registry = TypeRegistry::standard().expect("built-in schemas compile");
//! let payload = registry
//!     .validate("feedback", &json!({"subject": "Test issue", "message": "a".repeat(25)}))
//!     .expect("valid feedback");
//!
//! assert_eq!(payload.request_type().as_str(), "feedback");
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod audit;
pub mod error;
pub mod event;
pub mod ids;
pub mod payload;
pub mod registry;
pub mod repository;
pub mod request;
pub mod schema;
pub mod state_machine;
pub mod storage;
pub mod validation;
pub mod version;

pub use audit::{AuditAction, AuditEntry, AuditLog};
pub use error::LifecycleError;
pub use event::{LifecycleEvent, NotificationDispatcher};
pub use ids::{ActorId, AttachmentId, AuditEntryId, RequestId};
pub use payload::RequestPayload;
pub use registry::TypeRegistry;
pub use repository::{RepositoryError, RequestRepository};
pub use request::{Actor, ActorRole, Attachment, Request, RequestStatus, RequestType, UploadStatus};
pub use state_machine::LifecycleAction;
pub use storage::{ObjectStorage, StorageError};
pub use validation::{FieldError, FieldErrors};
pub use version::Version;

/// Environment traits for dependency injection.
///
/// All time-dependent decisions (upload expiry, audit timestamps) read the clock through this
/// trait so tests can pin or advance time.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use request_desk_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
