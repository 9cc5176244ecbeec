//! # Request Desk Runtime
//!
//! Runtime implementation of the request lifecycle.
//!
//! This crate wires the pure rules in `request-desk-core` to real collaborators and runs them.
//!
//! ## Core Components
//!
//! - **Engine** ([`RequestEngine`]): validates, guards, persists and notifies, one operation at a time
//! - **Staging** ([`AttachmentStagingService`]): issues presigned upload slots and verifies uploads
//! - **Storage** ([`HttpObjectStorage`]): S3-compatible gateway adapter with query-signed URLs
//! - **Dispatch** ([`BroadcastDispatcher`], [`TracingDispatcher`]): post-commit notifications
//! - **Notifier** ([`NotificationWorker`]): drains the broadcast channel into downstream delivery
//! - **Sweeper** ([`ExpirySweeper`]): background expiry of lapsed upload slots
//!
//! ## Example
//!
//! ```ignore
//! use request_desk_runtime::{AttachmentStagingService, RequestEngine, StagingConfig};
//!
//! let staging = AttachmentStagingService::new(storage, StagingConfig::default());
//! let engine = RequestEngine::new(registry, repository, staging, dispatcher);
//!
//! let draft = engine.create_draft(&investor, "feedback", &payload).await?;
//! let submitted = engine.submit(draft.id, &investor, draft.version).await?;
//! ```

/// Staging and storage configuration
pub mod config;

/// Notification dispatchers
pub mod dispatch;

/// The request lifecycle engine
pub mod engine;

/// Prometheus metrics for observability
pub mod metrics;

/// Background notification delivery
pub mod notifier;

/// Retry logic with exponential backoff
pub mod retry;

/// Attachment staging and upload verification
pub mod staging;

/// HTTP object storage adapter
pub mod storage;

/// Background expiry sweep
pub mod sweeper;

pub use config::{StagingConfig, StorageConfig};
pub use dispatch::{BroadcastDispatcher, TracingDispatcher};
pub use engine::{ConfirmedAttachment, RequestEngine, RequestView, StagedUpload};
pub use metrics::MetricsServer;
pub use notifier::NotificationWorker;
pub use staging::{AttachmentStagingService, StageRequest};
pub use storage::HttpObjectStorage;
pub use sweeper::ExpirySweeper;
