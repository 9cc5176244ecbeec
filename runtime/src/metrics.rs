//! Prometheus metrics for the lifecycle engine.
//!
//! This module provides metric collection for:
//! - Engine operations (latency, outcome)
//! - Request creation, mutations and status transitions
//! - Version conflicts
//! - Attachment staging, confirmation and expiry
//! - Notification dispatch
//! - Storage retries
//!
//! # Example
//!
//! ```rust,no_run
//! use request_desk_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new();
//! server.start()?;
//!
//! // Serve `server.render()` from an HTTP route for Prometheus to scrape.
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder with a render handle.
#[derive(Default)]
pub struct MetricsServer {
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create an uninstalled recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a warning and succeeds
    /// without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_histogram!(
        "engine_operation_duration_seconds",
        "Time taken by lifecycle engine operations"
    );
    describe_counter!(
        "engine_operation_errors_total",
        "Engine operations that returned an error, by code"
    );

    describe_counter!("requests_created_total", "Drafts created, by request type");
    describe_counter!(
        "requests_mutations_total",
        "Committed request mutations, by audit action"
    );
    describe_counter!(
        "requests_transitions_total",
        "Status transitions, by from and to status"
    );
    describe_counter!(
        "requests_version_conflicts_total",
        "Writes rejected because the caller's version was stale"
    );

    describe_counter!("attachments_staged_total", "Upload slots issued");
    describe_counter!("attachments_confirmed_total", "Uploads verified");
    describe_counter!(
        "attachments_expired_total",
        "Pending uploads marked expired by the sweep"
    );
    describe_counter!(
        "attachments_verification_failures_total",
        "Confirmations rejected by storage verification"
    );

    describe_counter!(
        "dispatch_failures_total",
        "Lifecycle events the dispatcher could not hand over"
    );

    describe_counter!("retry_attempts_total", "Total number of storage retry attempts");
    describe_counter!("retry_successes_total", "Storage calls that succeeded after retrying");
    describe_counter!("retry_exhausted_total", "Storage calls that exhausted their retries");
}

/// Engine metrics recorder.
pub struct EngineMetrics;

impl EngineMetrics {
    /// Record one operation's latency, and its error code if it failed.
    pub fn record_operation(operation: &'static str, duration: Duration, error: Option<&'static str>) {
        histogram!("engine_operation_duration_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
        if let Some(code) = error {
            counter!("engine_operation_errors_total", "operation" => operation, "code" => code)
                .increment(1);
        }
    }

    /// Record a created draft.
    pub fn record_created(request_type: &'static str) {
        counter!("requests_created_total", "type" => request_type).increment(1);
    }

    /// Record a committed mutation.
    pub fn record_mutation(action: &'static str) {
        counter!("requests_mutations_total", "action" => action).increment(1);
    }

    /// Record a status transition.
    pub fn record_transition(from: &'static str, to: &'static str) {
        counter!("requests_transitions_total", "from" => from, "to" => to).increment(1);
    }

    /// Record a version conflict.
    pub fn record_conflict(operation: &'static str) {
        counter!("requests_version_conflicts_total", "operation" => operation).increment(1);
    }
}

/// Attachment metrics recorder.
pub struct AttachmentMetrics;

impl AttachmentMetrics {
    /// Record an issued upload slot.
    pub fn record_staged() {
        counter!("attachments_staged_total").increment(1);
    }

    /// Record a verified upload.
    pub fn record_confirmed() {
        counter!("attachments_confirmed_total").increment(1);
    }

    /// Record uploads expired by the sweep.
    pub fn record_expired(count: usize) {
        counter!("attachments_expired_total").increment(count as u64);
    }

    /// Record a failed verification.
    pub fn record_verification_failure() {
        counter!("attachments_verification_failures_total").increment(1);
    }
}

/// Dispatch metrics recorder.
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record an event that could not be dispatched.
    pub fn record_failure(event_type: &'static str) {
        counter!("dispatch_failures_total", "event_type" => event_type).increment(1);
    }

    /// Record an event handed to the downstream notifier.
    pub fn record_forwarded(event_type: &'static str) {
        counter!("notifications_forwarded_total", "event_type" => event_type).increment(1);
    }

    /// Record events a slow subscriber skipped.
    pub fn record_lagged(missed: u64) {
        counter!("notifications_lagged_total").increment(missed);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let server = MetricsServer::new();
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn test_engine_metrics_render() {
        let mut server = MetricsServer::new();
        server.start().unwrap();

        EngineMetrics::record_created("feedback");
        EngineMetrics::record_transition("draft", "submitted");
        AttachmentMetrics::record_staged();

        // If another test installed the recorder first, this server has no handle.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("requests_created_total"));
            assert!(rendered.contains("requests_transitions_total"));
            assert!(rendered.contains("attachments_staged_total"));
        }
    }
}
