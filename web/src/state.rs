//! Application state for Axum handlers.

use request_desk_postgres::PostgresRequestRepository;
use request_desk_runtime::{MetricsServer, RequestEngine};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by [`ReadinessProbe::check`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>>;

/// A dependency `/ready` must reach before the service takes traffic.
pub trait ReadinessProbe: Send + Sync {
    /// Name reported in the readiness body.
    fn name(&self) -> &'static str;

    /// Succeed if the dependency answers.
    fn check(&self) -> ProbeFuture<'_>;
}

impl ReadinessProbe for PostgresRequestRepository {
    fn name(&self) -> &'static str {
        "database"
    }

    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(async move { self.ping().await.map_err(|e| e.to_string()) })
    }
}

/// Probe that always succeeds; used with in-memory adapters.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

impl ReadinessProbe for AlwaysReady {
    fn name(&self) -> &'static str {
        "in_memory"
    }

    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle engine behind every `/api` route.
    pub engine: RequestEngine,
    /// Dependencies checked by `/ready`.
    pub readiness: Arc<dyn ReadinessProbe>,
    /// Prometheus recorder rendered by `/metrics`, if installed.
    pub metrics: Option<Arc<MetricsServer>>,
}

impl AppState {
    /// State with no readiness dependencies and no metrics recorder.
    #[must_use]
    pub fn new(engine: RequestEngine) -> Self {
        Self {
            engine,
            readiness: Arc::new(AlwaysReady),
            metrics: None,
        }
    }

    /// Check `probe` on `/ready`.
    #[must_use]
    pub fn with_readiness(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.readiness = probe;
        self
    }

    /// Render `metrics` on `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsServer>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}
