//! Background expiry sweep.
//!
//! Expiry is also observed lazily on every read, confirm and submit, so the sweep only makes
//! lapsed slots visible to queries that read the stored status directly.

use crate::engine::RequestEngine;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

/// Periodically calls [`RequestEngine::sweep_expired_attachments`] until shut down.
pub struct ExpirySweeper {
    engine: RequestEngine,
    period: Duration,
    shutdown: watch::Receiver<bool>,
}

impl ExpirySweeper {
    /// Create a sweeper and the sender that stops it. Send `true` to stop.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let (sweeper, shutdown) = ExpirySweeper::new(engine.clone(), Duration::from_secs(60));
    /// let handle = tokio::spawn(sweeper.run());
    ///
    /// shutdown.send(true).ok();
    /// handle.await?;
    /// ```
    #[must_use]
    pub fn new(engine: RequestEngine, period: Duration) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = Self {
            engine,
            period: period.max(Duration::from_millis(10)),
            shutdown: shutdown_rx,
        };
        (sweeper, shutdown_tx)
    }

    /// Run until a shutdown signal is received. Sweep failures are logged and retried on the next
    /// tick.
    pub async fn run(mut self) {
        tracing::info!(period_secs = self.period.as_secs(), "Starting expiry sweeper");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*self.shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.engine.sweep_expired_attachments().await {
                        tracing::error!(error = %e, "Expiry sweep failed");
                    }
                }

                changed = self.shutdown.changed() => {
                    // Sender dropped counts as shutdown.
                    if changed.is_err() || *self.shutdown.borrow() {
                        tracing::info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        tracing::info!("Expiry sweeper stopped");
    }
}
