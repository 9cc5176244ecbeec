//! Background notification delivery.
//!
//! The engine publishes into a [`BroadcastDispatcher`](crate::BroadcastDispatcher) and never waits
//! on delivery. A [`NotificationWorker`] drains one subscription and hands each event to the
//! downstream dispatcher (a mailer, webhook client, or the log).

use crate::metrics::DispatchMetrics;
use request_desk_core::event::{Event, LifecycleEvent, NotificationDispatcher};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Forwards broadcast events to a downstream dispatcher until shut down.
pub struct NotificationWorker {
    events: broadcast::Receiver<LifecycleEvent>,
    downstream: Arc<dyn NotificationDispatcher>,
    shutdown: watch::Receiver<bool>,
}

impl NotificationWorker {
    /// Create a worker over `events` and the sender that stops it. Send `true` to stop.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let broadcast = BroadcastDispatcher::new(256);
    /// let (worker, shutdown) = NotificationWorker::new(broadcast.subscribe(), Arc::new(TracingDispatcher));
    /// let handle = tokio::spawn(worker.run());
    /// ```
    #[must_use]
    pub fn new(
        events: broadcast::Receiver<LifecycleEvent>,
        downstream: Arc<dyn NotificationDispatcher>,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Self {
            events,
            downstream,
            shutdown: shutdown_rx,
        };
        (worker, shutdown_tx)
    }

    /// Run until shutdown or until every publisher is gone. Returns the number of events handed
    /// downstream.
    pub async fn run(mut self) -> u64 {
        tracing::info!("Starting notification worker");
        let mut forwarded = 0_u64;

        while !*self.shutdown.borrow() {
            tokio::select! {
                received = self.events.recv() => match received {
                    Ok(event) => {
                        if self.deliver(event).await {
                            forwarded += 1;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Notification worker fell behind, events skipped");
                        DispatchMetrics::record_lagged(missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event channel closed");
                        break;
                    }
                },

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        tracing::info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        tracing::info!(forwarded, "Notification worker stopped");
        forwarded
    }

    async fn deliver(&self, event: LifecycleEvent) -> bool {
        let event_type = event.event_type();
        let request_id = event.request_id;
        tracing::debug!(
            event_type,
            %request_id,
            status_change = event.is_status_change(),
            "Forwarding lifecycle event"
        );
        match self.downstream.dispatch(event).await {
            Ok(()) => {
                DispatchMetrics::record_forwarded(event_type);
                true
            }
            Err(e) => {
                tracing::warn!(event_type, %request_id, error = %e, "Notification delivery failed");
                DispatchMetrics::record_failure(event_type);
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dispatch::BroadcastDispatcher;
    use chrono::Utc;
    use request_desk_core::audit::AuditAction;
    use request_desk_core::event::DispatchError;
    use request_desk_core::ids::{ActorId, RequestId};
    use request_desk_core::request::{Actor, RequestStatus, RequestType};
    use request_desk_core::version::Version;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Collecting {
        seen: Mutex<Vec<&'static str>>,
        fail: bool,
    }

    impl NotificationDispatcher for Collecting {
        fn dispatch(
            &self,
            event: LifecycleEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + '_>> {
            self.seen.lock().unwrap().push(event.event_type());
            let result = if self.fail {
                Err(DispatchError::Failed("mailer down".to_string()))
            } else {
                Ok(())
            };
            Box::pin(std::future::ready(result))
        }
    }

    fn event(action: AuditAction, to: RequestStatus) -> LifecycleEvent {
        LifecycleEvent {
            request_id: RequestId::new(),
            request_type: RequestType::Feedback,
            action,
            from_status: Some(RequestStatus::Draft),
            to_status: to,
            actor: Actor::investor(ActorId::new()),
            version: Version::new(2),
            occurred_at: Utc::now(),
            attachment_id: None,
        }
    }

    #[tokio::test]
    async fn forwards_events_until_publishers_are_gone() {
        let broadcast = BroadcastDispatcher::new(8);
        let downstream = Arc::new(Collecting::default());
        let (worker, _shutdown) = NotificationWorker::new(broadcast.subscribe(), downstream.clone());
        let handle = tokio::spawn(worker.run());

        broadcast
            .dispatch(event(AuditAction::Submitted, RequestStatus::Submitted))
            .await
            .unwrap();
        broadcast
            .dispatch(event(AuditAction::Withdrawn, RequestStatus::Withdrawn))
            .await
            .unwrap();
        drop(broadcast);

        let forwarded = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker stops when the channel closes")
            .unwrap();
        assert_eq!(forwarded, 2);
        assert_eq!(
            *downstream.seen.lock().unwrap(),
            vec!["RequestSubmitted.v1", "RequestWithdrawn.v1"]
        );
    }

    #[tokio::test]
    async fn delivery_failures_do_not_stop_the_worker() {
        let broadcast = BroadcastDispatcher::new(8);
        let downstream = Arc::new(Collecting {
            fail: true,
            ..Collecting::default()
        });
        let (worker, _shutdown) = NotificationWorker::new(broadcast.subscribe(), downstream.clone());
        let handle = tokio::spawn(worker.run());

        broadcast
            .dispatch(event(AuditAction::Submitted, RequestStatus::Submitted))
            .await
            .unwrap();
        broadcast
            .dispatch(event(AuditAction::Withdrawn, RequestStatus::Withdrawn))
            .await
            .unwrap();
        drop(broadcast);

        let forwarded = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker stops when the channel closes")
            .unwrap();
        assert_eq!(forwarded, 0);
        assert_eq!(downstream.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stops_on_shutdown_signal() {
        let broadcast = BroadcastDispatcher::new(8);
        let (worker, shutdown) =
            NotificationWorker::new(broadcast.subscribe(), Arc::new(Collecting::default()));
        let handle = tokio::spawn(worker.run());

        shutdown.send(true).unwrap();

        let forwarded = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker stops on shutdown")
            .unwrap();
        assert_eq!(forwarded, 0);
        assert_eq!(broadcast.subscriber_count(), 0);
    }
}
