//! Notification dispatchers.
//!
//! - [`BroadcastDispatcher`]: fans events out to in-process subscribers over a tokio broadcast
//!   channel, drained by a [`NotificationWorker`](crate::NotificationWorker).
//! - [`TracingDispatcher`]: writes each event to the log.

use request_desk_core::event::{DispatchError, Event, LifecycleEvent, NotificationDispatcher};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::broadcast;

type DispatchFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + 'a>>;

/// Fan-out over a tokio broadcast channel.
///
/// Slow subscribers that fall more than `capacity` events behind miss events (they observe
/// `RecvError::Lagged`); the engine is never blocked by them.
#[derive(Clone)]
pub struct BroadcastDispatcher {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastDispatcher {
    /// Create a dispatcher buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl NotificationDispatcher for BroadcastDispatcher {
    fn dispatch(&self, event: LifecycleEvent) -> DispatchFuture<'_> {
        Box::pin(async move {
            let event_type = event.event_type();
            match self.sender.send(event) {
                Ok(delivered) => {
                    tracing::debug!(event_type, delivered, "Lifecycle event broadcast");
                }
                Err(_) => {
                    tracing::debug!(event_type, "Lifecycle event dropped, no subscribers");
                }
            }
            Ok(())
        })
    }
}

/// Logs every event at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDispatcher;

impl NotificationDispatcher for TracingDispatcher {
    fn dispatch(&self, event: LifecycleEvent) -> DispatchFuture<'_> {
        Box::pin(async move {
            tracing::info!(
                event_type = event.event_type(),
                request_id = %event.request_id,
                request_type = %event.request_type,
                from = ?event.from_status,
                to = %event.to_status,
                actor_id = %event.actor.id,
                version = %event.version,
                "Lifecycle event"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use request_desk_core::audit::AuditAction;
    use request_desk_core::ids::{ActorId, RequestId};
    use request_desk_core::request::{Actor, RequestStatus, RequestType};
    use request_desk_core::version::Version;

    fn event() -> LifecycleEvent {
        LifecycleEvent {
            request_id: RequestId::new(),
            request_type: RequestType::Partnership,
            action: AuditAction::Submitted,
            from_status: Some(RequestStatus::Draft),
            to_status: RequestStatus::Submitted,
            actor: Actor::investor(ActorId::new()),
            version: Version::new(2),
            occurred_at: Utc::now(),
            attachment_id: None,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_broadcast_events() {
        let dispatcher = BroadcastDispatcher::new(8);
        let mut first = dispatcher.subscribe();
        let mut second = dispatcher.subscribe();
        let sent = event();

        dispatcher.dispatch(sent.clone()).await.unwrap();

        assert_eq!(first.recv().await.unwrap(), sent);
        assert_eq!(second.recv().await.unwrap(), sent);
    }

    #[tokio::test]
    async fn broadcasting_without_subscribers_is_not_an_error() {
        let dispatcher = BroadcastDispatcher::new(8);
        assert_eq!(dispatcher.subscriber_count(), 0);
        assert!(dispatcher.dispatch(event()).await.is_ok());
    }

    #[tokio::test]
    async fn tracing_dispatcher_accepts_every_event() {
        assert!(TracingDispatcher.dispatch(event()).await.is_ok());
    }
}
