//! # Request Desk Testing
//!
//! Testing utilities for the request lifecycle.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - An in-memory repository and audit log with the same compare-and-swap semantics as Postgres
//! - A scriptable object store ([`MockObjectStorage`])
//! - A dispatcher that records what it was given ([`RecordingDispatcher`])
//! - Payload fixtures and proptest strategies
//!
//! ## Example
//!
//! ```ignore
//! use request_desk_testing::{InMemoryRequestRepository, MockObjectStorage, RecordingDispatcher};
//!
//! #[tokio::test]
//! async fn feedback_can_be_submitted() {
//!     let repository = Arc::new(InMemoryRequestRepository::new());
//!     let engine = RequestEngine::new(registry, repository.clone(), staging, dispatcher);
//!
//!     let draft = engine.create_draft(&investor, "feedback", &fixtures::feedback()).await?;
//!     let submitted = engine.submit(draft.id, &investor, draft.version).await?;
//!     assert_eq!(repository.history_len(draft.id), 2);
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use request_desk_core::environment::Clock;
use std::sync::{Arc, Mutex, PoisonError};

/// Payload fixtures and strategies
pub mod fixtures;

/// In-memory repository and audit log
pub mod in_memory;

/// Scriptable object storage and notification mocks
pub mod mocks;

/// Deterministic clocks.
pub mod clocks {
    use super::{Arc, Clock, DateTime, Duration, Mutex, PoisonError, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use request_desk_testing::FixedClock;
    /// use request_desk_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to. Clones share the same time.
    ///
    /// Used to walk upload slots past their deadline without sleeping.
    ///
    /// ```
    /// use request_desk_testing::ManualClock;
    /// use request_desk_core::environment::Clock;
    /// use chrono::Duration;
    ///
    /// let clock = ManualClock::starting_at(request_desk_testing::test_time());
    /// let before = clock.now();
    /// clock.advance(Duration::minutes(16));
    /// assert_eq!(clock.now() - before, Duration::minutes(16));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock reading `time`.
        #[must_use]
        pub fn starting_at(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honors `RUST_LOG`; safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use clocks::{FixedClock, ManualClock, test_clock, test_time};
pub use in_memory::{InMemoryAuditLog, InMemoryRequestRepository};
pub use mocks::{MockObjectStorage, RecordingDispatcher};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now(), test_time());
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::starting_at(test_time());
        let shared = clock.clone();
        clock.advance(Duration::seconds(30));
        assert_eq!(shared.now(), test_time() + Duration::seconds(30));

        shared.set(test_time());
        assert_eq!(clock.now(), test_time());
    }
}
