//! # Request Desk Testing
//!
//! Testing utilities and helpers for request desk.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`SteppingClock`])
//! - An in-memory [`RequestStore`](requestdesk_core::request_store::RequestStore)
//!   with the same conditional-write semantics as the PostgreSQL store
//! - A store that always fails, for exercising persistence error paths
//!
//! ## Example
//!
//! ```ignore
//! use requestdesk_testing::{InMemoryRequestStore, SteppingClock};
//! use requestdesk_runtime::RequestDesk;
//!
//! #[tokio::test]
//! async fn test_submit() {
//!     let desk = RequestDesk::new(
//!         Arc::new(InMemoryRequestStore::new()),
//!         Arc::new(SteppingClock::default()),
//!         DeskConfig::default(),
//!     );
//!
//!     let id = desk.submit_new_request(&Actor::staff("staff1"), "Need log access").await?;
//!     assert_eq!(id.value(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use requestdesk_core::environment::Clock;

mod request_store_mocks;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use requestdesk_testing::mocks::FixedClock;
    /// use requestdesk_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
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

    /// Clock that advances by a fixed step on every read.
    ///
    /// Each record created through the engine gets a distinct, strictly
    /// increasing timestamp, so ordering assertions do not depend on ids.
    ///
    /// # Example
    ///
    /// ```
    /// use requestdesk_testing::mocks::SteppingClock;
    /// use requestdesk_core::environment::Clock;
    ///
    /// let clock = SteppingClock::default();
    /// assert!(clock.now() < clock.now());
    /// ```
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: Duration,
    }

    impl SteppingClock {
        /// Start at `start`, advancing by `step` after each read
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }
    }

    impl Default for SteppingClock {
        fn default() -> Self {
            Self::new(test_time(), Duration::seconds(1))
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let mut next = match self.next.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let current = *next;
            *next = current + self.step;
            current
        }
    }

    /// The instant all test clocks start from (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }
}

/// Test helpers and utilities
pub mod helpers {
    /// Install a `tracing` subscriber that writes through the test harness.
    ///
    /// Safe to call from every test; only the first call installs anything.
    /// Honours `RUST_LOG`, defaulting to `debug` for the request desk crates.
    pub fn init_test_tracing() {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("requestdesk=debug,requestdesk_runtime=debug")
        });

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use helpers::init_test_tracing;
pub use mocks::{FixedClock, SteppingClock, test_clock, test_time};
pub use request_store_mocks::{InMemoryRequestStore, UnavailableRequestStore};
