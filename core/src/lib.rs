//! # Request Desk Core
//!
//! Core types and rules for staff request tickets.
//!
//! A Staff user files a request, an Admin closes it with documented action,
//! and a Staff user may later reopen a closed request. Reopening never edits
//! the closed record: it creates a new record linked back to it, so every
//! issue keeps an immutable audit chain.
//!
//! ## Core Concepts
//!
//! - **Request**: the ticket record ([`request::Request`])
//! - **Request Store**: durable keyed storage, no policy ([`request_store::RequestStore`])
//! - **Lifecycle rules**: pure transition checks ([`lifecycle`])
//! - **Environment**: injected dependencies such as the [`environment::Clock`]
//!
//! The engine, audit resolver and role-gated façade that tie these together
//! live in `requestdesk-runtime`.
//!
//! ## Example
//!
//! ```
//! use requestdesk_core::lifecycle::{ensure_reopenable, validate_description};
//! use requestdesk_core::request::{Request, RequestId};
//! use chrono::Utc;
//!
//! let description = validate_description("  Need log access ", 10_000).unwrap();
//! let request = Request::submitted(RequestId::new(1), "staff1".into(), description, Utc::now());
//!
//! // Only closed records can be reopened
//! assert!(ensure_reopenable(&request).is_err());
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Engine and façade configuration
pub mod config;

/// Error taxonomy for lifecycle operations
pub mod error;

/// Pure transition rules
pub mod lifecycle;

/// Request records
pub mod request;

/// Storage abstraction
pub mod request_store;

/// Environment module - Dependency injection traits
///
/// All time reads go through [`Clock`](environment::Clock) so record
/// timestamps, and therefore list ordering, are deterministic under test.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// let clock = SystemClock;
    ///
    /// // Test - fixed time for deterministic tests
    /// let clock = FixedClock::new(time);
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

pub use config::{DeskConfig, ReopenPolicy};
pub use error::{ErrorKind, RequestError};
pub use lifecycle::Transition;
pub use request::{NewRequest, Request, RequestClosure, RequestId, RequestStatus};
pub use request_store::{RequestStore, RequestStoreError};
