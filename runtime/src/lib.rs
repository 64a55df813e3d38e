//! # Request Desk Runtime
//!
//! The moving parts around the core request types.
//!
//! ## Core Components
//!
//! - **Lifecycle Engine**: submit, close and reopen with store-level
//!   conditional writes ([`LifecycleEngine`])
//! - **Audit Chain Resolver**: follows reopened records back to the closed
//!   records they replaced ([`AuditChainResolver`])
//! - **Access Façade**: role-gated entry point with explicit [`Actor`]s and
//!   retried reads ([`RequestDesk`])
//! - **Metrics**: Prometheus counters and store latency histograms
//!
//! ## Example
//!
//! ```ignore
//! use requestdesk_runtime::{Actor, RequestDesk};
//!
//! let desk = RequestDesk::new(store, Arc::new(SystemClock), DeskConfig::from_env());
//!
//! let id = desk.submit_new_request(&Actor::staff("staff1"), "Need log access").await?;
//! desk.close_request(&Actor::admin("admin1"), id, "Access granted").await?;
//!
//! let reopened = desk
//!     .reopen_request(&Actor::staff("staff1"), id, "Still can't access logs")
//!     .await?;
//! let history = desk.request_history(&Actor::admin("admin1"), reopened).await?;
//! assert_eq!(history.len(), 2);
//! ```

/// Audit Chain Resolver
pub mod audit;

/// Access Façade
pub mod desk;

/// Lifecycle Engine
pub mod engine;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

pub use audit::{AuditChain, AuditChainResolver};
pub use desk::{Actor, RequestDesk, Role};
pub use engine::{LifecycleEngine, LifecycleEnvironment};
