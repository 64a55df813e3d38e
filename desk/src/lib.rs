//! # Request Desk
//!
//! Process wiring for the request desk: configuration, tracing, metrics and
//! a desk backed by any [`RequestStore`](requestdesk_core::RequestStore).
//!
//! The `requestdesk` binary uses this to run a walkthrough against
//! PostgreSQL; the same functions drive the tests against the in-memory
//! store.

/// Application configuration
pub mod config;

use anyhow::Context;
use requestdesk_core::environment::SystemClock;
use requestdesk_core::request::{Request, RequestId};
use requestdesk_core::request_store::RequestStore;
use requestdesk_runtime::metrics::MetricsExporter;
use requestdesk_runtime::{Actor, AuditChain, RequestDesk};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::AppConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter.
///
/// # Errors
///
/// Returns error if a global subscriber is already installed.
pub fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to install tracing subscriber")
}

/// Install the Prometheus recorder if metrics are enabled.
///
/// # Errors
///
/// Returns error if the recorder cannot be built or installed.
pub fn init_metrics(config: &AppConfig) -> anyhow::Result<Option<MetricsExporter>> {
    if !config.metrics_enabled {
        return Ok(None);
    }

    let mut exporter = MetricsExporter::new();
    exporter.install().context("Failed to install metrics recorder")?;
    Ok(Some(exporter))
}

/// Build a desk over `store` using wall-clock time.
#[must_use]
pub fn build_desk(store: Arc<dyn RequestStore>, config: &AppConfig) -> RequestDesk {
    RequestDesk::new(store, Arc::new(SystemClock), config.desk.clone())
}

/// What the walkthrough produced.
#[derive(Debug, Clone)]
pub struct Walkthrough {
    /// The submitted, later closed request
    pub original: RequestId,
    /// The reopened successor
    pub reopened: RequestId,
    /// Open requests after the walkthrough
    pub active: Vec<Request>,
    /// Closed requests after the walkthrough
    pub closed: Vec<Request>,
    /// History behind the reopened request
    pub history: AuditChain,
}

/// Submit, close and reopen one request, then read everything back.
///
/// # Errors
///
/// Returns error if any desk call fails.
pub async fn run_walkthrough(
    desk: &RequestDesk,
    staff: &Actor,
    admin: &Actor,
) -> anyhow::Result<Walkthrough> {
    let original = desk
        .submit_new_request(staff, "Need log access")
        .await
        .context("submit failed")?;
    desk.close_request(admin, original, "Access granted")
        .await
        .context("close failed")?;
    let reopened = desk
        .reopen_request(staff, original, "Still can't access logs")
        .await
        .context("reopen failed")?;

    let active = desk.list_active_requests(admin).await.context("listing active failed")?;
    let closed = desk.list_closed_requests(admin).await.context("listing closed failed")?;
    let history = desk
        .request_history(admin, reopened)
        .await
        .context("history failed")?;

    Ok(Walkthrough {
        original,
        reopened,
        active,
        closed,
        history,
    })
}
