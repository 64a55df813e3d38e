//! Prometheus metrics for the request lifecycle.
//!
//! Counters track accepted and rejected transitions; a histogram times every
//! store call made by the engine and resolver.
//!
//! # Example
//!
//! ```rust,no_run
//! use requestdesk_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//!
//! // Later, e.g. from a scrape handler
//! let body = exporter.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use requestdesk_core::error::RequestError;
use requestdesk_core::request_store::RequestStoreError;
use std::future::Future;
use std::time::Instant;
use thiserror::Error;

/// Records created by `submit`.
pub const REQUESTS_SUBMITTED: &str = "requests_submitted_total";
/// Records moved to closed.
pub const REQUESTS_CLOSED: &str = "requests_closed_total";
/// Reopened records created.
pub const REQUESTS_REOPENED: &str = "requests_reopened_total";
/// Operations rejected, labelled by error kind.
pub const REQUESTS_REJECTED: &str = "requests_rejected_total";
/// Store calls that returned an error.
pub const STORE_ERRORS: &str = "request_store_errors_total";
/// Store call latency, labelled by operation.
pub const STORE_DURATION: &str = "request_store_operation_duration_seconds";

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installs a Prometheus recorder and renders the scrape body.
///
/// Serving the rendered text over HTTP is left to the embedding application.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Create an exporter with no recorder installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// A recorder can only be installed once per process. If one is already
    /// present (e.g. another test installed it) this logs a warning and
    /// returns `Ok` without a handle.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!(
                        "Metrics recorder already initialized, skipping re-initialization"
                    );
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the recorder handle.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this exporter did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register descriptions for every request desk metric.
pub fn register_metrics() {
    describe_counter!(REQUESTS_SUBMITTED, "Total number of requests submitted");
    describe_counter!(REQUESTS_CLOSED, "Total number of requests closed by an admin");
    describe_counter!(
        REQUESTS_REOPENED,
        "Total number of reopened records created from closed requests"
    );
    describe_counter!(
        REQUESTS_REJECTED,
        "Total number of lifecycle or façade operations rejected, by error kind"
    );
    describe_counter!(STORE_ERRORS, "Total number of failed request store calls");
    describe_histogram!(
        STORE_DURATION,
        "Time taken by request store calls, by operation"
    );
}

/// Count a rejected operation under its error kind.
pub fn record_rejection(error: &RequestError) {
    counter!(REQUESTS_REJECTED, "kind" => error.kind().as_str()).increment(1);
}

/// Await a store call, recording its latency and counting failures.
///
/// # Errors
///
/// Returns whatever error the store call produced.
pub async fn observe_store<T, F>(operation: &'static str, call: F) -> Result<T, RequestStoreError>
where
    F: Future<Output = Result<T, RequestStoreError>>,
{
    let start = Instant::now();
    let result = call.await;
    histogram!(STORE_DURATION, "operation" => operation).record(start.elapsed().as_secs_f64());

    if let Err(error) = &result {
        counter!(STORE_ERRORS, "operation" => operation).increment(1);
        tracing::warn!(operation, error = %error, "Request store call failed");
    }

    result
}
