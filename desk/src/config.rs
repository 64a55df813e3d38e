//! Application configuration.
//!
//! Combines the desk and database settings with process-level switches.

use requestdesk_core::config::DeskConfig;
use requestdesk_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};
use std::env;

/// Top-level configuration for the `requestdesk` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Engine, resolver and façade settings
    pub desk: DeskConfig,
    /// Database connection settings
    pub postgres: PostgresConfig,
    /// Log filter used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Whether to install the Prometheus recorder
    pub metrics_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            desk: DeskConfig::default(),
            postgres: PostgresConfig::default(),
            log_filter: "requestdesk=info,requestdesk_runtime=info,requestdesk_postgres=info"
                .to_string(),
            metrics_enabled: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// See [`DeskConfig::from_env`] and [`PostgresConfig::from_env`] for the
    /// variables they read. `METRICS_ENABLED` toggles the recorder.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            desk: DeskConfig::from_env(),
            postgres: PostgresConfig::from_env(),
            log_filter: defaults.log_filter,
            metrics_enabled: env::var("METRICS_ENABLED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.metrics_enabled),
        }
    }
}
