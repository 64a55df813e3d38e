//! Engine and façade configuration.
//!
//! Loads from environment variables with sensible defaults. Every field also
//! has a `with_*` override for programmatic setup and tests.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// How many reopened successors a closed record may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReopenPolicy {
    /// Every reopen of a closed record succeeds; concurrent reopens produce
    /// sibling records linked to the same original.
    #[default]
    AllowConcurrent,
    /// A closed record may be reopened at most once. Later attempts fail with
    /// `AlreadyReopened`; the store makes the check and insert atomic.
    SingleSuccessor,
}

impl ReopenPolicy {
    /// Configuration string for this policy.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AllowConcurrent => "allow-concurrent",
            Self::SingleSuccessor => "single-successor",
        }
    }

    /// Parse a policy name; unknown values yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow-concurrent" | "allow_concurrent" => Some(Self::AllowConcurrent),
            "single-successor" | "single_successor" => Some(Self::SingleSuccessor),
            _ => None,
        }
    }

    /// Whether reopen inserts must be exclusive.
    #[must_use]
    pub const fn is_exclusive(&self) -> bool {
        matches!(self, Self::SingleSuccessor)
    }
}

/// Configuration for the Lifecycle Engine, Audit Chain Resolver and Access Façade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeskConfig {
    /// Reopen rule for closed records
    pub reopen_policy: ReopenPolicy,
    /// Maximum description length in characters
    pub max_description_len: usize,
    /// Whether the façade checks the acting user's role
    pub enforce_roles: bool,
    /// Maximum number of backward hops when walking an audit chain
    pub max_chain_depth: usize,
    /// Retries for read-only façade calls that hit a persistence error
    pub read_retries: usize,
    /// Initial backoff delay for read retries
    pub read_retry_delay: Duration,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            reopen_policy: ReopenPolicy::AllowConcurrent,
            max_description_len: 10_000,
            enforce_roles: true,
            max_chain_depth: 256,
            read_retries: 2,
            read_retry_delay: Duration::from_millis(50),
        }
    }
}

impl DeskConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `REQUESTDESK_REOPEN_POLICY` | `allow-concurrent` |
    /// | `REQUESTDESK_MAX_DESCRIPTION_LEN` | `10000` |
    /// | `REQUESTDESK_ENFORCE_ROLES` | `true` |
    /// | `REQUESTDESK_MAX_CHAIN_DEPTH` | `256` |
    /// | `REQUESTDESK_READ_RETRIES` | `2` |
    /// | `REQUESTDESK_READ_RETRY_DELAY_MS` | `50` |
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            reopen_policy: env::var("REQUESTDESK_REOPEN_POLICY")
                .ok()
                .and_then(|s| ReopenPolicy::parse(&s))
                .unwrap_or(defaults.reopen_policy),
            max_description_len: env::var("REQUESTDESK_MAX_DESCRIPTION_LEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_description_len),
            enforce_roles: env::var("REQUESTDESK_ENFORCE_ROLES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.enforce_roles),
            max_chain_depth: env::var("REQUESTDESK_MAX_CHAIN_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_chain_depth),
            read_retries: env::var("REQUESTDESK_READ_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.read_retries),
            read_retry_delay: env::var("REQUESTDESK_READ_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(defaults.read_retry_delay, Duration::from_millis),
        }
    }

    /// Set the reopen policy.
    #[must_use]
    pub const fn with_reopen_policy(mut self, policy: ReopenPolicy) -> Self {
        self.reopen_policy = policy;
        self
    }

    /// Set the maximum description length.
    #[must_use]
    pub const fn with_max_description_len(mut self, max: usize) -> Self {
        self.max_description_len = max;
        self
    }

    /// Enable or disable façade role checks.
    #[must_use]
    pub const fn with_enforce_roles(mut self, enforce: bool) -> Self {
        self.enforce_roles = enforce;
        self
    }

    /// Set the audit chain depth cap.
    #[must_use]
    pub const fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    /// Set read retry count and initial delay.
    #[must_use]
    pub const fn with_read_retries(mut self, retries: usize, delay: Duration) -> Self {
        self.read_retries = retries;
        self.read_retry_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parse() {
        assert_eq!(ReopenPolicy::parse("single-successor"), Some(ReopenPolicy::SingleSuccessor));
        assert_eq!(ReopenPolicy::parse(" SINGLE_SUCCESSOR "), Some(ReopenPolicy::SingleSuccessor));
        assert_eq!(ReopenPolicy::parse("allow-concurrent"), Some(ReopenPolicy::AllowConcurrent));
        assert_eq!(ReopenPolicy::parse("sometimes"), None);
    }

    #[test]
    fn policy_roundtrip() {
        for policy in [ReopenPolicy::AllowConcurrent, ReopenPolicy::SingleSuccessor] {
            assert_eq!(ReopenPolicy::parse(policy.as_str()), Some(policy));
        }
    }

    #[test]
    fn defaults() {
        let config = DeskConfig::default();
        assert_eq!(config.reopen_policy, ReopenPolicy::AllowConcurrent);
        assert!(!config.reopen_policy.is_exclusive());
        assert!(config.enforce_roles);
        assert_eq!(config.max_description_len, 10_000);
    }

    #[test]
    fn builder_overrides() {
        let config = DeskConfig::default()
            .with_reopen_policy(ReopenPolicy::SingleSuccessor)
            .with_enforce_roles(false)
            .with_max_chain_depth(4)
            .with_read_retries(0, Duration::ZERO);

        assert!(config.reopen_policy.is_exclusive());
        assert!(!config.enforce_roles);
        assert_eq!(config.max_chain_depth, 4);
        assert_eq!(config.read_retries, 0);
    }
}
