//! Client configuration structures
//!
//! Every setting here is fixed at client construction time. In particular the
//! truncation threshold models a server-side behavior, so it is a client-wide
//! setting rather than a per-query parameter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BASE_BACKOFF_SECS, DEFAULT_JITTER_RANGE_SECS, DEFAULT_JOB_WAIT_SECS,
    DEFAULT_MAX_CONCURRENT_SUBQUERIES, DEFAULT_MAX_POLLS, DEFAULT_MAX_RESULTS,
    DEFAULT_MAX_RETRIES, DEFAULT_RATE_CAPACITY, DEFAULT_RATE_REFILL_AMOUNT,
    DEFAULT_RATE_REFILL_INTERVAL_SECS, DEFAULT_TIMEOUT_SECS, DEFAULT_TRUNCATION_THRESHOLD,
};
use crate::errors::{PceError, Result};
use crate::utils::serde::duration_millis;

/// Top-level client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API root, e.g. `https://pce.example.com:8443/api/v2`
    pub base_url: String,
    /// Organization the client operates in
    pub org_id: u64,
    /// Per-request transport timeout
    #[serde(rename = "timeout_ms", with = "duration_millis", default = "default_timeout")]
    pub timeout: Duration,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub jobs: JobSettings,
    #[serde(default)]
    pub query: QuerySettings,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the endpoint.
    pub fn new(base_url: impl Into<String>, org_id: u64) -> Self {
        Self {
            base_url: base_url.into(),
            org_id,
            timeout: default_timeout(),
            user_agent: None,
            rate_limit: RateLimitSettings::default(),
            retry: RetryPolicy::default(),
            jobs: JobSettings::default(),
            query: QuerySettings::default(),
        }
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    /// Returns `PceError::Config` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(PceError::Config("base_url must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(PceError::Config("timeout_ms must be greater than 0".into()));
        }
        if self.rate_limit.capacity == 0 || self.rate_limit.refill_amount == 0 {
            return Err(PceError::Config(
                "rate_limit capacity and refill_amount must be greater than 0".into(),
            ));
        }
        if self.rate_limit.refill_interval.is_zero() {
            return Err(PceError::Config("rate_limit.refill_interval_ms must be > 0".into()));
        }
        if self.jobs.max_polls == 0 {
            return Err(PceError::Config("jobs.max_polls must be at least 1".into()));
        }
        if self.jobs.default_wait.is_zero() {
            return Err(PceError::Config("jobs.default_wait_ms must be > 0".into()));
        }
        if self.query.truncation_threshold == 0 {
            return Err(PceError::Config("query.truncation_threshold must be at least 1".into()));
        }
        if self.query.max_results < self.query.truncation_threshold {
            return Err(PceError::Config(format!(
                "query.max_results ({}) must not be below query.truncation_threshold ({})",
                self.query.max_results, self.query.truncation_threshold
            )));
        }
        if self.query.max_concurrent_subqueries == 0 {
            return Err(PceError::Config(
                "query.max_concurrent_subqueries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Token bucket settings shared by every request of one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub capacity: u64,
    pub refill_amount: u64,
    #[serde(rename = "refill_interval_ms", with = "duration_millis")]
    pub refill_interval: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_RATE_CAPACITY,
            refill_amount: DEFAULT_RATE_REFILL_AMOUNT,
            refill_interval: Duration::from_secs(DEFAULT_RATE_REFILL_INTERVAL_SECS),
        }
    }
}

/// Retry-on-throttle policy
///
/// Only HTTP 429 is retried. Each retry sleeps
/// `base_backoff + uniform(0..=jitter_range)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(rename = "base_backoff_ms", with = "duration_millis")]
    pub base_backoff: Duration,
    #[serde(rename = "jitter_range_ms", with = "duration_millis")]
    pub jitter_range: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration, jitter_range: Duration) -> Self {
        Self { max_retries, base_backoff, jitter_range }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: Duration::from_secs(DEFAULT_BASE_BACKOFF_SECS),
            jitter_range: Duration::from_secs(DEFAULT_JITTER_RANGE_SECS),
        }
    }
}

/// Async job polling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Wait used when the server omits `Retry-After` or sends zero
    #[serde(rename = "default_wait_ms", with = "duration_millis")]
    pub default_wait: Duration,
    /// Status polls allowed before giving up on a job
    pub max_polls: u32,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self { default_wait: Duration::from_secs(DEFAULT_JOB_WAIT_SECS), max_polls: DEFAULT_MAX_POLLS }
    }
}

/// Traffic query decomposition settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Result count at or above which truncation is suspected
    pub truncation_threshold: usize,
    /// `max_results` sent with every traffic query
    pub max_results: usize,
    /// Sub-queries of one decomposition level allowed in flight at once
    pub max_concurrent_subqueries: usize,
    /// Run traffic queries through the async job protocol
    #[serde(rename = "async")]
    pub async_queries: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            truncation_threshold: DEFAULT_TRUNCATION_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
            max_concurrent_subqueries: DEFAULT_MAX_CONCURRENT_SUBQUERIES,
            async_queries: true,
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ClientConfig::new("https://pce.example.com:8443/api/v2", 1);
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.query.async_queries);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
base_url = "https://pce.local/api/v2"
org_id = 3

[retry]
max_retries = 5

[query]
truncation_threshold = 1000
max_results = 1000
async = false
"#,
        )
        .unwrap();

        assert_eq!(config.org_id, 3);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_backoff, Duration::from_secs(DEFAULT_BASE_BACKOFF_SECS));
        assert_eq!(config.query.truncation_threshold, 1000);
        assert!(!config.query.async_queries);
        assert_eq!(config.jobs.max_polls, DEFAULT_MAX_POLLS);
    }

    #[test]
    fn test_validate_rejects_threshold_above_max_results() {
        let mut config = ClientConfig::new("https://pce.local", 1);
        config.query.truncation_threshold = 500;
        config.query.max_results = 100;
        assert!(matches!(config.validate(), Err(PceError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = ClientConfig::new("https://pce.local", 1);
        config.jobs.max_polls = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::new("https://pce.local", 1);
        config.rate_limit.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::new(" ", 1);
        config.query.max_concurrent_subqueries = 0;
        assert!(config.validate().is_err());
    }
}
