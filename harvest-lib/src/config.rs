//! Settings for one harvest run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BoundaryPolicy, Charset, ErrorKind, RateLimitConfig, Result};

/// Default cap on the number of names per response
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// Default number of concurrent workers
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Default number of retries before a prefix is recorded as failed
pub const DEFAULT_MAX_RETRIES: u32 = 8;

/// Default number of completed queries between two checkpoints
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 200;

/// Default maximum age of the last checkpoint while queries keep completing
pub const DEFAULT_CHECKPOINT_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// Default prefix length at which exploration stops
pub const DEFAULT_MAX_PREFIX_LEN: usize = 64;

/// Default time in-flight queries get to finish after a stop request
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Everything that shapes the exploration itself.
///
/// Transport settings (endpoint, timeouts, headers) live on the
/// [`ClientBuilder`](crate::ClientBuilder) instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarvestConfig {
    /// Cap the endpoint applies to each response
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Number of concurrent workers
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Retries after a rate-limited or transient query before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Completed queries between two checkpoints, `0` disables this trigger
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Write a checkpoint at least this often while queries keep completing
    #[serde(default = "default_checkpoint_max_age", with = "humantime_serde")]
    pub checkpoint_max_age: Option<Duration>,

    /// Characters used to extend prefixes
    #[serde(default)]
    pub charset: Charset,

    /// What to do when a truncated window reveals no boundary character
    #[serde(default)]
    pub boundary_policy: BoundaryPolicy,

    /// Truncated prefixes of this length are recorded as failed
    #[serde(default = "default_max_prefix_len")]
    pub max_prefix_len: usize,

    /// Time in-flight queries get to finish after a stop request
    #[serde(default = "default_shutdown_grace", with = "humantime_serde")]
    pub shutdown_grace: Duration,

    /// Pacing policy
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            max_workers: DEFAULT_MAX_WORKERS,
            max_retries: DEFAULT_MAX_RETRIES,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            checkpoint_max_age: Some(DEFAULT_CHECKPOINT_MAX_AGE),
            charset: Charset::default(),
            boundary_policy: BoundaryPolicy::default(),
            max_prefix_len: DEFAULT_MAX_PREFIX_LEN,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

const fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

const fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

const fn default_checkpoint_interval() -> u64 {
    DEFAULT_CHECKPOINT_INTERVAL
}

#[allow(clippy::unnecessary_wraps)]
const fn default_checkpoint_max_age() -> Option<Duration> {
    Some(DEFAULT_CHECKPOINT_MAX_AGE)
}

const fn default_max_prefix_len() -> usize {
    DEFAULT_MAX_PREFIX_LEN
}

const fn default_shutdown_grace() -> Duration {
    DEFAULT_SHUTDOWN_GRACE
}

impl HarvestConfig {
    /// Check all settings before any query is sent.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(ErrorKind::InvalidConfig(
                "max_results must be at least 1".into(),
            ));
        }
        if self.max_workers == 0 {
            return Err(ErrorKind::InvalidConfig(
                "max_workers must be at least 1".into(),
            ));
        }
        if self.max_prefix_len == 0 {
            return Err(ErrorKind::InvalidConfig(
                "max_prefix_len must be at least 1".into(),
            ));
        }
        if self.checkpoint_max_age.is_some_and(|age| age.is_zero()) {
            return Err(ErrorKind::InvalidConfig(
                "checkpoint_max_age must be positive; omit it to disable".into(),
            ));
        }
        self.rate_limit.validate()
    }
}
