use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{ErrorKind, Result};

/// Default delay before the first query
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default floor for the adaptive delay
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(800);

/// Default ceiling for the adaptive delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(3000);

/// No configured delay may exceed this
pub const LONGEST_DELAY: Duration = Duration::from_secs(3600);

/// Default growth factor after a rate-limit response
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;

/// Default growth factor after a transient failure
pub const DEFAULT_TRANSIENT_BACKOFF_FACTOR: f64 = 1.2;

/// Default shrink factor after a successful query
pub const DEFAULT_RECOVERY_FACTOR: f64 = 0.9;

/// Default upper bound of the random jitter, relative to the backed-off delay
pub const DEFAULT_JITTER_FRACTION: f64 = 0.3;

/// Prefixes longer than this many characters are paced faster by default
pub const DEFAULT_LENGTH_BIAS_THRESHOLD: usize = 3;

/// Default multiplier applied to the delay of long prefixes
pub const DEFAULT_LENGTH_BIAS_FACTOR: f64 = 0.8;

/// Pacing policy shared by all workers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Delay before the first query
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    /// The delay never drops below this value
    #[serde(default = "default_min_delay", with = "humantime_serde")]
    pub min_delay: Duration,

    /// The delay never grows beyond this value
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Growth factor after a rate-limit response, must be greater than 1
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Growth factor after a transient failure, must be at least 1
    #[serde(default = "default_transient_backoff_factor")]
    pub transient_backoff_factor: f64,

    /// Shrink factor after a successful query, must lie in (0, 1)
    #[serde(default = "default_recovery_factor")]
    pub recovery_factor: f64,

    /// Upper bound of the random jitter added on rate limiting, in [0, 1]
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,

    /// Prefixes longer than this are paced with `length_bias_factor`
    #[serde(default = "default_length_bias_threshold")]
    pub length_bias_threshold: usize,

    /// Multiplier for the delay of long prefixes, in (0, 1]
    #[serde(default = "default_length_bias_factor")]
    pub length_bias_factor: f64,

    /// Seed for the jitter generator, for reproducible runs
    #[serde(default)]
    pub jitter_seed: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            transient_backoff_factor: DEFAULT_TRANSIENT_BACKOFF_FACTOR,
            recovery_factor: DEFAULT_RECOVERY_FACTOR,
            jitter_fraction: DEFAULT_JITTER_FRACTION,
            length_bias_threshold: DEFAULT_LENGTH_BIAS_THRESHOLD,
            length_bias_factor: DEFAULT_LENGTH_BIAS_FACTOR,
            jitter_seed: None,
        }
    }
}

const fn default_base_delay() -> Duration {
    DEFAULT_BASE_DELAY
}

const fn default_min_delay() -> Duration {
    DEFAULT_MIN_DELAY
}

const fn default_max_delay() -> Duration {
    DEFAULT_MAX_DELAY
}

const fn default_backoff_factor() -> f64 {
    DEFAULT_BACKOFF_FACTOR
}

const fn default_transient_backoff_factor() -> f64 {
    DEFAULT_TRANSIENT_BACKOFF_FACTOR
}

const fn default_recovery_factor() -> f64 {
    DEFAULT_RECOVERY_FACTOR
}

const fn default_jitter_fraction() -> f64 {
    DEFAULT_JITTER_FRACTION
}

const fn default_length_bias_threshold() -> usize {
    DEFAULT_LENGTH_BIAS_THRESHOLD
}

const fn default_length_bias_factor() -> f64 {
    DEFAULT_LENGTH_BIAS_FACTOR
}

impl RateLimitConfig {
    /// A policy that never waits, mostly useful for tests and local endpoints
    #[must_use]
    pub fn unthrottled() -> Self {
        Self {
            base_delay: Duration::ZERO,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Check that bounds and factors are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.min_delay > self.max_delay {
            return Err(invalid("min_delay must not exceed max_delay"));
        }
        if self.max_delay > LONGEST_DELAY {
            return Err(invalid("max_delay must not exceed one hour"));
        }
        if self.base_delay < self.min_delay || self.base_delay > self.max_delay {
            return Err(invalid("base_delay must lie between min_delay and max_delay"));
        }
        if !(self.backoff_factor.is_finite() && self.backoff_factor > 1.0) {
            return Err(invalid("backoff_factor must be greater than 1"));
        }
        if !(self.transient_backoff_factor.is_finite() && self.transient_backoff_factor >= 1.0) {
            return Err(invalid("transient_backoff_factor must be at least 1"));
        }
        if !(self.recovery_factor > 0.0 && self.recovery_factor < 1.0) {
            return Err(invalid("recovery_factor must lie strictly between 0 and 1"));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(invalid("jitter_fraction must lie between 0 and 1"));
        }
        if !(self.length_bias_factor > 0.0 && self.length_bias_factor <= 1.0) {
            return Err(invalid("length_bias_factor must lie in (0, 1]"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ErrorKind {
    ErrorKind::InvalidConfig(reason.to_owned())
}
