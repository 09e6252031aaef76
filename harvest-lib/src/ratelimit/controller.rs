use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use super::RateLimitConfig;
use crate::{Outcome, Prefix};

/// Smallest delay a backoff starts from, so that an unthrottled controller
/// still slows down when the endpoint pushes back
const MIN_BACKOFF_STEP: Duration = Duration::from_millis(50);

/// The adaptive part of the pacing policy, persisted in checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateState {
    /// Wait applied before the next query
    #[serde(with = "humantime_serde")]
    pub current_delay: Duration,
    /// Successful queries since the last failure
    pub consecutive_success: u64,
    /// Failed queries since the last success
    pub consecutive_failure: u64,
}

impl RateState {
    /// A fresh state starting at the configured base delay
    #[must_use]
    pub const fn new(config: &RateLimitConfig) -> Self {
        Self {
            current_delay: config.base_delay,
            consecutive_success: 0,
            consecutive_failure: 0,
        }
    }
}

/// Shared pacing for all workers talking to one endpoint.
///
/// The delay always stays within `[min_delay, max_delay]`. It grows
/// strictly on rate limiting (until it hits the ceiling) and shrinks
/// strictly on success (until it hits the floor).
#[derive(Debug)]
pub struct RateController {
    config: RateLimitConfig,
    state: Mutex<RateState>,
    rng: Mutex<SmallRng>,
}

impl RateController {
    /// Create a controller starting at the configured base delay
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_state(config, RateState::new(&config))
    }

    /// Create a controller continuing from a previously persisted state.
    ///
    /// The restored delay is clamped into the configured bounds, which may
    /// have changed since the state was saved.
    #[must_use]
    pub fn with_state(config: RateLimitConfig, state: RateState) -> Self {
        let rng = match config.jitter_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        let controller = Self {
            config,
            state: Mutex::new(state),
            rng: Mutex::new(rng),
        };
        {
            let mut state = controller.state.lock();
            state.current_delay = controller.clamp(state.current_delay);
        }
        controller
    }

    /// The pacing policy of this controller
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// A copy of the adaptive state
    #[must_use]
    pub fn state(&self) -> RateState {
        *self.state.lock()
    }

    /// The current base delay, before any length bias
    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.state.lock().current_delay
    }

    /// The wait that applies before querying `prefix`.
    ///
    /// Long prefixes tend to hit less popular parts of the vocabulary and
    /// are paced faster, but never below `min_delay`.
    #[must_use]
    pub fn delay_for(&self, prefix: &Prefix) -> Duration {
        let current = self.current_delay();
        if prefix.len() > self.config.length_bias_threshold {
            current
                .mul_f64(self.config.length_bias_factor)
                .max(self.config.min_delay)
        } else {
            current
        }
    }

    /// Wait until `prefix` may be queried. Returns the time waited.
    pub async fn before_query(&self, prefix: &Prefix) -> Duration {
        let delay = self.delay_for(prefix);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        delay
    }

    /// Adapt the delay to the outcome of a query
    pub fn after_query(&self, outcome: &Outcome) {
        let mut state = self.state.lock();
        let previous = state.current_delay;

        match outcome {
            Outcome::Results(_) => {
                state.current_delay = self.clamp(previous.mul_f64(self.config.recovery_factor));
                state.consecutive_success += 1;
                state.consecutive_failure = 0;
            }
            Outcome::RateLimited { retry_after } => {
                let grown = self.clamp(grow(previous, self.config.backoff_factor));
                let mut next = grown.saturating_add(grown.mul_f64(self.jitter_ratio()));
                if let Some(hint) = retry_after {
                    next = next.max(*hint);
                }
                state.current_delay = self.clamp(next);
                state.consecutive_failure += 1;
                state.consecutive_success = 0;
            }
            Outcome::Transient(_) => {
                state.current_delay =
                    self.clamp(grow(previous, self.config.transient_backoff_factor));
                state.consecutive_failure += 1;
                state.consecutive_success = 0;
            }
            Outcome::Malformed(_) => {}
        }

        if state.current_delay != previous {
            debug!(
                "Delay {:?} -> {:?} after {}",
                previous,
                state.current_delay,
                outcome.kind()
            );
        }
    }

    fn jitter_ratio(&self) -> f64 {
        if self.config.jitter_fraction <= 0.0 {
            return 0.0;
        }
        self.rng
            .lock()
            .random_range(0.0..=self.config.jitter_fraction)
    }

    fn clamp(&self, delay: Duration) -> Duration {
        delay.clamp(self.config.min_delay, self.config.max_delay)
    }
}

/// Saturates instead of overflowing for very large factors
fn grow(delay: Duration, factor: f64) -> Duration {
    let delay = delay.max(MIN_BACKOFF_STEP);
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}
