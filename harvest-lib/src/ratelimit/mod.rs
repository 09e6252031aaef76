//! Adaptive pacing of queries against a single endpoint.
//!
//! All workers share one [`RateController`], so the delay reflects the
//! endpoint's global tolerance rather than the experience of one worker.
//!
//! # Architecture
//!
//! - [`RateLimitConfig`]: Bounds and factors of the pacing policy
//! - [`RateController`]: Computes the wait before each query and adapts it
//!   to every observed [`Outcome`](crate::Outcome)
//! - [`RateState`]: The persisted part of the controller

mod config;
mod controller;
mod headers;

pub use config::RateLimitConfig;
pub use controller::{RateController, RateState};
pub(crate) use headers::parse_retry_after;
