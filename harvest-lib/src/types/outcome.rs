use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The names returned for one query, together with the truncation flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    names: Vec<String>,
    truncated: bool,
}

impl QueryResult {
    /// Wrap the names returned for a request capped at `max_results`.
    ///
    /// The window counts as truncated when it is at the cap. An endpoint
    /// returning more than it was asked for is treated as truncated too.
    #[must_use]
    pub fn new(names: Vec<String>, max_results: usize) -> Self {
        let truncated = max_results > 0 && names.len() >= max_results;
        Self { names, truncated }
    }

    /// All names in the window, in the order the endpoint returned them
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether more names than the cap may exist for this prefix
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Number of names in the window
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if the endpoint had nothing for this prefix
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// The classified outcome of a single query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The endpoint answered with a valid window of names
    Results(QueryResult),
    /// The endpoint asked us to slow down, optionally saying for how long
    RateLimited {
        /// Delay requested via the `Retry-After` header
        retry_after: Option<Duration>,
    },
    /// A network error, timeout or server error that may go away on retry
    Transient(String),
    /// The response cannot be interpreted and retrying will not help
    Malformed(String),
}

impl Outcome {
    /// The kind of this outcome, without payload
    #[must_use]
    pub const fn kind(&self) -> OutcomeKind {
        match self {
            Self::Results(_) => OutcomeKind::Results,
            Self::RateLimited { .. } => OutcomeKind::RateLimited,
            Self::Transient(_) => OutcomeKind::Transient,
            Self::Malformed(_) => OutcomeKind::Malformed,
        }
    }

    /// Returns `true` if the same prefix should be queried again
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }

    /// Human-readable reason for a failed query, `None` for results
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Results(_) => None,
            Self::RateLimited {
                retry_after: Some(after),
            } => Some(format!(
                "rate limited (retry after {})",
                humantime::format_duration(*after)
            )),
            Self::RateLimited { retry_after: None } => Some("rate limited".into()),
            Self::Transient(reason) | Self::Malformed(reason) => Some(reason.clone()),
        }
    }
}

/// Outcome categories, used for statistics and logging
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutcomeKind {
    /// See [`Outcome::Results`]
    Results,
    /// See [`Outcome::RateLimited`]
    RateLimited,
    /// See [`Outcome::Transient`]
    Transient,
    /// See [`Outcome::Malformed`]
    Malformed,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("name{i}")).collect()
    }

    #[rstest]
    #[case(0, 3, false)]
    #[case(2, 3, false)]
    #[case(3, 3, true)]
    #[case(5, 3, true)]
    fn test_truncation(#[case] returned: usize, #[case] cap: usize, #[case] truncated: bool) {
        assert_eq!(QueryResult::new(names(returned), cap).is_truncated(), truncated);
    }

    #[test]
    fn test_retryable_outcomes() {
        assert!(Outcome::RateLimited { retry_after: None }.is_retryable());
        assert!(Outcome::Transient("timeout".into()).is_retryable());
        assert!(!Outcome::Malformed("not json".into()).is_retryable());
        assert!(!Outcome::Results(QueryResult::new(vec![], 10)).is_retryable());
    }

    #[test]
    fn test_reason() {
        let limited = Outcome::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(limited.reason().unwrap(), "rate limited (retry after 3s)");
        assert_eq!(limited.kind().to_string(), "rate_limited");
        assert!(Outcome::Results(QueryResult::new(vec![], 1)).reason().is_none());
    }
}
