//! Counters describing the progress and efficiency of a harvest.
//!
//! Everything here is observational: no decision of the exploration
//! depends on these numbers.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{Outcome, Prefix};

/// Counters for all prefixes of one length
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthStats {
    /// Queries answered with results
    pub queries: u64,
    /// Of those, windows at the cap
    pub truncated: u64,
    /// Of those, windows with at least one name
    pub non_empty: u64,
    /// New names discovered at this length
    pub discoveries: u64,
}

/// A point-in-time copy of all statistics, persisted in checkpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSnapshot {
    /// Queries sent, including retries
    pub total_queries: u64,
    /// Queries answered with a valid window
    pub results: u64,
    /// Queries answered with a rate-limit response
    pub rate_limited: u64,
    /// Queries that failed transiently
    pub transient: u64,
    /// Queries answered with something uninterpretable
    pub malformed: u64,
    /// Prefixes put back into the frontier for another attempt
    pub retries: u64,
    /// Prefixes given up on
    pub failed: u64,
    /// Distinct names discovered
    pub discovered: u64,
    /// Frontier entries at the time of the snapshot
    pub frontier_size: u64,
    /// Counters per prefix length
    pub by_length: BTreeMap<usize, LengthStats>,
    /// Characters seen in names that are not part of the charset
    pub unknown_chars: BTreeSet<char>,
}

impl StatsSnapshot {
    /// Distinct names discovered per query sent
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn names_per_query(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.discovered as f64 / self.total_queries as f64
        }
    }

    /// Share of queries that were rate limited, in percent
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate_limited_percent(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.rate_limited as f64 * 100.0 / self.total_queries as f64
        }
    }
}

/// Thread-safe collector updated by all workers
#[derive(Debug, Default)]
pub struct StatsCollector {
    total_queries: AtomicU64,
    results: AtomicU64,
    rate_limited: AtomicU64,
    transient: AtomicU64,
    malformed: AtomicU64,
    retries: AtomicU64,
    failed: AtomicU64,
    discovered: AtomicU64,
    by_length: Mutex<BTreeMap<usize, LengthStats>>,
    unknown_chars: Mutex<BTreeSet<char>>,
}

impl StatsCollector {
    /// A collector continuing from persisted counters
    #[must_use]
    pub fn from_snapshot(snapshot: &StatsSnapshot) -> Self {
        Self {
            total_queries: AtomicU64::new(snapshot.total_queries),
            results: AtomicU64::new(snapshot.results),
            rate_limited: AtomicU64::new(snapshot.rate_limited),
            transient: AtomicU64::new(snapshot.transient),
            malformed: AtomicU64::new(snapshot.malformed),
            retries: AtomicU64::new(snapshot.retries),
            failed: AtomicU64::new(snapshot.failed),
            discovered: AtomicU64::new(snapshot.discovered),
            by_length: Mutex::new(snapshot.by_length.clone()),
            unknown_chars: Mutex::new(snapshot.unknown_chars.clone()),
        }
    }

    /// Count one query and its outcome
    pub fn record_outcome(&self, prefix: &Prefix, outcome: &Outcome) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Results(result) => {
                let mut by_length = self.by_length.lock();
                let stats = by_length.entry(prefix.len()).or_default();
                stats.queries += 1;
                stats.truncated += u64::from(result.is_truncated());
                stats.non_empty += u64::from(!result.is_empty());
                &self.results
            }
            Outcome::RateLimited { .. } => &self.rate_limited,
            Outcome::Transient(_) => &self.transient,
            Outcome::Malformed(_) => &self.malformed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count names discovered by a query for `prefix`
    pub fn record_discoveries(&self, prefix: &Prefix, new_names: usize) {
        if new_names == 0 {
            return;
        }
        let new_names = new_names as u64;
        self.discovered.fetch_add(new_names, Ordering::Relaxed);
        self.by_length
            .lock()
            .entry(prefix.len())
            .or_default()
            .discoveries += new_names;
    }

    /// Count a prefix that was put back for another attempt
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a prefix that was given up on
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Remember a character found outside the charset.
    /// Returns `true` the first time a character is seen.
    pub fn observe_unknown_char(&self, c: char) -> bool {
        self.unknown_chars.lock().insert(c)
    }

    /// Queries sent so far
    #[must_use]
    pub fn total_queries(&self) -> u64 {
        self.total_queries.load(Ordering::Relaxed)
    }

    /// Copy all counters
    #[must_use]
    pub fn snapshot(&self, frontier_size: usize) -> StatsSnapshot {
        StatsSnapshot {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            results: self.results.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            transient: self.transient.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discovered: self.discovered.load(Ordering::Relaxed),
            frontier_size: frontier_size as u64,
            by_length: self.by_length.lock().clone(),
            unknown_chars: self.unknown_chars.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::QueryResult;

    fn results(names: &[&str], cap: usize) -> Outcome {
        Outcome::Results(QueryResult::new(
            names.iter().map(|&n| n.to_owned()).collect(),
            cap,
        ))
    }

    #[test]
    fn test_counts_per_outcome_and_length() {
        let stats = StatsCollector::default();
        stats.record_outcome(&Prefix::root(), &results(&["ant", "apple"], 2));
        stats.record_outcome(&Prefix::from("a"), &results(&[], 2));
        stats.record_outcome(&Prefix::from("b"), &Outcome::RateLimited { retry_after: None });
        stats.record_discoveries(&Prefix::root(), 2);
        stats.record_retry();

        let snapshot = stats.snapshot(3);
        assert_eq!(snapshot.total_queries, 3);
        assert_eq!(snapshot.results, 2);
        assert_eq!(snapshot.rate_limited, 1);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.frontier_size, 3);
        assert_eq!(
            snapshot.by_length[&0],
            LengthStats {
                queries: 1,
                truncated: 1,
                non_empty: 1,
                discoveries: 2
            }
        );
        assert_eq!(snapshot.by_length[&1].queries, 1);
        assert_eq!(snapshot.by_length[&1].non_empty, 0);
    }

    #[test]
    fn test_ratios() {
        let snapshot = StatsSnapshot {
            total_queries: 8,
            rate_limited: 2,
            discovered: 4,
            ..StatsSnapshot::default()
        };
        assert!((snapshot.names_per_query() - 0.5).abs() < f64::EPSILON);
        assert!((snapshot.rate_limited_percent() - 25.0).abs() < f64::EPSILON);
        assert!(StatsSnapshot::default().names_per_query().abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_survives_json_and_restore() {
        let stats = StatsCollector::default();
        stats.record_outcome(&Prefix::from("ab"), &results(&["abc"], 5));
        stats.record_discoveries(&Prefix::from("ab"), 1);
        assert!(stats.observe_unknown_char('-'));
        assert!(!stats.observe_unknown_char('-'));

        let snapshot = stats.snapshot(0);
        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: StatsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, snapshot);

        let restored = StatsCollector::from_snapshot(&decoded);
        assert_eq!(restored.snapshot(0), snapshot);
        assert_eq!(restored.total_queries(), 1);
    }
}
