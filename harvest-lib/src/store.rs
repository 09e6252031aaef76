//! Concurrent sets tracking what has been queried and what has been found.

use std::collections::BTreeSet;

use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};

use crate::Prefix;

/// Prefixes that were dispatched at least once
#[derive(Debug, Default)]
pub struct VisitedSet(DashSet<Prefix>);

impl VisitedSet {
    /// Mark `prefix` as visited.
    ///
    /// Returns `true` if it was not visited before. The check and the
    /// insertion are a single atomic step, so of two workers racing for the
    /// same prefix exactly one wins.
    pub fn mark(&self, prefix: &Prefix) -> bool {
        self.0.insert(prefix.clone())
    }

    /// Returns `true` if `prefix` was dispatched before
    #[must_use]
    pub fn contains(&self, prefix: &Prefix) -> bool {
        self.0.contains(prefix)
    }

    /// Number of visited prefixes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing was visited yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A sorted copy of all visited prefixes
    #[must_use]
    pub fn snapshot(&self) -> BTreeSet<Prefix> {
        self.0.iter().map(|p| p.key().clone()).collect()
    }
}

impl FromIterator<Prefix> for VisitedSet {
    fn from_iter<I: IntoIterator<Item = Prefix>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The names found so far; this set only ever grows
#[derive(Debug, Default)]
pub struct DiscoveredNames(DashSet<String>);

impl DiscoveredNames {
    /// Record all `names`, returning how many were new
    pub fn record_all<'a, I: IntoIterator<Item = &'a String>>(&self, names: I) -> usize {
        names
            .into_iter()
            .filter(|name| !self.0.contains(name.as_str()) && self.0.insert((*name).clone()))
            .count()
    }

    /// Returns `true` if `name` was discovered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Number of distinct names
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing was discovered yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A sorted copy of all names
    #[must_use]
    pub fn snapshot(&self) -> BTreeSet<String> {
        self.0.iter().map(|n| n.key().clone()).collect()
    }
}

impl FromIterator<String> for DiscoveredNames {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A prefix that was given up on
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailedPrefix {
    /// The abandoned prefix
    pub prefix: Prefix,
    /// Why it was abandoned
    pub reason: String,
}

/// Prefixes that were abandoned, with the reason
#[derive(Debug, Default)]
pub struct FailedPrefixes(DashMap<Prefix, String>);

impl FailedPrefixes {
    /// Record `prefix` as failed. A later reason replaces an earlier one.
    pub fn record(&self, prefix: Prefix, reason: impl Into<String>) {
        self.0.insert(prefix, reason.into());
    }

    /// Number of failed prefixes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing failed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All failures, sorted by prefix
    #[must_use]
    pub fn snapshot(&self) -> Vec<FailedPrefix> {
        let mut failed: Vec<FailedPrefix> = self
            .0
            .iter()
            .map(|entry| FailedPrefix {
                prefix: entry.key().clone(),
                reason: entry.value().clone(),
            })
            .collect();
        failed.sort();
        failed
    }
}

impl FromIterator<FailedPrefix> for FailedPrefixes {
    fn from_iter<I: IntoIterator<Item = FailedPrefix>>(iter: I) -> Self {
        Self(iter.into_iter().map(|f| (f.prefix, f.reason)).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_concurrent_marking_has_single_winner() {
        let visited = Arc::new(VisitedSet::default());
        let winners: usize = (0..8)
            .map(|_| {
                let visited = Arc::clone(&visited);
                thread::spawn(move || usize::from(visited.mark(&Prefix::from("ab"))))
            })
            .map(|handle| handle.join().unwrap())
            .sum();
        assert_eq!(winners, 1);
        assert!(visited.contains(&Prefix::from("ab")));
    }

    #[test]
    fn test_record_all_counts_new_names() {
        let discovered = DiscoveredNames::default();
        let first = vec!["ant".to_owned(), "apple".to_owned()];
        let second = vec!["apple".to_owned(), "apply".to_owned()];
        assert_eq!(discovered.record_all(&first), 2);
        assert_eq!(discovered.record_all(&second), 1);
        assert_eq!(
            discovered.snapshot().into_iter().collect::<Vec<_>>(),
            vec!["ant", "apple", "apply"]
        );
    }

    #[test]
    fn test_failed_snapshot_is_sorted() {
        let failed = FailedPrefixes::default();
        failed.record(Prefix::from("zz"), "malformed");
        failed.record(Prefix::from("ab"), "retries exhausted");
        let snapshot = failed.snapshot();
        assert_eq!(snapshot[0].prefix, Prefix::from("ab"));
        assert_eq!(snapshot[1].reason, "malformed");

        let restored: FailedPrefixes = snapshot.clone().into_iter().collect();
        assert_eq!(restored.snapshot(), snapshot);
    }
}
