//! The priority queue of prefixes waiting to be queried.
//!
//! Shorter prefixes are served first, ties are broken lexicographically,
//! which makes single-worker runs fully deterministic.
//!
//! The frontier also tracks the entries currently handed out to workers.
//! Both the queue and the lease table live behind the same lock, so
//! "nothing queued and nothing in flight" is observed atomically and
//! workers can never race each other into a premature exit.

use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, HashMap, HashSet},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, futures::Notified};

use crate::Prefix;

/// A prefix waiting to be queried
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    /// The prefix to query
    pub prefix: Prefix,
    /// Lower is served first; equals the prefix length
    pub priority: usize,
    /// How often this prefix was dispatched before without a usable answer
    #[serde(default)]
    pub attempts: u32,
}

impl FrontierEntry {
    /// A first-time entry for `prefix`
    #[must_use]
    pub fn new(prefix: Prefix) -> Self {
        let priority = prefix.len();
        Self {
            prefix,
            priority,
            attempts: 0,
        }
    }

    /// Returns `true` if the prefix was dispatched before
    #[must_use]
    pub const fn is_retry(&self) -> bool {
        self.attempts > 0
    }

    /// The same entry, marked as dispatched once more
    #[must_use]
    pub fn retry(mut self) -> Self {
        self.attempts = self.attempts.saturating_add(1);
        self
    }
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.prefix.cmp(&other.prefix))
            .then_with(|| self.attempts.cmp(&other.attempts))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result of asking the frontier for work
#[derive(Debug, PartialEq, Eq)]
pub enum Pop {
    /// An entry, now leased to the caller
    Entry(FrontierEntry),
    /// Nothing queued right now, but in-flight entries may add children
    Pending,
    /// Nothing queued and nothing in flight: exploration is finished
    Exhausted,
}

#[derive(Debug, Default)]
struct Inner {
    heap: BinaryHeap<Reverse<FrontierEntry>>,
    queued: HashSet<Prefix>,
    leased: HashMap<Prefix, FrontierEntry>,
}

impl Inner {
    fn push(&mut self, entry: FrontierEntry) -> bool {
        if self.queued.insert(entry.prefix.clone()) {
            self.heap.push(Reverse(entry));
            true
        } else {
            false
        }
    }
}

/// Priority queue of pending prefixes plus the table of leased ones
#[derive(Debug, Default)]
pub struct Frontier {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Frontier {
    /// An empty frontier
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A frontier pre-filled with `entries`
    #[must_use]
    pub fn from_entries<I: IntoIterator<Item = FrontierEntry>>(entries: I) -> Self {
        let frontier = Self::new();
        frontier.extend(entries);
        frontier
    }

    /// Queue a single entry. Returns `false` if the prefix is already queued.
    pub fn push(&self, entry: FrontierEntry) -> bool {
        let pushed = self.inner.lock().push(entry);
        if pushed {
            self.notify.notify_waiters();
        }
        pushed
    }

    /// Queue many entries at once
    pub fn extend<I: IntoIterator<Item = FrontierEntry>>(&self, entries: I) {
        {
            let mut inner = self.inner.lock();
            for entry in entries {
                inner.push(entry);
            }
        }
        self.notify.notify_waiters();
    }

    /// Take the highest-priority entry and lease it to the caller.
    ///
    /// Every [`Pop::Entry`] must eventually be handed back through
    /// [`Frontier::complete`] or [`Frontier::release`].
    pub fn pop(&self) -> Pop {
        let mut inner = self.inner.lock();
        match inner.heap.pop() {
            Some(Reverse(entry)) => {
                inner.queued.remove(&entry.prefix);
                inner.leased.insert(entry.prefix.clone(), entry.clone());
                Pop::Entry(entry)
            }
            None if inner.leased.is_empty() => Pop::Exhausted,
            None => Pop::Pending,
        }
    }

    /// Finish a leased prefix and queue its children in the same step
    pub fn complete<I: IntoIterator<Item = FrontierEntry>>(&self, prefix: &Prefix, children: I) {
        {
            let mut inner = self.inner.lock();
            inner.leased.remove(prefix);
            for child in children {
                inner.push(child);
            }
        }
        self.notify.notify_waiters();
    }

    /// Hand a leased entry back to the queue, typically with a bumped
    /// attempt counter
    pub fn release(&self, entry: FrontierEntry) {
        {
            let mut inner = self.inner.lock();
            inner.leased.remove(&entry.prefix);
            inner.push(entry);
        }
        self.notify.notify_waiters();
    }

    /// A future resolving on the next change to the frontier.
    ///
    /// Create (and enable) it *before* calling [`Frontier::pop`] so no
    /// wake-up between the two calls is lost.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Number of queued entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    /// Returns `true` if nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    /// Number of leased entries
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.lock().leased.len()
    }

    /// Returns `true` if nothing is queued and nothing is in flight
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        let inner = self.inner.lock();
        inner.heap.is_empty() && inner.leased.is_empty()
    }

    /// All entries in serving order, for checkpoints.
    ///
    /// Entries still leased (for example by a worker that was aborted) are
    /// included with a bumped attempt counter so they are queried again
    /// after a restart even though they are already marked visited.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FrontierEntry> {
        let inner = self.inner.lock();
        let mut entries: Vec<FrontierEntry> = inner
            .heap
            .iter()
            .map(|Reverse(entry)| entry.clone())
            .chain(inner.leased.values().cloned().map(FrontierEntry::retry))
            .collect();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use pretty_assertions::assert_eq;

    use super::*;

    fn entry(prefix: &str) -> FrontierEntry {
        FrontierEntry::new(Prefix::from(prefix))
    }

    fn popped(frontier: &Frontier) -> String {
        match frontier.pop() {
            Pop::Entry(entry) => entry.prefix.as_str().to_owned(),
            other => panic!("expected an entry, got {other:?}"),
        }
    }

    #[test]
    fn test_shorter_prefixes_first_then_lexicographic() {
        let frontier = Frontier::from_entries(["ba", "c", "ab", "a", "b"].map(entry));
        let order: Vec<String> = (0..5).map(|_| popped(&frontier)).collect();
        assert_eq!(order, vec!["a", "b", "c", "ab", "ba"]);
    }

    #[test]
    fn test_duplicate_prefixes_are_queued_once() {
        let frontier = Frontier::new();
        assert!(frontier.push(entry("a")));
        assert!(!frontier.push(entry("a")));
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn test_pending_while_in_flight_then_exhausted() {
        let frontier = Frontier::from_entries([entry("")]);
        let root = match frontier.pop() {
            Pop::Entry(root) => root,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(frontier.pop(), Pop::Pending);
        assert_eq!(frontier.in_flight(), 1);
        assert!(!frontier.is_exhausted());

        frontier.complete(&root.prefix, [entry("a")]);
        assert_eq!(popped(&frontier), "a");
        frontier.complete(&Prefix::from("a"), []);
        assert_eq!(frontier.pop(), Pop::Exhausted);
        assert!(frontier.is_exhausted());
    }

    #[test]
    fn test_release_requeues_with_attempts() {
        let frontier = Frontier::from_entries([entry("x")]);
        let Pop::Entry(first) = frontier.pop() else {
            panic!("expected an entry");
        };
        frontier.release(first.retry());
        let Pop::Entry(second) = frontier.pop() else {
            panic!("expected an entry");
        };
        assert_eq!(second.attempts, 1);
        assert!(second.is_retry());
    }

    #[test]
    fn test_snapshot_includes_leased_entries_as_retries() {
        let frontier = Frontier::from_entries(["a", "b"].map(entry));
        assert_eq!(popped(&frontier), "a");

        let snapshot = frontier.snapshot();
        assert_eq!(
            snapshot,
            vec![
                FrontierEntry {
                    prefix: Prefix::from("a"),
                    priority: 1,
                    attempts: 1
                },
                entry("b"),
            ]
        );
    }

    #[tokio::test]
    async fn test_notified_wakes_idle_worker() {
        let frontier = Arc::new(Frontier::new());
        let waiter = Arc::clone(&frontier);
        let handle = tokio::spawn(async move {
            let notified = waiter.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let first = waiter.pop();
            if first != Pop::Exhausted {
                return first;
            }
            notified.await;
            waiter.pop()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        frontier.push(entry("z"));

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Pop::Entry(entry("z")));
    }
}
