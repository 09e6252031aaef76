use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    ops::Bound,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    CheckpointRecord, CheckpointStore, HarvestConfig, Outcome, Prefix, QueryClient, QueryResult,
    RateLimitConfig, Result,
};

/// A configuration that never sleeps, with the given cap
pub(crate) fn fast_config(max_results: usize) -> HarvestConfig {
    HarvestConfig {
        max_results,
        max_workers: 1,
        max_retries: 3,
        checkpoint_interval: 0,
        checkpoint_max_age: None,
        charset: "abcdefghijklmnopqrstuvwxyz".parse().unwrap(),
        shutdown_grace: Duration::from_secs(5),
        rate_limit: RateLimitConfig {
            jitter_seed: Some(7),
            ..RateLimitConfig::unthrottled()
        },
        ..HarvestConfig::default()
    }
}

/// An in-memory endpoint over a fixed vocabulary.
///
/// Answers with the lexicographically first names matching the prefix,
/// exactly like a well-behaved autocomplete endpoint. Individual prefixes
/// can be scripted to fail first.
#[derive(Debug, Default)]
pub(crate) struct MockClient {
    vocabulary: BTreeSet<String>,
    scripted: Mutex<HashMap<Prefix, VecDeque<Outcome>>>,
    dispatched: Mutex<Vec<Prefix>>,
    cancel_after: Option<(usize, CancellationToken)>,
    delay: Option<Duration>,
}

impl MockClient {
    pub(crate) fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vocabulary: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Answer `prefix` with `outcomes` first, one per dispatch
    pub(crate) fn script<I: IntoIterator<Item = Outcome>>(self, prefix: &str, outcomes: I) -> Self {
        self.scripted
            .lock()
            .entry(Prefix::from(prefix))
            .or_default()
            .extend(outcomes);
        self
    }

    /// Cancel `token` once the `n`th query was dispatched
    pub(crate) fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    /// Take this long for every answer
    pub(crate) const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every prefix queried, in dispatch order
    pub(crate) fn dispatched(&self) -> Vec<Prefix> {
        self.dispatched.lock().clone()
    }

    /// The full vocabulary
    pub(crate) fn vocabulary(&self) -> BTreeSet<String> {
        self.vocabulary.clone()
    }

    fn answer(&self, prefix: &Prefix, max_results: usize) -> QueryResult {
        let names = self
            .vocabulary
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(|name| prefix.is_prefix_of(name))
            .take(max_results)
            .cloned()
            .collect();
        QueryResult::new(names, max_results)
    }
}

#[async_trait]
impl QueryClient for MockClient {
    async fn query(&self, prefix: &Prefix, max_results: usize) -> Outcome {
        let count = {
            let mut dispatched = self.dispatched.lock();
            dispatched.push(prefix.clone());
            dispatched.len()
        };
        if let Some((n, token)) = &self.cancel_after
            && count >= *n
        {
            token.cancel();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripted
            .lock()
            .get_mut(prefix)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Outcome::Results(self.answer(prefix, max_results)))
    }
}

/// A checkpoint store keeping the latest record in memory
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    record: Mutex<Option<CheckpointRecord>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub(crate) fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub(crate) fn latest(&self) -> Option<CheckpointRecord> {
        self.record.lock().clone()
    }
}

impl CheckpointStore for MemoryStore {
    fn load(&self) -> Result<Option<CheckpointRecord>> {
        Ok(self.latest())
    }

    fn save(&self, record: &CheckpointRecord) -> Result<()> {
        *self.record.lock() = Some(record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_answers_like_an_endpoint() {
        let client = MockClient::new(["ant", "apple", "application", "apply", "banana"]);
        let Outcome::Results(result) = client.query(&Prefix::from("ap"), 2).await else {
            panic!("expected results");
        };
        assert_eq!(result.names(), ["apple", "application"]);
        assert!(result.is_truncated());

        let Outcome::Results(result) = client.query(&Prefix::from("b"), 2).await else {
            panic!("expected results");
        };
        assert_eq!(result.names(), ["banana"]);
        assert!(!result.is_truncated());
        assert_eq!(client.dispatched().len(), 2);
    }
}
