//! The worker pool driving the exploration.
//!
//! Every worker repeats the same step: lease the best frontier entry, wait
//! for the rate controller, query the prefix, record the names and enqueue
//! the children. A separate task writes checkpoints between steps.
//!
//! The run ends when the frontier is exhausted, or when it is cancelled.
//! After cancellation no new prefix is dispatched; in-flight queries get
//! [`HarvestConfig::shutdown_grace`] to finish before they are abandoned
//! and put back into the final checkpoint.

use std::{
    collections::BTreeSet,
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::{sync::Notify, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    CheckpointManager, CheckpointRecord, ErrorKind, FailedPrefix, FrontierEntry, HarvestConfig,
    Outcome, Pop, QueryClient, QueryResult, RateState, Result, StatsSnapshot, context::Context,
    expand::{boundary_char, expand},
};

/// How long an idle worker sleeps before looking at the frontier again
/// when no change notification arrives
const IDLE_POLL: Duration = Duration::from_millis(50);

/// How often the checkpoint task wakes up when no age limit is configured
const CHECKPOINT_TICK: Duration = Duration::from_secs(60);

/// How a harvest ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Completion {
    /// The frontier was exhausted: every reachable name was discovered
    Complete,
    /// The run was stopped early and can be resumed from its checkpoint
    Interrupted,
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    /// Whether the exploration finished
    pub completion: Completion,
    /// All names found, including those restored from a checkpoint
    pub discovered: BTreeSet<String>,
    /// Prefixes that were given up on
    pub failed: Vec<FailedPrefix>,
    /// Final counters
    pub stats: StatsSnapshot,
    /// Final pacing state
    pub rate_state: RateState,
    /// Version of the final checkpoint, if one was written
    pub checkpoint_version: Option<u64>,
    /// Wall-clock duration of this run
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

/// A read-only view on a running harvest, for progress reporting
#[derive(Debug, Clone)]
pub struct Monitor(Arc<Context>);

impl Monitor {
    /// Current counters
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.0.stats.snapshot(self.0.frontier.len())
    }

    /// Number of names discovered so far
    #[must_use]
    pub fn discovered(&self) -> usize {
        self.0.discovered.len()
    }

    /// Number of queued prefixes
    #[must_use]
    pub fn queued(&self) -> usize {
        self.0.frontier.len()
    }

    /// Number of prefixes currently being queried
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.0.frontier.in_flight()
    }

    /// The current base delay between queries
    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.0.rate.current_delay()
    }
}

/// Drives a pool of workers over a shared frontier
#[derive(Debug)]
pub struct Harvester {
    client: Arc<dyn QueryClient>,
    context: Arc<Context>,
    checkpoints: Option<Arc<CheckpointManager>>,
    cancel: CancellationToken,
}

impl Harvester {
    /// A fresh harvest starting from the empty prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(client: Arc<dyn QueryClient>, config: HarvestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_context(client, Context::cold(config)))
    }

    /// A harvest continuing exactly where `record` was taken.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn resume(
        client: Arc<dyn QueryClient>,
        config: HarvestConfig,
        record: CheckpointRecord,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "Resuming from checkpoint {} ({} names, {} queued prefixes)",
            record.version,
            record.discovered.len(),
            record.frontier.len()
        );
        Ok(Self::from_context(client, Context::restore(config, record)))
    }

    fn from_context(client: Arc<dyn QueryClient>, context: Context) -> Self {
        Self {
            client,
            context: Arc::new(context),
            checkpoints: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Write checkpoints through `manager` while running and when done
    #[must_use]
    pub fn with_checkpoints(mut self, manager: CheckpointManager) -> Self {
        self.checkpoints = Some(Arc::new(manager));
        self
    }

    /// A token that stops the run when cancelled
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// A handle for observing progress while [`Harvester::run`] executes
    #[must_use]
    pub fn monitor(&self) -> Monitor {
        Monitor(Arc::clone(&self.context))
    }

    /// Run until the frontier is exhausted or the run is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker panics, or if the run was interrupted
    /// and its final checkpoint could not be written.
    pub async fn run(self) -> Result<HarvestReport> {
        let started = Instant::now();
        let config = &self.context.config;
        info!(
            "Harvesting with {} workers, {} results per query, {} queued prefixes",
            config.max_workers,
            config.max_results,
            self.context.frontier.len()
        );

        let checkpointer = self
            .checkpoints
            .as_ref()
            .map(|manager| Checkpointer::spawn(Arc::clone(&self.context), Arc::clone(manager)));

        let mut workers = JoinSet::new();
        for id in 0..config.max_workers {
            let worker = Worker {
                id,
                client: Arc::clone(&self.client),
                context: Arc::clone(&self.context),
                cancel: self.cancel.clone(),
                checkpoint_trigger: checkpointer.as_ref().map(|c| Arc::clone(&c.trigger)),
            };
            workers.spawn(worker.run());
        }

        let supervised = self.supervise(&mut workers).await;
        if let Some(checkpointer) = checkpointer {
            checkpointer.stop().await;
        }
        supervised?;

        let completion = if self.context.frontier.is_exhausted() {
            Completion::Complete
        } else {
            Completion::Interrupted
        };

        let checkpoint_version = match &self.checkpoints {
            Some(manager) => self.final_checkpoint(manager, completion).await?,
            None => None,
        };

        let report = HarvestReport {
            completion,
            discovered: self.context.discovered.snapshot(),
            failed: self.context.failed.snapshot(),
            stats: self
                .context
                .stats
                .snapshot(self.context.frontier.len() + self.context.frontier.in_flight()),
            rate_state: self.context.rate.state(),
            checkpoint_version,
            elapsed: started.elapsed(),
        };
        info!(
            "Harvest {}: {} names from {} queries in {}",
            report.completion,
            report.discovered.len(),
            report.stats.total_queries,
            humantime::format_duration(Duration::from_secs(report.elapsed.as_secs()))
        );
        Ok(report)
    }

    /// Wait for all workers, enforcing the shutdown grace period once
    /// the run is cancelled
    async fn supervise(&self, workers: &mut JoinSet<()>) -> Result<()> {
        let grace = self.context.config.shutdown_grace;
        let deadline = tokio::time::sleep(Duration::MAX);
        tokio::pin!(deadline);
        let mut stopping = false;

        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    None => return Ok(()),
                    Some(Ok(())) => {}
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => {
                        error!("Worker failed: {e}");
                        self.cancel.cancel();
                        workers.abort_all();
                        while workers.join_next().await.is_some() {}
                        return Err(ErrorKind::WorkerPanicked(e.to_string()));
                    }
                },
                () = self.cancel.cancelled(), if !stopping => {
                    stopping = true;
                    info!(
                        "Stopping: waiting up to {} for {} in-flight queries",
                        humantime::format_duration(grace),
                        self.context.frontier.in_flight()
                    );
                    deadline.as_mut().reset(tokio::time::Instant::now() + grace);
                }
                () = &mut deadline, if stopping => {
                    warn!(
                        "Abandoning {} in-flight queries; they will be retried on resume",
                        self.context.frontier.in_flight()
                    );
                    workers.abort_all();
                    while workers.join_next().await.is_some() {}
                    return Ok(());
                }
            }
        }
    }

    /// Write the last checkpoint of this run.
    ///
    /// A failure is fatal for interrupted runs, since they would not be
    /// resumable. Completed runs only log it.
    async fn final_checkpoint(
        &self,
        manager: &Arc<CheckpointManager>,
        completion: Completion,
    ) -> Result<Option<u64>> {
        let record = manager.snapshot(&self.context).await;
        let version = record.version;
        match persist(Arc::clone(manager), record).await {
            Ok(()) => Ok(Some(version)),
            Err(e) if completion == Completion::Complete => {
                error!("Failed to write final checkpoint: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// The periodic checkpoint task and the handles to drive it
struct Checkpointer {
    trigger: Arc<Notify>,
    stop: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl Checkpointer {
    fn spawn(context: Arc<Context>, manager: Arc<CheckpointManager>) -> Self {
        let trigger = Arc::new(Notify::new());
        let stop = CancellationToken::new();
        let handle = tokio::spawn(checkpoint_loop(
            context,
            manager,
            Arc::clone(&trigger),
            stop.clone(),
        ));
        Self {
            trigger,
            stop,
            handle,
        }
    }

    async fn stop(self) {
        self.stop.cancel();
        if let Err(e) = self.handle.await {
            warn!("Checkpoint task ended abnormally: {e}");
        }
    }
}

async fn checkpoint_loop(
    context: Arc<Context>,
    manager: Arc<CheckpointManager>,
    trigger: Arc<Notify>,
    stop: CancellationToken,
) {
    let tick = manager.max_age().unwrap_or(CHECKPOINT_TICK);
    loop {
        tokio::select! {
            () = trigger.notified() => {}
            () = tokio::time::sleep(tick) => {}
            () = stop.cancelled() => break,
        }
        if manager.is_due(context.stats.total_queries()) {
            let record = manager.snapshot(&context).await;
            if let Err(e) = persist(Arc::clone(&manager), record).await {
                error!("Failed to write checkpoint: {e}. Continuing with in-memory state");
            }
        }
    }
}

/// Serialize and write off the async runtime
async fn persist(manager: Arc<CheckpointManager>, record: CheckpointRecord) -> Result<()> {
    tokio::task::spawn_blocking(move || manager.persist(&record))
        .await
        .map_err(|e| ErrorKind::WorkerPanicked(e.to_string()))?
}

struct Worker {
    id: usize,
    client: Arc<dyn QueryClient>,
    context: Arc<Context>,
    cancel: CancellationToken,
    checkpoint_trigger: Option<Arc<Notify>>,
}

impl Worker {
    async fn run(self) {
        debug!("Worker {} started", self.id);
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let notified = self.context.frontier.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let step = self.context.step().await;
            match self.context.frontier.pop() {
                Pop::Entry(entry) => {
                    self.process(entry).await;
                    drop(step);
                    if let Some(trigger) = &self.checkpoint_trigger {
                        trigger.notify_one();
                    }
                }
                Pop::Pending => {
                    drop(step);
                    tokio::select! {
                        () = notified.as_mut() => {}
                        () = tokio::time::sleep(IDLE_POLL) => {}
                        () = self.cancel.cancelled() => break,
                    }
                }
                Pop::Exhausted => break,
            }
        }
        debug!("Worker {} finished", self.id);
    }

    async fn process(&self, entry: FrontierEntry) {
        let context = &self.context;

        if !entry.is_retry() && context.visited.contains(&entry.prefix) {
            debug!("Skipping {}: already visited", entry.prefix);
            context.frontier.complete(&entry.prefix, []);
            return;
        }

        tokio::select! {
            _ = context.rate.before_query(&entry.prefix) => {}
            () = self.cancel.cancelled() => {
                context.frontier.release(entry);
                return;
            }
        }

        if !context.visited.mark(&entry.prefix) && !entry.is_retry() {
            debug!("Skipping {}: dispatched by another worker", entry.prefix);
            context.frontier.complete(&entry.prefix, []);
            return;
        }

        let outcome = self
            .client
            .query(&entry.prefix, context.config.max_results)
            .await;
        context.rate.after_query(&outcome);
        context.stats.record_outcome(&entry.prefix, &outcome);
        self.settle(entry, outcome);
    }

    /// Record the outcome and hand the entry back to the frontier
    fn settle(&self, entry: FrontierEntry, outcome: Outcome) {
        let context = &self.context;
        let config = &context.config;
        let prefix = entry.prefix.clone();

        let result = match outcome {
            Outcome::Results(result) => result,
            failure if failure.is_retryable() && entry.attempts < config.max_retries => {
                debug!(
                    "{prefix}: {}, retry {} of {}",
                    failure.reason().unwrap_or_default(),
                    entry.attempts + 1,
                    config.max_retries
                );
                context.stats.record_retry();
                context.frontier.release(entry.retry());
                return;
            }
            failure => {
                let reason = failure.reason().unwrap_or_default();
                let reason = if failure.is_retryable() {
                    format!("retries exhausted: {reason}")
                } else {
                    reason
                };
                warn!("Giving up on {prefix}: {reason}");
                context.failed.record(prefix.clone(), reason);
                context.stats.record_failure();
                context.frontier.complete(&prefix, []);
                return;
            }
        };

        let new_names = context.discovered.record_all(result.names());
        context.stats.record_discoveries(&prefix, new_names);
        self.note_unknown_chars(&result);

        if result.is_truncated() && prefix.len() >= config.max_prefix_len {
            warn!(
                "Giving up on {prefix}: still truncated at the depth limit of {}",
                config.max_prefix_len
            );
            context.failed.record(prefix.clone(), "depth limit");
            context.stats.record_failure();
            context.frontier.complete(&prefix, []);
            return;
        }

        if result.is_truncated() && boundary_char(&prefix, &result).is_none() {
            debug!(
                "{prefix}: truncated window without boundary character, applying {}",
                config.boundary_policy
            );
        }

        let children: Vec<FrontierEntry> =
            expand(&prefix, &result, &config.charset, config.boundary_policy)
                .into_iter()
                .filter(|child| !context.visited.contains(child))
                .map(FrontierEntry::new)
                .collect();
        debug!(
            "{prefix}: {} names ({new_names} new), {} children",
            result.len(),
            children.len()
        );
        context.frontier.complete(&prefix, children);
    }

    fn note_unknown_chars(&self, result: &QueryResult) {
        let charset = &self.context.config.charset;
        for c in result.names().iter().flat_map(|name| name.chars()) {
            if !charset.contains(c) && self.context.stats.observe_unknown_char(c) {
                warn!("Found {c:?} outside the charset; names continuing with it may be missed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc, time::Duration};

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::{
        Prefix,
        test_utils::{MemoryStore, MockClient, fast_config},
    };

    const WORDS: [&str; 5] = ["ant", "apple", "application", "apply", "banana"];

    /// A vocabulary full of names that are prefixes of other names
    fn nested_vocabulary() -> Vec<String> {
        let mut names = Vec::new();
        for a in ['a', 'b', 'c'] {
            names.push(a.to_string());
            for b in ['a', 'b', 'c'] {
                names.push(format!("{a}{b}"));
                for c in ['a', 'c'] {
                    names.push(format!("{a}{b}{c}"));
                    if b != 'b' {
                        names.push(format!("{a}{b}{c}a"));
                    }
                }
            }
        }
        names.push("cccccc".into());
        names
    }

    async fn harvest(client: &Arc<MockClient>, config: HarvestConfig) -> HarvestReport {
        Harvester::new(Arc::clone(client) as Arc<dyn QueryClient>, config)
            .unwrap()
            .run()
            .await
            .unwrap()
    }

    fn assert_no_duplicate_dispatch(dispatched: &[Prefix]) {
        let unique: HashSet<&Prefix> = dispatched.iter().collect();
        assert_eq!(unique.len(), dispatched.len(), "{dispatched:?}");
    }

    #[tokio::test]
    async fn test_discovers_whole_vocabulary() {
        let client = Arc::new(MockClient::new(WORDS));
        let report = harvest(&client, fast_config(2)).await;

        assert_eq!(report.completion, Completion::Complete);
        assert_eq!(report.discovered, client.vocabulary());
        assert!(report.failed.is_empty());

        let dispatched = client.dispatched();
        assert_eq!(dispatched[..2], [Prefix::root(), Prefix::from("a")]);
        assert!(dispatched.contains(&Prefix::from("appli")));
        assert!(dispatched.contains(&Prefix::from("apply")));
        assert_no_duplicate_dispatch(&dispatched);
        assert_eq!(report.stats.total_queries, dispatched.len() as u64);
        assert_eq!(report.stats.discovered, 5);
    }

    #[rstest]
    #[case(1, 1)]
    #[case(1, 4)]
    #[case(2, 1)]
    #[case(3, 4)]
    #[case(7, 2)]
    #[tokio::test]
    async fn test_complete_for_any_cap_and_pool_size(
        #[case] max_results: usize,
        #[case] max_workers: usize,
    ) {
        let client = Arc::new(MockClient::new(nested_vocabulary()));
        let config = HarvestConfig {
            max_workers,
            charset: "abc".parse().unwrap(),
            ..fast_config(max_results)
        };
        let report = harvest(&client, config).await;

        assert_eq!(report.completion, Completion::Complete);
        assert_eq!(report.discovered, client.vocabulary());
        assert_no_duplicate_dispatch(&client.dispatched());
    }

    #[tokio::test]
    async fn test_single_worker_runs_are_deterministic() {
        let first = Arc::new(MockClient::new(nested_vocabulary()));
        let second = Arc::new(MockClient::new(nested_vocabulary()));
        let config = HarvestConfig {
            charset: "cba".parse().unwrap(),
            ..fast_config(2)
        };

        let a = harvest(&first, config.clone()).await;
        let b = harvest(&second, config).await;

        assert_eq!(first.dispatched(), second.dispatched());
        assert_eq!(a.discovered, b.discovered);
        assert_eq!(a.stats, b.stats);
    }

    #[tokio::test]
    async fn test_empty_vocabulary_terminates_with_idle_workers() {
        let client = Arc::new(MockClient::new(Vec::<String>::new()));
        let config = HarvestConfig {
            max_workers: 4,
            ..fast_config(10)
        };
        let report = harvest(&client, config).await;
        assert_eq!(report.completion, Completion::Complete);
        assert!(report.discovered.is_empty());
        assert_eq!(client.dispatched(), vec![Prefix::root()]);
    }

    #[tokio::test]
    async fn test_retryable_failures_are_retried() {
        let client = Arc::new(MockClient::new(WORDS).script(
            "b",
            [
                Outcome::RateLimited { retry_after: None },
                Outcome::Transient("connection reset".into()),
            ],
        ));
        let report = harvest(&client, fast_config(2)).await;

        assert_eq!(report.discovered, client.vocabulary());
        assert!(report.failed.is_empty());
        assert_eq!(report.stats.retries, 2);
        assert_eq!(report.stats.rate_limited, 1);
        let b_dispatches = client
            .dispatched()
            .iter()
            .filter(|p| p.as_str() == "b")
            .count();
        assert_eq!(b_dispatches, 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_recorded() {
        let client = Arc::new(
            MockClient::new(WORDS).script("b", vec![Outcome::Transient("HTTP 503".into()); 10]),
        );
        let report = harvest(&client, fast_config(2)).await;

        assert_eq!(report.completion, Completion::Complete);
        assert!(!report.discovered.contains("banana"));
        assert_eq!(
            report.failed,
            vec![FailedPrefix {
                prefix: Prefix::from("b"),
                reason: "retries exhausted: HTTP 503".into()
            }]
        );
        let b_dispatches = client
            .dispatched()
            .iter()
            .filter(|p| p.as_str() == "b")
            .count();
        assert_eq!(b_dispatches, 4);
    }

    #[tokio::test]
    async fn test_malformed_is_not_retried() {
        let client = Arc::new(
            MockClient::new(WORDS).script("a", [Outcome::Malformed("not json".into())]),
        );
        let report = harvest(&client, fast_config(2)).await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].prefix, Prefix::from("a"));
        assert!(report.discovered.contains("banana"));
        assert!(!report.discovered.contains("application"));
        assert_eq!(report.stats.malformed, 1);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let client = Arc::new(MockClient::new(["aaa", "aab", "aac"]));
        let config = HarvestConfig {
            max_prefix_len: 2,
            ..fast_config(1)
        };
        let report = harvest(&client, config).await;

        assert_eq!(report.completion, Completion::Complete);
        assert!(report.failed.iter().any(|f| f.reason == "depth limit"));
        assert!(client.dispatched().iter().all(|p| p.len() <= 2));
    }

    #[tokio::test]
    async fn test_unknown_characters_are_reported() {
        let client = Arc::new(MockClient::new(["a-b", "ab"]));
        let report = harvest(&client, fast_config(5)).await;
        assert_eq!(report.stats.unknown_chars, BTreeSet::from(['-']));
    }

    #[tokio::test]
    async fn test_interrupted_run_resumes_to_same_result() {
        let config = fast_config(2);
        let store = Arc::new(MemoryStore::default());

        let token = CancellationToken::new();
        let first = Arc::new(MockClient::new(nested_vocabulary()).cancel_after(6, token.clone()));
        let mut harvester =
            Harvester::new(Arc::clone(&first) as Arc<dyn QueryClient>, config.clone())
                .unwrap()
                .with_checkpoints(CheckpointManager::new(store.clone(), &config));
        harvester.cancel = token;
        let interrupted = harvester.run().await.unwrap();

        assert_eq!(interrupted.completion, Completion::Interrupted);
        assert_eq!(first.dispatched().len(), 6);
        let record = store.latest().unwrap();
        assert_eq!(Some(record.version), interrupted.checkpoint_version);
        assert!(!record.frontier.is_empty());

        let second = Arc::new(MockClient::new(nested_vocabulary()));
        let manager = CheckpointManager::new(store.clone(), &config);
        let record = manager.load().unwrap().unwrap();
        let resumed = Harvester::resume(Arc::clone(&second) as Arc<dyn QueryClient>, config, record)
            .unwrap()
            .with_checkpoints(manager)
            .run()
            .await
            .unwrap();

        assert_eq!(resumed.completion, Completion::Complete);
        assert_eq!(resumed.discovered, second.vocabulary());
        assert!(resumed.checkpoint_version > interrupted.checkpoint_version);

        let mut all = first.dispatched();
        all.extend(second.dispatched());
        assert_no_duplicate_dispatch(&all);
        assert_eq!(resumed.stats.total_queries, all.len() as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_abandons_in_flight_queries() {
        let config = HarvestConfig {
            shutdown_grace: Duration::from_secs(1),
            ..fast_config(2)
        };
        let store = Arc::new(MemoryStore::default());
        let token = CancellationToken::new();
        let slow = Arc::new(
            MockClient::new(WORDS)
                .with_delay(Duration::from_secs(60))
                .cancel_after(1, token.clone()),
        );
        let mut harvester = Harvester::new(Arc::clone(&slow) as Arc<dyn QueryClient>, config.clone())
            .unwrap()
            .with_checkpoints(CheckpointManager::new(store.clone(), &config));
        harvester.cancel = token;
        let report = harvester.run().await.unwrap();

        assert_eq!(report.completion, Completion::Interrupted);
        assert!(report.discovered.is_empty());
        let record = store.latest().unwrap();
        assert_eq!(record.frontier, vec![FrontierEntry::new(Prefix::root()).retry()]);
        assert!(record.visited.contains(&Prefix::root()));

        let fast = Arc::new(MockClient::new(WORDS));
        let resumed = Harvester::resume(Arc::clone(&fast) as Arc<dyn QueryClient>, config, record)
            .unwrap()
            .run()
            .await
            .unwrap();
        assert_eq!(resumed.completion, Completion::Complete);
        assert_eq!(resumed.discovered, fast.vocabulary());
        assert_eq!(fast.dispatched()[0], Prefix::root());
    }

    #[tokio::test]
    async fn test_periodic_checkpoints_are_written() {
        let config = HarvestConfig {
            checkpoint_interval: 5,
            ..fast_config(2)
        };
        let store = Arc::new(MemoryStore::default());
        let client = Arc::new(
            MockClient::new(nested_vocabulary()).with_delay(Duration::from_millis(5)),
        );
        let report = Harvester::new(Arc::clone(&client) as Arc<dyn QueryClient>, config.clone())
            .unwrap()
            .with_checkpoints(CheckpointManager::new(store.clone(), &config))
            .run()
            .await
            .unwrap();

        assert!(store.saves() > 1);
        let latest = store.latest().unwrap();
        assert_eq!(Some(latest.version), report.checkpoint_version);
        assert_eq!(latest.version, store.saves() as u64);
        assert_eq!(latest.discovered, report.discovered);
        assert!(latest.frontier.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = HarvestConfig {
            max_workers: 0,
            ..fast_config(2)
        };
        assert!(Harvester::new(Arc::new(MockClient::default()), config).is_err());
    }
}
