//! The state shared by all workers of one harvest.

use std::time::SystemTime;

use log::warn;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    CheckpointRecord, DiscoveredNames, FailedPrefixes, Frontier, FrontierEntry, HarvestConfig,
    Prefix, RateController, StatsCollector, VisitedSet, checkpoint::CHECKPOINT_FORMAT,
};

/// Frontier, result sets, pacing and statistics of one harvest.
///
/// Workers hold a shared [`Context::step`] guard from dequeuing a prefix
/// until its children are enqueued. Checkpoints take the exclusive
/// [`Context::quiesce`] guard, so they never observe a half-processed
/// prefix.
#[derive(Debug)]
pub(crate) struct Context {
    pub(crate) config: HarvestConfig,
    pub(crate) frontier: Frontier,
    pub(crate) visited: VisitedSet,
    pub(crate) discovered: DiscoveredNames,
    pub(crate) failed: FailedPrefixes,
    pub(crate) rate: RateController,
    pub(crate) stats: StatsCollector,
    gate: RwLock<()>,
}

impl Context {
    /// A fresh harvest starting from the empty prefix
    pub(crate) fn cold(config: HarvestConfig) -> Self {
        let frontier = Frontier::from_entries([FrontierEntry::new(Prefix::root())]);
        Self {
            frontier,
            visited: VisitedSet::default(),
            discovered: DiscoveredNames::default(),
            failed: FailedPrefixes::default(),
            rate: RateController::new(config.rate_limit),
            stats: StatsCollector::default(),
            gate: RwLock::new(()),
            config,
        }
    }

    /// Reseed every structure exactly from `record`
    pub(crate) fn restore(config: HarvestConfig, record: CheckpointRecord) -> Self {
        if record.charset != config.charset {
            warn!(
                "Checkpoint was written with charset `{}`, continuing with `{}`",
                record.charset, config.charset
            );
        }
        if record.max_results != config.max_results {
            warn!(
                "Checkpoint was written with max_results {}, continuing with {}",
                record.max_results, config.max_results
            );
        }

        Self {
            frontier: Frontier::from_entries(record.frontier),
            visited: record.visited.into_iter().collect(),
            discovered: record.discovered.into_iter().collect(),
            failed: record.failed.into_iter().collect(),
            rate: RateController::with_state(config.rate_limit, record.rate_state),
            stats: StatsCollector::from_snapshot(&record.stats),
            gate: RwLock::new(()),
            config,
        }
    }

    /// Shared guard held by a worker while it processes one prefix
    pub(crate) async fn step(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().await
    }

    /// Exclusive guard under which no prefix is being processed
    pub(crate) async fn quiesce(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }

    /// Copy all state into a record.
    ///
    /// Only consistent while [`Context::quiesce`] is held or no worker runs.
    pub(crate) fn capture(&self, version: u64) -> CheckpointRecord {
        let frontier = self.frontier.snapshot();
        let stats = self.stats.snapshot(frontier.len());
        CheckpointRecord {
            format: CHECKPOINT_FORMAT,
            version,
            timestamp: SystemTime::now(),
            charset: self.config.charset.clone(),
            max_results: self.config.max_results,
            frontier,
            visited: self.visited.snapshot(),
            discovered: self.discovered.snapshot(),
            failed: self.failed.snapshot(),
            rate_state: self.rate.state(),
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{checkpoint::tests::record, test_utils::fast_config};

    #[test]
    fn test_cold_start_seeds_root() {
        let context = Context::cold(fast_config(2));
        let captured = context.capture(1);
        assert_eq!(captured.frontier, vec![FrontierEntry::new(Prefix::root())]);
        assert!(captured.visited.is_empty());
        assert!(captured.discovered.is_empty());
    }

    #[test]
    fn test_restore_then_capture_is_identity() {
        let saved = record(7);
        let context = Context::restore(fast_config(2), saved.clone());
        let captured = context.capture(7);

        assert_eq!(captured.frontier, saved.frontier);
        assert_eq!(captured.visited, saved.visited);
        assert_eq!(captured.discovered, saved.discovered);
        assert_eq!(captured.failed, saved.failed);
        assert_eq!(captured.stats.total_queries, saved.stats.total_queries);
    }

    #[tokio::test]
    async fn test_quiesce_waits_for_steps() {
        let context = Context::cold(fast_config(2));
        let step = context.step().await;
        assert!(context.gate.try_write().is_err());
        drop(step);
        let _exclusive = context.quiesce().await;
        assert!(context.gate.try_read().is_err());
    }
}
