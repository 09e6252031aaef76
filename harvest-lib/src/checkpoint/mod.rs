//! Persisting and restoring the complete exploration state.
//!
//! A [`CheckpointRecord`] is taken while no worker is between dequeuing a
//! prefix and enqueuing its children, so restoring it is equivalent to
//! having paused the run at that instant.

mod store;

use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant, SystemTime},
};

use log::info;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub use store::{CheckpointStore, JsonFileStore, write_atomic};

use crate::{
    Charset, FailedPrefix, FrontierEntry, HarvestConfig, Prefix, RateState, Result, StatsSnapshot,
    context::Context,
};

/// Revision of the on-disk layout understood by this build
pub const CHECKPOINT_FORMAT: u32 = 1;

/// Everything needed to continue a harvest exactly where it stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Revision of the on-disk layout
    pub format: u32,
    /// Increases with every checkpoint of a harvest, across restarts
    pub version: u64,
    /// When the record was taken
    #[serde(with = "humantime_serde")]
    pub timestamp: SystemTime,
    /// Charset of the run that wrote the record
    pub charset: Charset,
    /// Result cap of the run that wrote the record
    pub max_results: usize,
    /// Pending prefixes in serving order
    pub frontier: Vec<FrontierEntry>,
    /// Prefixes dispatched at least once
    pub visited: BTreeSet<Prefix>,
    /// Names found so far
    pub discovered: BTreeSet<String>,
    /// Abandoned prefixes
    pub failed: Vec<FailedPrefix>,
    /// Adaptive pacing state
    pub rate_state: RateState,
    /// Counters at the time of the record
    pub stats: StatsSnapshot,
}

/// Decides when to take checkpoints and hands them to a [`CheckpointStore`]
#[derive(Debug)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    interval: u64,
    max_age: Option<Duration>,
    version: AtomicU64,
    last_queries: AtomicU64,
    last_saved: Mutex<Instant>,
}

impl CheckpointManager {
    /// A manager using the checkpoint triggers of `config`
    #[must_use]
    pub fn new(store: Arc<dyn CheckpointStore>, config: &HarvestConfig) -> Self {
        Self {
            store,
            interval: config.checkpoint_interval,
            max_age: config.checkpoint_max_age,
            version: AtomicU64::new(0),
            last_queries: AtomicU64::new(0),
            last_saved: Mutex::new(Instant::now()),
        }
    }

    /// Load the latest record.
    ///
    /// Versions of later checkpoints continue from the loaded one.
    ///
    /// # Errors
    ///
    /// Returns an error if a record exists but cannot be read.
    pub fn load(&self) -> Result<Option<CheckpointRecord>> {
        let record = self.store.load()?;
        if let Some(record) = &record {
            self.version.store(record.version, Ordering::SeqCst);
            self.last_queries
                .store(record.stats.total_queries, Ordering::SeqCst);
        }
        Ok(record)
    }

    /// The longest time between checkpoints while queries complete
    #[must_use]
    pub const fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Version of the most recent checkpoint, `0` if none was taken
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Returns `true` if a checkpoint should be taken after `total_queries`
    #[must_use]
    pub fn is_due(&self, total_queries: u64) -> bool {
        let since_last = total_queries.saturating_sub(self.last_queries.load(Ordering::SeqCst));
        if since_last == 0 {
            return false;
        }
        if self.interval > 0 && since_last >= self.interval {
            return true;
        }
        self.max_age
            .is_some_and(|max_age| self.last_saved.lock().elapsed() >= max_age)
    }

    /// Take a consistent snapshot of `context`.
    ///
    /// Waits until no worker is between dequeuing a prefix and enqueuing
    /// its children, and blocks workers from starting while copying.
    pub(crate) async fn snapshot(&self, context: &Context) -> CheckpointRecord {
        let _exclusive = context.quiesce().await;
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        context.capture(version)
    }

    /// Write `record` to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store could not persist the record.
    pub fn persist(&self, record: &CheckpointRecord) -> Result<()> {
        self.store.save(record)?;
        self.last_queries
            .fetch_max(record.stats.total_queries, Ordering::SeqCst);
        *self.last_saved.lock() = Instant::now();
        info!(
            "Checkpoint {} written: {} names, {} queued prefixes, {} queries",
            record.version,
            record.discovered.len(),
            record.frontier.len(),
            record.stats.total_queries
        );
        Ok(())
    }
}
