//! `harvest` discovers the hidden vocabulary behind a capped, rate-limited
//! autocomplete endpoint.
//!
//! The endpoint answers a prefix with at most `max_results` names. A capped
//! answer proves that more names share the prefix, and the last returned
//! name tells where the window ended. [`expand()`] turns that into the next
//! prefixes to query, and [`Harvester`] runs the exploration over a pool of
//! workers until nothing is left to query.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use harvest_lib::{ClientBuilder, HarvestConfig, Harvester};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint: Url = "https://api.example.com/v1/autocomplete".parse()?;
//!     let client = ClientBuilder::builder().endpoint(endpoint).build().client()?;
//!     let report = Harvester::new(Arc::new(client), HarvestConfig::default())?
//!         .run()
//!         .await?;
//!     println!("{} names", report.discovered.len());
//!     Ok(())
//! }
//! ```
//!
//! Long runs should write checkpoints, see [`CheckpointManager`] and
//! [`Harvester::resume`].

mod context;
mod retry;
#[cfg(test)]
mod test_utils;
mod types;

pub mod checkpoint;
pub mod client;
pub mod config;
pub mod expand;
pub mod frontier;
pub mod harvester;
pub mod ratelimit;
pub mod stats;
pub mod store;

pub use crate::{
    checkpoint::{
        CHECKPOINT_FORMAT, CheckpointManager, CheckpointRecord, CheckpointStore, JsonFileStore,
        write_atomic,
    },
    client::{ClientBuilder, HttpClient, QueryClient},
    config::{
        DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_CHECKPOINT_MAX_AGE, DEFAULT_MAX_PREFIX_LEN,
        DEFAULT_MAX_RESULTS, DEFAULT_MAX_RETRIES, DEFAULT_MAX_WORKERS, DEFAULT_SHUTDOWN_GRACE,
        HarvestConfig,
    },
    expand::{BoundaryPolicy, expand},
    frontier::{Frontier, FrontierEntry, Pop},
    harvester::{Completion, HarvestReport, Harvester, Monitor},
    ratelimit::{RateController, RateLimitConfig, RateState},
    stats::{LengthStats, StatsCollector, StatsSnapshot},
    store::{DiscoveredNames, FailedPrefix, FailedPrefixes, VisitedSet},
    types::{Charset, ErrorKind, Outcome, OutcomeKind, Prefix, QueryResult, Result},
};
