//! `harvest` discovers the full vocabulary hidden behind an autocomplete
//! endpoint that caps and rate-limits its responses.
//!
//! The binary is a wrapper around harvest-lib, adding configuration files,
//! progress output and signal handling.
//!
//! Harvest an endpoint returning at most 100 names per query:
//! ```sh
//! harvest https://api.example.com/v1/autocomplete --max-results 100
//! ```
//!
//! Write the names to a file and be gentle with the endpoint:
//! ```sh
//! harvest https://api.example.com/v1/autocomplete -o names.json --max-workers 2 --min-delay 2s
//! ```
//!
//! Press Ctrl+C to stop. Running the same command again resumes from the
//! checkpoint file; pass `--no-resume` to start over.
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    missing_debug_implementations,
    unreachable_pub,
    unused_extern_crates,
    clippy::missing_const_for_fn
)]
#![deny(missing_docs)]

use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Error, Result};
use clap::Parser;
use harvest_lib::{CheckpointManager, HarvestConfig, Harvester, HttpClient, JsonFileStore};
use log::{error, info, warn};

mod color;
mod logging;
mod options;
mod progress;
mod report;
mod verbosity;

use crate::{
    logging::init_logging,
    options::{Config, HARVEST_CONFIG_FILE, HarvestOptions},
    progress::Progress,
};

/// Process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    /// The harvest completed, or was interrupted and can be resumed
    Success = 0,
    // Errors returned from `main` exit with 1
    #[allow(unused)]
    UnexpectedFailure = 1,
    /// The checkpoint could not be restored or written
    CheckpointFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // Destructors must run before the process exits
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Complete the command-line options from the configuration file.
///
/// The default file only counts if it exists; an explicit one must.
fn merge_config_file(opts: &mut HarvestOptions) -> Result<()> {
    let file = match &opts.config_file {
        Some(path) => Some(path.clone()),
        None => Some(PathBuf::from(HARVEST_CONFIG_FILE)).filter(|path| path.is_file()),
    };
    if let Some(path) = file {
        let from_file = Config::load_from_file(&path)
            .with_context(|| format!("Cannot load configuration file `{}`", path.display()))?;
        opts.config.merge(from_file);
    }
    Ok(())
}

fn run_main() -> Result<i32> {
    let mut opts = HarvestOptions::parse();
    let merged = merge_config_file(&mut opts);
    // The file may set the log level
    init_logging(&opts.config.verbose);
    if let Err(e) = merged {
        exit_with_config_error(&e);
    }

    let harvest_config = opts
        .config
        .harvest_config()
        .unwrap_or_else(|e| exit_with_config_error(&e));
    let client = opts
        .config
        .client()
        .unwrap_or_else(|e| exit_with_config_error(&e));

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    if let Some(threads) = opts.config.threads {
        runtime.worker_threads(threads);
    }
    let runtime = runtime.enable_all().build()?;

    match runtime.block_on(run(&opts.config, harvest_config, client)) {
        // Output piped into a closed reader, such as `head`
        Err(e) if is_broken_pipe(&e) => Ok(ExitCode::Success as i32),
        res => res.map(|code| code as i32),
    }
}

fn exit_with_config_error(e: &Error) -> ! {
    error!("Error while loading config: {e:#}");
    std::process::exit(ExitCode::ConfigFile as i32);
}

fn is_broken_pipe(error: &Error) -> bool {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|e| e.kind() == io::ErrorKind::BrokenPipe)
}

/// Run a harvest, resuming from the checkpoint file unless told otherwise
async fn run(cfg: &Config, harvest_config: HarvestConfig, client: HttpClient) -> Result<ExitCode> {
    let store = Arc::new(JsonFileStore::new(&cfg.checkpoint));
    let manager = CheckpointManager::new(store, &harvest_config);
    let record = if cfg.no_resume {
        None
    } else {
        match manager.load() {
            Ok(record) => record,
            Err(e) => {
                error!("{e}. Pass `--no-resume` to start over");
                return Ok(ExitCode::CheckpointFailure);
            }
        }
    };

    let harvester = match record {
        Some(record) => {
            if record.frontier.is_empty() {
                info!(
                    "Checkpoint `{}` holds a finished harvest. Pass `--no-resume` to start over",
                    cfg.checkpoint.display()
                );
            }
            Harvester::resume(Arc::new(client), harvest_config, record)?
        }
        None => Harvester::new(Arc::new(client), harvest_config)?,
    }
    .with_checkpoints(manager);

    let token = harvester.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stopping after in-flight queries, progress is saved to the checkpoint");
            token.cancel();
        }
    });

    let progress = Progress::start(harvester.monitor(), cfg.no_progress);
    let outcome = harvester.run().await;
    progress.finish();

    let report = match outcome {
        Ok(report) => report,
        Err(e) if e.is_checkpoint_error() => {
            error!("{e}");
            return Ok(ExitCode::CheckpointFailure);
        }
        Err(e) => return Err(e.into()),
    };

    match &cfg.output {
        Some(path) => report::write_results(&report, path)?,
        None => report::write_names(&report, &mut io::stdout().lock())?,
    }
    let mut stderr = io::stderr().lock();
    report::write_report(&report, cfg.format, &mut stderr)?;
    stderr.flush()?;

    Ok(ExitCode::Success)
}
