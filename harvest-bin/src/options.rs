use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, builder::TypedValueParser};
use const_format::{concatcp, formatcp};
use harvest_lib::{
    BoundaryPolicy, Charset, ClientBuilder, DEFAULT_CHECKPOINT_INTERVAL,
    DEFAULT_CHECKPOINT_MAX_AGE, DEFAULT_MAX_PREFIX_LEN, DEFAULT_MAX_RESULTS, DEFAULT_MAX_RETRIES,
    DEFAULT_MAX_WORKERS, DEFAULT_SHUTDOWN_GRACE, HarvestConfig, HttpClient, RateLimitConfig,
    client::{
        DEFAULT_LIMIT_PARAM, DEFAULT_QUERY_PARAM, DEFAULT_RESULTS_FIELD, DEFAULT_TIMEOUT,
        DEFAULT_USER_AGENT,
    },
};
use http::{
    HeaderMap,
    header::{HeaderName, HeaderValue},
};
use serde::{Deserialize, Deserializer};
use strum::{Display, EnumString, VariantNames};
use url::Url;

use crate::verbosity::Verbosity;

pub(crate) const HARVEST_CONFIG_FILE: &str = "harvest.toml";
pub(crate) const HARVEST_CHECKPOINT_FILE: &str = "harvest-checkpoint.json";

// clap takes its defaults as strings, serde as typed values
const MAX_RESULTS_STR: &str = concatcp!(DEFAULT_MAX_RESULTS);
const MAX_WORKERS_STR: &str = concatcp!(DEFAULT_MAX_WORKERS);
const MAX_RETRIES_STR: &str = concatcp!(DEFAULT_MAX_RETRIES);
const CHECKPOINT_INTERVAL_STR: &str = concatcp!(DEFAULT_CHECKPOINT_INTERVAL);
const MAX_PREFIX_LEN_STR: &str = concatcp!(DEFAULT_MAX_PREFIX_LEN);
const CHECKPOINT_MAX_AGE_STR: &str = "5m";
const SHUTDOWN_GRACE_STR: &str = "10s";
const TIMEOUT_STR: &str = "30s";
const CHARSET_STR: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

// The default is only mentioned in the help text: a missing default
// file is fine, a missing explicit one is an error.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    HARVEST_CONFIG_FILE,
);

/// The format of the final report
#[derive(
    Debug, Deserialize, Default, Clone, Copy, Display, EnumString, VariantNames, PartialEq, Eq,
)]
#[non_exhaustive]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ReportFormat {
    /// A short human-readable summary
    #[default]
    Compact,
    /// The full report as JSON
    Json,
}

// serde takes defaults as function paths
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

default_function! {
    max_results: usize = DEFAULT_MAX_RESULTS;
    max_workers: usize = DEFAULT_MAX_WORKERS;
    max_retries: u32 = DEFAULT_MAX_RETRIES;
    checkpoint_interval: u64 = DEFAULT_CHECKPOINT_INTERVAL;
    checkpoint_max_age: Duration = DEFAULT_CHECKPOINT_MAX_AGE;
    max_prefix_len: usize = DEFAULT_MAX_PREFIX_LEN;
    shutdown_grace: Duration = DEFAULT_SHUTDOWN_GRACE;
    timeout: Duration = DEFAULT_TIMEOUT;
    checkpoint: PathBuf = PathBuf::from(HARVEST_CHECKPOINT_FILE);
    user_agent: String = DEFAULT_USER_AGENT.to_string();
    query_param: String = DEFAULT_QUERY_PARAM.to_string();
    limit_param: String = DEFAULT_LIMIT_PARAM.to_string();
    results_field: String = DEFAULT_RESULTS_FIELD.to_string();
    verbosity: Verbosity = Verbosity::default();
}

// Take a value from the file wherever the command line left the default.
// The dead struct literal fails to compile when a field of `$ty` is missing.
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// Split a `Header-Name: value` argument into its trimmed parts.
///
/// Error messages never repeat the value, since headers often carry
/// credentials.
fn parse_header(input: &str) -> Result<(String, String)> {
    let (name, value) = input
        .split_once(':')
        .ok_or_else(|| anyhow!("Expected a header of the form `Header-Name: value`"))?;
    let name = HeaderName::from_str(name.trim())
        .map_err(|_| anyhow!("`{}` is not a valid header name", name.trim()))?;
    let value = value.trim();
    HeaderValue::from_str(value)
        .map_err(|_| anyhow!("The value of header `{name}` contains invalid characters"))?;
    Ok((name.to_string(), value.to_owned()))
}

/// Build the request headers, rejecting invalid names and values
fn header_map(headers: &[(String, String)]) -> Result<HeaderMap> {
    headers
        .iter()
        .map(|(name, value)| {
            let name = HeaderName::from_str(name)
                .with_context(|| format!("`{name}` is not a valid header name"))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| {
                    format!("The value of header `{name}` contains invalid characters")
                })?;
            Ok::<_, anyhow::Error>((name, value))
        })
        .collect()
}

/// Headers in the configuration file form a table of names to values
fn deserialize_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let table = BTreeMap::<String, String>::deserialize(deserializer)?;
    Ok(table
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect())
}

/// harvest discovers the full vocabulary behind an autocomplete endpoint
/// that caps every response, by expanding prefixes only where a capped
/// answer proves that more names are hidden.
///
/// Progress is checkpointed, so an interrupted run continues where it
/// stopped when started again with the same checkpoint file.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct HarvestOptions {
    /// Configuration file to use
    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

/// The main configuration for harvest
#[allow(clippy::struct_excessive_bools)]
#[derive(Parser, Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// URL of the autocomplete endpoint
    #[arg(value_name = "ENDPOINT")]
    #[serde(default)]
    pub(crate) endpoint: Option<Url>,

    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Do not show the progress spinner.
    /// Progress is logged periodically instead.
    #[arg(short, long, verbatim_doc_comment)]
    #[serde(default)]
    pub(crate) no_progress: bool,

    /// Write discovered names as JSON to this file instead of printing
    /// them to stdout
    #[arg(short, long, value_name = "PATH")]
    #[serde(default)]
    pub(crate) output: Option<PathBuf>,

    /// Format of the final report, printed to stderr
    #[arg(short, long, default_value = "compact", value_parser = clap::builder::PossibleValuesParser::new(ReportFormat::VARIANTS).try_map(|s| s.parse::<ReportFormat>()))]
    #[serde(default)]
    pub(crate) format: ReportFormat,

    /// Checkpoint file to resume from and write to
    #[arg(long, value_name = "PATH", default_value = HARVEST_CHECKPOINT_FILE)]
    #[serde(default = "checkpoint")]
    pub(crate) checkpoint: PathBuf,

    /// Start from scratch, ignoring an existing checkpoint
    #[arg(long)]
    #[serde(default)]
    pub(crate) no_resume: bool,

    /// Maximum number of names the endpoint returns per query
    #[arg(long, default_value = MAX_RESULTS_STR)]
    #[serde(default = "max_results")]
    pub(crate) max_results: usize,

    /// Number of concurrent workers
    #[arg(long, default_value = MAX_WORKERS_STR)]
    #[serde(default = "max_workers")]
    pub(crate) max_workers: usize,

    /// Retries of a rate-limited or failed query before giving up on its prefix
    #[arg(long, default_value = MAX_RETRIES_STR)]
    #[serde(default = "max_retries")]
    pub(crate) max_retries: u32,

    /// Completed queries between two checkpoints, 0 disables this trigger
    #[arg(long, default_value = CHECKPOINT_INTERVAL_STR)]
    #[serde(default = "checkpoint_interval")]
    pub(crate) checkpoint_interval: u64,

    /// Write a checkpoint at least this often, 0s disables this trigger
    #[arg(long, default_value = CHECKPOINT_MAX_AGE_STR, value_parser = humantime::parse_duration)]
    #[serde(default = "checkpoint_max_age", with = "humantime_serde")]
    pub(crate) checkpoint_max_age: Duration,

    /// Characters used to extend prefixes, in the order they are tried
    #[arg(long, default_value = CHARSET_STR)]
    #[serde(default)]
    pub(crate) charset: Charset,

    /// What to do with a capped prefix whose answer reveals no next
    /// character: `expand-all` queries every extension, `leaf` stops there
    #[arg(long, default_value = "expand-all")]
    #[serde(default)]
    pub(crate) boundary_policy: BoundaryPolicy,

    /// Capped prefixes of this length are given up on
    #[arg(long, default_value = MAX_PREFIX_LEN_STR)]
    #[serde(default = "max_prefix_len")]
    pub(crate) max_prefix_len: usize,

    /// Time in-flight queries get to finish after Ctrl+C
    #[arg(long, default_value = SHUTDOWN_GRACE_STR, value_parser = humantime::parse_duration)]
    #[serde(default = "shutdown_grace", with = "humantime_serde")]
    pub(crate) shutdown_grace: Duration,

    /// Delay before the first query (default: 1s)
    #[arg(long, value_parser = humantime::parse_duration)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) base_delay: Option<Duration>,

    /// Lower bound of the adaptive delay (default: 800ms)
    #[arg(long, value_parser = humantime::parse_duration)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) min_delay: Option<Duration>,

    /// Upper bound of the adaptive delay (default: 3s)
    #[arg(long, value_parser = humantime::parse_duration)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) max_delay: Option<Duration>,

    /// Seed for the backoff jitter, for reproducible pacing
    #[arg(long)]
    #[serde(default)]
    pub(crate) jitter_seed: Option<u64>,

    /// Full pacing policy. Only available in the configuration file,
    /// as the `[rate_limit]` table
    #[arg(skip)]
    #[serde(default)]
    pub(crate) rate_limit: RateLimitConfig,

    /// Timeout for a single query, including reading the body
    #[arg(short, long, default_value = TIMEOUT_STR, value_parser = humantime::parse_duration)]
    #[serde(default = "timeout", with = "humantime_serde")]
    pub(crate) timeout: Duration,

    /// User agent
    #[arg(short, long, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub(crate) user_agent: String,

    /// Custom request header, as `Header-Name: value`. Can be repeated
    #[arg(short = 'H', long = "header", value_parser = parse_header, value_name = "HEADER:VALUE")]
    #[serde(default, deserialize_with = "deserialize_headers")]
    pub(crate) header: Vec<(String, String)>,

    /// Query parameter carrying the prefix
    #[arg(long, default_value = DEFAULT_QUERY_PARAM)]
    #[serde(default = "query_param")]
    pub(crate) query_param: String,

    /// Query parameter carrying the result cap
    #[arg(long, default_value = DEFAULT_LIMIT_PARAM)]
    #[serde(default = "limit_param")]
    pub(crate) limit_param: String,

    /// JSON field of the response holding the names
    #[arg(long, default_value = DEFAULT_RESULTS_FIELD)]
    #[serde(default = "results_field")]
    pub(crate) results_field: String,

    /// Worker threads of the async runtime, one per core by default
    #[arg(short = 'T', long)]
    #[serde(default)]
    pub(crate) threads: Option<usize>,
}

impl Config {
    /// Union of both header lists; a header given on the command line
    /// replaces the same one from the file
    fn merge_headers(&mut self, file: &[(String, String)]) {
        let mut merged: BTreeMap<String, String> = file.iter().cloned().collect();
        merged.extend(self.header.drain(..));
        self.header = merged.into_iter().collect();
    }

    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).context("Invalid TOML")
    }

    /// Fill in everything the command line left at its default from `toml`
    pub(crate) fn merge(&mut self, toml: Config) {
        self.merge_headers(&toml.header);

        // The pacing table is only available in TOML
        self.rate_limit = toml.rate_limit;

        fold_in! {
            self, toml;

            Config {
                ..header,
                ..rate_limit,

                base_delay: None,
                boundary_policy: BoundaryPolicy::default(),
                charset: Charset::default(),
                checkpoint: checkpoint(),
                checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
                checkpoint_max_age: DEFAULT_CHECKPOINT_MAX_AGE,
                endpoint: None,
                format: ReportFormat::default(),
                jitter_seed: None,
                limit_param: limit_param(),
                max_delay: None,
                max_prefix_len: DEFAULT_MAX_PREFIX_LEN,
                max_results: DEFAULT_MAX_RESULTS,
                max_retries: DEFAULT_MAX_RETRIES,
                max_workers: DEFAULT_MAX_WORKERS,
                min_delay: None,
                no_progress: false,
                no_resume: false,
                output: None,
                query_param: query_param(),
                results_field: results_field(),
                shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
                threads: None,
                timeout: DEFAULT_TIMEOUT,
                user_agent: user_agent(),
                verbose: Verbosity::default(),
            }
        }
    }

    /// The exploration settings, with command-line pacing overrides applied
    /// to the `[rate_limit]` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting settings are inconsistent.
    pub(crate) fn harvest_config(&self) -> Result<HarvestConfig> {
        let mut rate_limit = self.rate_limit;
        if let Some(delay) = self.min_delay {
            rate_limit.min_delay = delay;
        }
        if let Some(delay) = self.max_delay {
            rate_limit.max_delay = delay;
        }
        let bounds_moved = self.min_delay.is_some() || self.max_delay.is_some();
        match self.base_delay {
            Some(delay) => rate_limit.base_delay = delay,
            // An implicit starting delay follows bounds moved on the command line
            None if bounds_moved && rate_limit.min_delay <= rate_limit.max_delay => {
                rate_limit.base_delay = rate_limit
                    .base_delay
                    .clamp(rate_limit.min_delay, rate_limit.max_delay);
            }
            None => {}
        }
        if self.jitter_seed.is_some() {
            rate_limit.jitter_seed = self.jitter_seed;
        }

        let config = HarvestConfig {
            max_results: self.max_results,
            max_workers: self.max_workers,
            max_retries: self.max_retries,
            checkpoint_interval: self.checkpoint_interval,
            checkpoint_max_age: Some(self.checkpoint_max_age).filter(|age| !age.is_zero()),
            charset: self.charset.clone(),
            boundary_policy: self.boundary_policy,
            max_prefix_len: self.max_prefix_len,
            shutdown_grace: self.shutdown_grace,
            rate_limit,
        };
        config.validate()?;
        Ok(config)
    }

    /// The HTTP client for the configured endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if no endpoint is configured, a header is invalid,
    /// or the client cannot be built.
    pub(crate) fn client(&self) -> Result<HttpClient> {
        let endpoint = self.endpoint.clone().ok_or_else(|| {
            anyhow!(
                "No endpoint given. Pass it as argument or set `endpoint` in `{HARVEST_CONFIG_FILE}`"
            )
        })?;

        ClientBuilder::builder()
            .endpoint(endpoint)
            .query_param(&self.query_param)
            .limit_param(&self.limit_param)
            .results_field(&self.results_field)
            .user_agent(&self.user_agent)
            .custom_headers(header_map(&self.header)?)
            .timeout(self.timeout)
            .build()
            .client()
            .context("Failed to create client")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            verbose: Verbosity::default(),
            no_progress: false,
            output: None,
            format: ReportFormat::default(),
            checkpoint: checkpoint(),
            no_resume: false,
            max_results: DEFAULT_MAX_RESULTS,
            max_workers: DEFAULT_MAX_WORKERS,
            max_retries: DEFAULT_MAX_RETRIES,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            checkpoint_max_age: DEFAULT_CHECKPOINT_MAX_AGE,
            charset: Charset::default(),
            boundary_policy: BoundaryPolicy::default(),
            max_prefix_len: DEFAULT_MAX_PREFIX_LEN,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            base_delay: None,
            min_delay: None,
            max_delay: None,
            jitter_seed: None,
            rate_limit: RateLimitConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: user_agent(),
            header: Vec::new(),
            query_param: query_param(),
            limit_param: limit_param(),
            results_field: results_field(),
            threads: None,
        }
    }
}
