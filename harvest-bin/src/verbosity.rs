//! A `--verbose`/`--quiet` flag pair for the CLI.
//!
//! Info messages are shown by default:
//! - `-q` only warnings, `-qq` only errors
//! - `-v` debug output, `-vv` trace output

use log::{Level, LevelFilter};
use serde::Deserialize;

/// Levels from quietest to loudest
const LEVELS: [Level; 5] = [
    Level::Error,
    Level::Warn,
    Level::Info,
    Level::Debug,
    Level::Trace,
];

/// Position of [`Level::Info`] in [`LEVELS`]
const DEFAULT_LEVEL: usize = 2;

#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Verbosity {
    /// More output per occurrence
    ///
    /// By default, harvest reports progress at info level. Passing `-v`
    /// enables debug logging for every query, `-vv` trace.
    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet",
    )]
    verbose: u8,

    /// Less output per occurrence
    #[arg(
        long,
        short = 'q',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "verbose",
    )]
    quiet: u8,
}

impl Verbosity {
    pub(crate) fn log_level(&self) -> Level {
        let index = (DEFAULT_LEVEL + usize::from(self.verbose))
            .saturating_sub(usize::from(self.quiet))
            .min(LEVELS.len() - 1);
        LEVELS[index]
    }

    pub(crate) fn log_level_filter(&self) -> LevelFilter {
        self.log_level().to_level_filter()
    }
}

// In the configuration file, verbosity is a level name such as "warn"
impl<'de> Deserialize<'de> for Verbosity {
    #[allow(clippy::cast_possible_truncation)]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        let canonical = if name.eq_ignore_ascii_case("warning") {
            "warn"
        } else {
            name.as_str()
        };
        let index = canonical
            .parse::<Level>()
            .ok()
            .and_then(|level| LEVELS.iter().position(|l| *l == level))
            .ok_or_else(|| serde::de::Error::custom(format!("unknown log level `{name}`")))?;

        Ok(Verbosity {
            verbose: index.saturating_sub(DEFAULT_LEVEL) as u8,
            quiet: DEFAULT_LEVEL.saturating_sub(index) as u8,
        })
    }
}
