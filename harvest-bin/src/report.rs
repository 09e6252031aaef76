//! Output of a finished harvest: the summary report and the names.

use std::{
    collections::BTreeSet,
    fmt::{self, Display},
    io::Write,
    path::Path,
    time::Duration,
};

use anyhow::{Context, Result};
use harvest_lib::{Completion, HarvestReport};
use serde::Serialize;

use crate::{
    color::{BOLD_GREEN, BOLD_PINK, BOLD_YELLOW, DIM, color},
    options::ReportFormat,
};

/// Number of failed prefixes listed in the compact report
const MAX_LISTED_FAILURES: usize = 10;

struct CompactReport<'a>(&'a HarvestReport);

impl Display for CompactReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        let stats = &report.stats;

        match report.completion {
            Completion::Complete => color!(f, BOLD_GREEN, "✅ Complete:",)?,
            Completion::Interrupted => color!(f, BOLD_YELLOW, "⏸  Interrupted:",)?,
        }
        write!(
            f,
            " {} names from {} queries",
            report.discovered.len(),
            stats.total_queries
        )?;
        let elapsed = Duration::from_secs(report.elapsed.as_secs());
        color!(f, DIM, " (in {})\n", humantime::format_duration(elapsed))?;

        writeln!(
            f,
            "   {:.2} names per query, {} rate limited ({:.1}%), {} transient, {} malformed, {} retries",
            stats.names_per_query(),
            stats.rate_limited,
            stats.rate_limited_percent(),
            stats.transient,
            stats.malformed,
            stats.retries,
        )?;
        writeln!(
            f,
            "   Final delay {}",
            humantime::format_duration(report.rate_state.current_delay)
        )?;

        if !stats.by_length.is_empty() {
            color!(f, DIM, "   length  queries  truncated  new names\n",)?;
            for (length, counts) in &stats.by_length {
                writeln!(
                    f,
                    "   {length:>6}  {:>7}  {:>9}  {:>9}",
                    counts.queries, counts.truncated, counts.discoveries
                )?;
            }
        }

        if !stats.unknown_chars.is_empty() {
            let chars: String = stats.unknown_chars.iter().collect();
            color!(
                f,
                BOLD_YELLOW,
                "   Names contain characters outside the charset: {:?}\n",
                chars
            )?;
        }

        if !report.failed.is_empty() {
            color!(
                f,
                BOLD_PINK,
                "   🚫 {} prefixes failed, names below them may be missing\n",
                report.failed.len()
            )?;
            for failed in report.failed.iter().take(MAX_LISTED_FAILURES) {
                writeln!(f, "      {}: {}", failed.prefix, failed.reason)?;
            }
            if report.failed.len() > MAX_LISTED_FAILURES {
                writeln!(
                    f,
                    "      ... and {} more",
                    report.failed.len() - MAX_LISTED_FAILURES
                )?;
            }
        }

        if report.completion == Completion::Interrupted {
            write!(
                f,
                "   {} prefixes left to explore. Run again to resume",
                stats.frontier_size
            )?;
            if let Some(version) = report.checkpoint_version {
                write!(f, " from checkpoint {version}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Write the final report in the requested format
pub(crate) fn write_report(
    report: &HarvestReport,
    format: ReportFormat,
    out: &mut dyn Write,
) -> Result<()> {
    match format {
        ReportFormat::Compact => write!(out, "{}", CompactReport(report))?,
        ReportFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(report)?)?,
    }
    Ok(())
}

/// Layout of the results file
#[derive(Serialize)]
struct ResultsFile<'a> {
    total_requests: u64,
    total_names: usize,
    names: &'a BTreeSet<String>,
}

/// Write the discovered names as JSON, replacing `path` atomically
pub(crate) fn write_results(report: &HarvestReport, path: &Path) -> Result<()> {
    let results = ResultsFile {
        total_requests: report.stats.total_queries,
        total_names: report.discovered.len(),
        names: &report.discovered,
    };
    let json = serde_json::to_vec_pretty(&results)?;
    harvest_lib::write_atomic(path, &json)
        .with_context(|| format!("Cannot write results to `{}`", path.display()))
}

/// Print one name per line
pub(crate) fn write_names(report: &HarvestReport, out: &mut dyn Write) -> Result<()> {
    for name in &report.discovered {
        writeln!(out, "{name}")?;
    }
    Ok(())
}
