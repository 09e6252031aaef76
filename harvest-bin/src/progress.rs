use std::{sync::LazyLock, time::Duration};

use harvest_lib::Monitor;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use tokio::task::JoinHandle;

const TEMPLATE: &str = "{spinner:.162} {elapsed_precise:.238} {wide_msg}";

/// How often the spinner message is refreshed
const BAR_REFRESH: Duration = Duration::from_millis(250);

/// How often progress is logged when the spinner is hidden
const LOG_INTERVAL: Duration = Duration::from_secs(30);

static STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::with_template(TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_spinner())
});

/// Reports progress of a running harvest on stderr.
///
/// Shows a spinner with live counters, or logs them periodically when
/// the spinner is hidden.
pub(crate) struct Progress {
    bar: Option<ProgressBar>,
    task: JoinHandle<()>,
}

impl Progress {
    pub(crate) fn start(monitor: Monitor, hide_bar: bool) -> Self {
        let bar = (!hide_bar).then(|| {
            let bar = ProgressBar::new_spinner().with_style(STYLE.clone());
            bar.set_message(status_line(&monitor));
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        });
        let interval = if bar.is_some() {
            BAR_REFRESH
        } else {
            LOG_INTERVAL
        };
        let task = tokio::spawn(report(monitor, bar.clone(), interval));
        Progress { bar, task }
    }

    pub(crate) fn finish(self) {
        self.task.abort();
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

async fn report(monitor: Monitor, bar: Option<ProgressBar>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let line = status_line(&monitor);
        match &bar {
            Some(bar) => bar.set_message(line),
            None => info!("{line}"),
        }
    }
}

fn status_line(monitor: &Monitor) -> String {
    let stats = monitor.stats();
    format!(
        "{} names, {} queries ({:.1}% rate limited), {} queued, {} in flight, delay {}",
        monitor.discovered(),
        stats.total_queries,
        stats.rate_limited_percent(),
        monitor.queued(),
        monitor.in_flight(),
        humantime::format_duration(monitor.current_delay())
    )
}
