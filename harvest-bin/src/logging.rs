use std::io::Write;

use env_logger::{Builder, Env};
use log::LevelFilter;

use crate::{color::color_for_level, verbosity::Verbosity};

/// Initialize the logging system with the given verbosity level.
///
/// Output goes to stderr, so that discovered names on stdout stay clean.
pub(crate) fn init_logging(verbose: &Verbosity) {
    // Everything outside of harvest only reports warnings.
    // RUST_LOG overrides all of this.
    let env = Env::default().filter_or("RUST_LOG", "warn");

    let mut builder = Builder::from_env(env);
    builder
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false);

    if std::env::var("RUST_LOG").is_err() {
        let level_filter = verbose.log_level_filter();
        builder
            .filter_level(LevelFilter::Warn)
            .filter_module("harvest", level_filter)
            .filter_module("harvest_lib", level_filter);
    }

    builder.format(|buf, record| {
        let level = record.level();
        let tag = color_for_level(level).apply_to(format!("[{level}]"));
        writeln!(buf, "{tag} {}", record.args())
    });

    builder.init();
}
