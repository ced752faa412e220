//! Minimal stderr backend for the `log` facade used throughout the crate.

use log::{LevelFilter, Log, Metadata, Record};

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level() && metadata.target().starts_with("folio")
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}", format_record(record));
        }
    }

    fn flush(&self) {}
}

fn format_record(record: &Record) -> String {
    match record.level() {
        log::Level::Info => format!("{}", record.args()),
        level => format!("{}: {}", level.as_str().to_lowercase(), record.args()),
    }
}

/// Level for the CLI's --quiet / --verbose flags.
pub fn level_for(quiet: bool, verbose: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, true) => LevelFilter::Debug,
        (false, false) => LevelFilter::Warn,
    }
}

/// Install the stderr logger. A second call only adjusts the level.
pub fn init(level: LevelFilter) {
    // set_logger fails only when a logger is already installed.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}
