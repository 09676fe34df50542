//! Logger factory.
//!
//! Honors the `--debug`/`--pretty` toggles the same way the original's
//! zerolog-based factory did: debug raises the level, pretty swaps the
//! formatter. Built on `env_logger`/`log`, the corpus's usual stack, rather
//! than pulling in a separate structured-logging crate for two knobs.

use std::io::Write;

use crate::config::LoggingConfig;

/// Installs the global logger. Safe to call once per process; a second call
/// returns an error rather than panicking, matching `env_logger`'s own
/// fallible `try_init`.
pub fn init(opts: &LoggingConfig) -> Result<(), log::SetLoggerError> {
    let level = if opts.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);

    if opts.pretty {
        builder.format_timestamp_secs();
    } else {
        // Compact, grep-friendly key=value lines instead of env_logger's
        // default human-oriented layout.
        builder.format(|buf, record| {
            writeln!(
                buf,
                "level={} target={} msg={}",
                record.level(),
                record.target(),
                record.args()
            )
        });
    }

    builder.try_init()
}
