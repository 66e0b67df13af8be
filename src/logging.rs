//! Logging initialization for hive.
//!
//! Configures the `tracing` subscriber with level filtering via the `HIVE_LOG`
//! environment variable. Falls back to the configured `[log] level` when the
//! variable is unset or invalid.
//!
//! # Usage
//!
//! ```bash
//! # Configured level (info by default)
//! hive watch
//!
//! # Debug level
//! HIVE_LOG=debug hive watch
//!
//! # Module-specific filtering
//! HIVE_LOG=hive::bus=trace,warn hive watch
//! ```

use crate::config::schema::{LogConfig, LogLevel};
use crate::config::xdg;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "HIVE_LOG";

/// Builds the filter: `HIVE_LOG` if it parses, otherwise `fallback`.
pub fn filter(fallback: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback.as_str()))
}

/// Initialize the tracing subscriber.
///
/// Output goes to stderr unless `config.file` names a log file, which is
/// opened in append mode. Calling this more than once is harmless; later
/// calls leave the first subscriber in place.
///
/// # Errors
///
/// Returns the I/O error if the log file cannot be opened.
pub fn init(config: &LogConfig) -> std::io::Result<()> {
    let builder = fmt()
        .with_env_filter(filter(config.level))
        .with_target(false);

    if config.file.is_empty() {
        let _ = builder.with_writer(std::io::stderr).try_init();
    } else {
        let path = xdg::expand_tilde(&config.file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let _ = builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init();
    }
    Ok(())
}
