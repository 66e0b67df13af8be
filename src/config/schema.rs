//! TOML configuration schema types for hive.
//!
//! All structs derive `Deserialize` and `Serialize` with sensible defaults via
//! `#[serde(default)]`, so a partial (or empty) file is always valid TOML for
//! this schema. Duration fields hold human-readable strings (e.g. `"30s"`,
//! `"2s"`) and are parsed with `humantime` through the typed accessors, which
//! is also what [`Config::validate`] exercises.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::error::ConfigError;
use crate::config::xdg;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration encompassing all sections.
///
/// Corresponds to the full TOML file structure:
/// ```toml
/// [sessions]
/// [bus]
/// [status]
/// [plugins.context]
/// [[plugins.command]]
/// [log]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Clone placement and recycle-pool settings.
    pub sessions: SessionsConfig,
    /// Event bus settings.
    pub bus: BusConfig,
    /// Status probing, caching and agent polling.
    pub status: StatusConfig,
    /// Status plugin settings.
    pub plugins: PluginsConfig,
    /// Logging settings.
    pub log: LogConfig,
}

impl Config {
    /// Checks every field that can only be validated after parsing.
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.status.cache_ttl()?;
        if self.status.poll_interval()?.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "status.poll_interval",
                message: "must be greater than zero".to_string(),
            });
        }
        let ctx = &self.plugins.context;
        if !(0.0..=1.0).contains(&ctx.warn_threshold)
            || !(0.0..=1.0).contains(&ctx.alert_threshold)
        {
            return Err(ConfigError::InvalidValue {
                field: "plugins.context",
                message: "thresholds must be between 0.0 and 1.0".to_string(),
            });
        }
        if ctx.warn_threshold > ctx.alert_threshold {
            return Err(ConfigError::InvalidValue {
                field: "plugins.context",
                message: "warn_threshold must not exceed alert_threshold".to_string(),
            });
        }
        if ctx.model_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "plugins.context.model_limit",
                message: "must be greater than zero".to_string(),
            });
        }
        for cmd in &self.plugins.command {
            if cmd.name.is_empty() || cmd.command.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "plugins.command",
                    message: "every command plugin needs a name and a command".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Parses a humantime duration string, tagging failures with `field`.
pub fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Clone placement and recycling.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionsConfig {
    /// Directory new clones are created in. Empty means `<data_dir>/repos`.
    /// Tilde (~) is expanded.
    pub clone_dir: String,
    /// Maximum recycled sessions kept per remote. `0` keeps every one.
    pub max_recycled: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            clone_dir: String::new(),
            max_recycled: 5,
        }
    }
}

impl SessionsConfig {
    /// Resolves the clone directory against `data_dir`.
    pub fn clone_dir(&self, data_dir: &Path) -> PathBuf {
        if self.clone_dir.is_empty() {
            data_dir.join("repos")
        } else {
            xdg::expand_tilde(&self.clone_dir)
        }
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Event bus settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    /// Queue capacity. Events published while the queue is full are dropped.
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: crate::bus::DEFAULT_BUS_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Status probing and agent polling.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StatusConfig {
    /// Worker pool size for probes. Values `<= 0` fall back to 5.
    pub workers: i64,
    /// Time-to-live of cached probe results (e.g. `"30s"`).
    pub cache_ttl: String,
    /// Keep the cache on disk so separate processes share it.
    pub durable_cache: bool,
    /// Agent status polling interval (e.g. `"2s"`).
    pub poll_interval: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            workers: crate::pool::DEFAULT_WORKERS as i64,
            cache_ttl: "30s".to_string(),
            durable_cache: false,
            poll_interval: "2s".to_string(),
        }
    }
}

impl StatusConfig {
    /// Parsed `cache_ttl`.
    pub fn cache_ttl(&self) -> Result<Duration, ConfigError> {
        parse_duration("status.cache_ttl", &self.cache_ttl)
    }

    /// Parsed `poll_interval`.
    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration("status.poll_interval", &self.poll_interval)
    }
}

// ---------------------------------------------------------------------------
// Plugins
// ---------------------------------------------------------------------------

/// Status plugin configuration container.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PluginsConfig {
    /// Built-in context window usage plugin.
    pub context: ContextPluginConfig,
    /// User-defined shell command plugins.
    pub command: Vec<CommandPluginConfig>,
}

/// Context window usage plugin.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ContextPluginConfig {
    /// Whether the plugin is active.
    pub enabled: bool,
    /// Context window size in tokens.
    pub model_limit: u64,
    /// Usage ratio at which the badge appears as a warning.
    pub warn_threshold: f64,
    /// Usage ratio at which the badge turns into an alert.
    pub alert_threshold: f64,
    /// Directory holding per-project transcript folders.
    pub projects_dir: String,
}

impl Default for ContextPluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_limit: 200_000,
            warn_threshold: 0.60,
            alert_threshold: 0.80,
            projects_dir: "~/.claude/projects".to_string(),
        }
    }
}

/// A shell command whose first output line becomes a status badge.
///
/// Example TOML:
/// ```toml
/// [[plugins.command]]
/// name = "branch"
/// command = "git rev-parse --abbrev-ref HEAD"
/// timeout = 5
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CommandPluginConfig {
    /// Plugin name; also the cache key prefix.
    pub name: String,
    /// Shell command to execute via `sh -c` inside the session clone.
    pub command: String,
    /// Maximum seconds to wait before the command is killed.
    pub timeout: u64,
}

impl Default for CommandPluginConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            command: String::new(),
            timeout: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Logging verbosity. `HIVE_LOG` overrides it.
    pub level: LogLevel,
    /// Path to log file. Empty string means stderr.
    pub file: String,
}

/// Log verbosity levels (kebab-case in TOML).
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    /// Only errors.
    Error,
    /// Errors and warnings.
    Warn,
    /// Informational messages (default).
    #[default]
    Info,
    /// Debug-level detail.
    Debug,
    /// Full trace output.
    Trace,
}

impl LogLevel {
    /// Filter directive for this level.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
