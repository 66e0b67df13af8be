//! Default configuration template and file creation utilities.
//!
//! Provides a commented TOML template that matches `Config::default()` and a
//! function to write it out for `hive config init`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::error::ConfigError;
use crate::config::xdg;

/// A commented TOML template with all default values.
///
/// Every value here must match `Config::default()` from `schema.rs`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Hive Configuration
#
# All values shown below are the built-in defaults.
#
# Location: $XDG_CONFIG_HOME/hive/config.toml

# ==============================================================================
# Sessions
# ==============================================================================

[sessions]

# Directory new clones are created in. Empty means "<data dir>/repos".
clone_dir = ""

# Recycled clones kept per remote before the oldest are deleted.
# 0 keeps every recycled clone.
max_recycled = 5

# ==============================================================================
# Event bus
# ==============================================================================

[bus]

# Queue capacity. Events published while the queue is full are dropped.
capacity = 64

# ==============================================================================
# Status
# ==============================================================================

[status]

# Concurrent status probes. Values <= 0 fall back to 5.
workers = 5

# How long a probe result is reused. Examples: "10s", "30s", "2m"
cache_ttl = "30s"

# Keep probe results on disk so every hive process shares them.
durable_cache = false

# How often agent status is polled.
poll_interval = "2s"

# ==============================================================================
# Plugins
# ==============================================================================

[plugins.context]

# Show context window usage per session.
enabled = true
model_limit = 200000
warn_threshold = 0.6
alert_threshold = 0.8
projects_dir = "~/.claude/projects"

# Shell command plugins. The first line of stdout becomes the badge.
# [[plugins.command]]
# name = "branch"
# command = "git rev-parse --abbrev-ref HEAD"
# timeout = 5

# ==============================================================================
# Logging
# ==============================================================================

[log]

# Options: "error", "warn", "info", "debug", "trace". HIVE_LOG overrides it.
level = "info"

# Path to log file. Empty string means log to stderr.
file = ""
"#;

/// Writes the default template to `path`.
///
/// - If the file exists and `force` is `false`, returns `ConfigError::AlreadyExists`.
/// - If the file exists and `force` is `true`, backs it up to `.toml.backup` first.
pub fn create_default_config(path: &Path, force: bool) -> Result<PathBuf, ConfigError> {
    if path.exists() {
        if !force {
            return Err(ConfigError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        let backup_path = path.with_extension("toml.backup");
        fs::rename(path, &backup_path).map_err(|e| ConfigError::WriteError {
            path: backup_path.clone(),
            source: e,
        })?;
        tracing::info!("Backed up existing config to {}", backup_path.display());
    }

    let write_err = |source| ConfigError::WriteError {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        xdg::ensure_dir(parent).map_err(write_err)?;
    }
    fs::write(path, DEFAULT_CONFIG_TEMPLATE).map_err(write_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(write_err)?;
    }

    Ok(path.to_path_buf())
}
