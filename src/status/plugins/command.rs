//! Shell command badge.
//!
//! Runs a configured command with `sh -c` inside the session clone. The
//! first non-empty line of stdout is the badge label. The command is killed
//! if it outlives its timeout or the refresh is cancelled.

use crate::config::schema::CommandPluginConfig;
use crate::status::{ProbeError, Status, StatusPlugin, StyleHint};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// A status plugin backed by a shell command.
#[derive(Debug, Clone)]
pub struct CommandPlugin {
    name: String,
    command: String,
    timeout: Duration,
}

impl CommandPlugin {
    /// Creates the plugin.
    pub fn new(name: impl Into<String>, command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            timeout,
        }
    }

    /// Creates the plugin from a `[[plugins.command]]` entry.
    pub fn from_config(config: &CommandPluginConfig) -> Self {
        Self::new(
            &config.name,
            &config.command,
            Duration::from_secs(config.timeout),
        )
    }
}

#[async_trait]
impl StatusPlugin for CommandPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(
        &self,
        token: &CancellationToken,
        session_id: &str,
        path: &Path,
    ) -> Result<String, ProbeError> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(path)
            .env("HIVE_SESSION_ID", session_id)
            .env("HIVE_SESSION_PATH", path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            _ = token.cancelled() => return Err(ProbeError::Cancelled),
            out = tokio::time::timeout(self.timeout, child) => match out {
                Ok(out) => out?,
                Err(_) => return Err(ProbeError::Timeout(self.timeout)),
            },
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ProbeError::Command(format!(
                "{} exited with {}: {}",
                self.name, output.status, stderr
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string())
    }

    fn render(&self, value: &str) -> Option<Status> {
        if value.is_empty() {
            return None;
        }
        Some(Status::new(value, "", StyleHint::Plain))
    }
}
