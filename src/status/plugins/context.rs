//! Context window usage badge.
//!
//! Claude Code writes one JSONL transcript per conversation under
//! `<projects_dir>/<encoded project path>/`. The newest transcript's last
//! assistant turn carries a `usage` block; input plus cache tokens is how
//! much of the window the next turn starts with.

use crate::config::schema::ContextPluginConfig;
use crate::config::xdg;
use crate::status::{ProbeError, Status, StatusPlugin, StyleHint};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

/// Reports how full each session's context window is.
#[derive(Debug, Clone)]
pub struct ContextUsagePlugin {
    projects_dir: PathBuf,
    model_limit: u64,
    warn_threshold: f64,
    alert_threshold: f64,
}

impl ContextUsagePlugin {
    /// Name used as cache key prefix.
    pub const NAME: &'static str = "context";

    /// Creates the plugin.
    pub fn new(
        projects_dir: impl Into<PathBuf>,
        model_limit: u64,
        warn_threshold: f64,
        alert_threshold: f64,
    ) -> Self {
        Self {
            projects_dir: projects_dir.into(),
            model_limit: model_limit.max(1),
            warn_threshold,
            alert_threshold,
        }
    }

    /// Creates the plugin from its config section.
    pub fn from_config(config: &ContextPluginConfig) -> Self {
        Self::new(
            xdg::expand_tilde(&config.projects_dir),
            config.model_limit,
            config.warn_threshold,
            config.alert_threshold,
        )
    }

    /// Transcript folder for a session clone.
    pub fn transcript_dir(&self, session_path: &Path) -> PathBuf {
        self.projects_dir.join(encode_project_path(session_path))
    }
}

/// Encodes a project path the way Claude Code names its transcript folders.
fn encode_project_path(path: &Path) -> String {
    path.to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

async fn newest_transcript(dir: &Path) -> Result<PathBuf, ProbeError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ProbeError::Missing(dir.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let modified = entry.metadata().await?.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    newest
        .map(|(_, path)| path)
        .ok_or_else(|| ProbeError::Missing(format!("no transcript in {}", dir.display())))
}

/// Context tokens reported by the last usage record in a transcript.
fn last_context_tokens(transcript: &str) -> Option<u64> {
    transcript.lines().rev().find_map(|line| {
        let record: Value = serde_json::from_str(line).ok()?;
        let usage = record.pointer("/message/usage")?;
        let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0);
        usage.get("input_tokens")?;
        Some(
            field("input_tokens")
                + field("cache_creation_input_tokens")
                + field("cache_read_input_tokens"),
        )
    })
}

#[async_trait]
impl StatusPlugin for ContextUsagePlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn probe(
        &self,
        _token: &CancellationToken,
        _session_id: &str,
        path: &Path,
    ) -> Result<String, ProbeError> {
        let transcript = newest_transcript(&self.transcript_dir(path)).await?;
        let content = tokio::fs::read_to_string(&transcript).await?;
        last_context_tokens(&content)
            .map(|tokens| tokens.to_string())
            .ok_or_else(|| ProbeError::Parse(format!("no usage in {}", transcript.display())))
    }

    fn render(&self, value: &str) -> Option<Status> {
        let used: u64 = value.trim().parse().ok()?;
        let ratio = used as f64 / self.model_limit as f64;
        if ratio < self.warn_threshold {
            return None;
        }
        let style = if ratio >= self.alert_threshold {
            StyleHint::Alert
        } else {
            StyleHint::Warn
        };
        let percent = (ratio * 100.0).round() as u64;
        Some(Status::new(format!("{}%", percent), "ctx", style))
    }
}
