//! Per-session status badges and agent status tracking.
//!
//! A [`StatusPlugin`] knows how to probe one external integration for one
//! session and how to render the raw probe value. The
//! [`aggregator::StatusAggregator`] runs a plugin across a batch of sessions
//! through the cache and the worker pool. The [`tracker::StatusTracker`]
//! watches agent terminals and publishes `agent.status-changed` on
//! transitions.

pub mod aggregator;
pub mod plugins;
pub mod tracker;

#[cfg(test)]
mod tests;

pub use aggregator::StatusAggregator;
pub use tracker::{AgentStatusSource, StatusTracker};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Rendering hint for a status badge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleHint {
    /// No emphasis.
    #[default]
    Plain,
    /// Worth a glance.
    Warn,
    /// Needs attention.
    Alert,
}

/// Display-ready summary of one plugin's view of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Badge text.
    pub label: String,
    /// Short glyph shown before the label; may be empty.
    pub icon: String,
    /// Rendering hint.
    pub style: StyleHint,
}

impl Status {
    /// Builds a status badge.
    pub fn new(label: impl Into<String>, icon: impl Into<String>, style: StyleHint) -> Self {
        Self {
            label: label.into(),
            icon: icon.into(),
            style,
        }
    }
}

/// Reasons a probe produced no value.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The probe command ran and failed.
    #[error("probe command failed: {0}")]
    Command(String),

    /// The probe output could not be understood.
    #[error("unparseable probe output: {0}")]
    Parse(String),

    /// Something the probe depends on does not exist.
    #[error("probe dependency missing: {0}")]
    Missing(String),

    /// The probe did not finish in time.
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    /// The probe was cancelled.
    #[error("probe cancelled")]
    Cancelled,

    /// Filesystem or process I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An external integration that yields one status value per session.
#[async_trait]
pub trait StatusPlugin: Send + Sync {
    /// Stable name, used as the cache key prefix.
    fn name(&self) -> &str;

    /// Computes the raw value for one session.
    ///
    /// Only ever called while holding a worker pool slot.
    async fn probe(
        &self,
        token: &CancellationToken,
        session_id: &str,
        path: &Path,
    ) -> Result<String, ProbeError>;

    /// Turns a raw value into a badge. `None` means nothing to show.
    fn render(&self, value: &str) -> Option<Status>;

    /// Cache lifetime for this plugin's values; `None` uses the cache default.
    fn ttl(&self) -> Option<Duration> {
        None
    }
}
