//! Hive session fleet library
//!
//! This crate provides the coordination core for Hive: a fleet of reusable
//! git-clone sessions that host agent terminals. It contains the typed event
//! bus, the session lifecycle and recycling policy, the bounded worker pool,
//! the TTL status cache, the status aggregator and the notification router.
//!
//! Git, tmux and terminal scraping are reached through narrow traits
//! ([`service::Git`], [`status::tracker::AgentStatusSource`],
//! [`store::SessionStore`]) so that the core can be exercised in isolation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Application wiring: builds every component from a [`config::schema::Config`].
pub mod app;

/// Typed in-process publish/subscribe bus.
pub mod bus;

/// TTL status cache with ephemeral and durable backings.
pub mod cache;

/// Configuration loading and XDG path resolution.
pub mod config;

/// Tracing subscriber setup.
pub mod logging;

/// Notification router and persistence.
pub mod notify;

/// Bounded worker pool for subprocess-backed probes.
pub mod pool;

/// Session lifecycle service (create, recycle, delete, prune).
pub mod service;

/// Plugin status types, aggregation and agent status tracking.
pub mod status;

/// Session store contract and implementations.
pub mod store;

/// Lifecycle state of a session clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Clone is in use by an agent.
    Active,
    /// Clone has been reset and waits for reuse by a matching remote.
    Recycled,
    /// Clone failed validation and must be deleted.
    Corrupted,
}

impl SessionState {
    /// Returns `true` if moving from `self` to `next` is a legal transition.
    ///
    /// Legal edges are `Active <-> Recycled` and `Active -> Corrupted`.
    /// Deletion is not a state and is allowed from anywhere.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Active, SessionState::Recycled)
                | (SessionState::Recycled, SessionState::Active)
                | (SessionState::Active, SessionState::Corrupted)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Active => "active",
            SessionState::Recycled => "recycled",
            SessionState::Corrupted => "corrupted",
        };
        write!(f, "{}", s)
    }
}

/// Error type for parsing enums from strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStateError(pub String);

impl fmt::Display for ParseStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid state: {}", self.0)
    }
}

impl std::error::Error for ParseStateError {}

impl FromStr for SessionState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(SessionState::Active),
            "recycled" => Ok(SessionState::Recycled),
            "corrupted" => Ok(SessionState::Corrupted),
            _ => Err(ParseStateError(s.to_string())),
        }
    }
}

/// Agent status as reported by the terminal scraper for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentStatus {
    /// Agent is producing output.
    Active,
    /// Agent is blocked on a permission prompt.
    NeedsApproval,
    /// Agent is idle and waiting for input.
    Ready,
    /// Terminal pane for the session could not be found.
    Missing,
    /// Session has been recycled; no agent is expected.
    Recycled,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Active => "active",
            AgentStatus::NeedsApproval => "needs-approval",
            AgentStatus::Ready => "ready",
            AgentStatus::Missing => "missing",
            AgentStatus::Recycled => "recycled",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for AgentStatus {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AgentStatus::Active),
            "needs-approval" | "approval" => Ok(AgentStatus::NeedsApproval),
            "ready" => Ok(AgentStatus::Ready),
            "missing" => Ok(AgentStatus::Missing),
            "recycled" => Ok(AgentStatus::Recycled),
            _ => Err(ParseStateError(s.to_string())),
        }
    }
}

/// One isolated git clone tracked through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique, immutable identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Filesystem-safe form of the name.
    pub slug: String,
    /// Location of the clone on disk.
    pub path: PathBuf,
    /// Origin URL; the partition key for recycling.
    pub remote: String,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Free-form key/value metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// When the session was first created.
    pub created_at: DateTime<Utc>,
    /// Last lifecycle mutation (recycle, reuse, rename, corruption).
    pub updated_at: DateTime<Utc>,
    /// When the session last read its inbox, if ever.
    #[serde(default)]
    pub last_inbox_read: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates a new `Active` session with a fresh ID and both timestamps set to now.
    ///
    /// # Example
    ///
    /// ```
    /// use hive::{Session, SessionState};
    /// use std::path::PathBuf;
    ///
    /// let session = Session::new("Fix Login", "git@example.com:a/b.git", PathBuf::from("/tmp/b"));
    /// assert_eq!(session.state, SessionState::Active);
    /// assert_eq!(session.slug, "fix-login");
    /// assert_eq!(session.created_at, session.updated_at);
    /// ```
    pub fn new(name: impl Into<String>, remote: impl Into<String>, path: PathBuf) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: new_session_id(),
            slug: slugify(&name),
            name,
            path,
            remote: remote.into(),
            state: SessionState::Active,
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            last_inbox_read: None,
        }
    }

    /// Returns `true` if this session may be reused for `remote`.
    pub fn is_recyclable_for(&self, remote: &str) -> bool {
        self.state == SessionState::Recycled && self.remote == remote
    }

    /// Moves the session to `next`, bumping `updated_at`.
    ///
    /// Returns [`StoreError::InvalidTransition`] for edges outside the
    /// lifecycle state machine; the session is left untouched in that case.
    pub fn transition(&mut self, next: SessionState) -> Result<(), StoreError> {
        if !self.state.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                id: self.id.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.touch();
        Ok(())
    }

    /// Bumps `updated_at`, never moving it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// Generates a random session identifier (32 lowercase hex characters).
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Converts a display name into a lowercase, dash-separated slug.
///
/// Runs of characters outside `[a-z0-9]` collapse to one dash; leading and
/// trailing dashes are trimmed. An empty result becomes `"session"`.
///
/// ```
/// assert_eq!(hive::slugify("  Fix: Login / OAuth!! "), "fix-login-oauth");
/// assert_eq!(hive::slugify("***"), "session");
/// ```
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "session".to_string()
    } else {
        slug
    }
}

/// Errors that can occur during session store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Session was not found in the store.
    #[error("session not found: {0}")]
    NotFound(String),

    /// No recycled session exists for the requested remote.
    #[error("no recyclable session for remote: {0}")]
    NoRecyclable(String),

    /// A lifecycle edge outside the state machine was requested.
    #[error("session {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        /// Session being mutated.
        id: String,
        /// Current state.
        from: SessionState,
        /// Requested state.
        to: SessionState,
    },

    /// `updated_at` precedes `created_at`.
    #[error("session {0}: updated_at is earlier than created_at")]
    InvalidTimestamps(String),

    /// Backing file could not be read or written.
    #[error("session store I/O failed: {path}")]
    Io {
        /// File involved in the failure.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Backing file held invalid JSON, or a session could not be encoded.
    #[error("session store encoding failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests;
