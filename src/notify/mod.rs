//! User-facing notifications.
//!
//! The [`NotificationRouter`] subscribes to the domain events that deserve
//! the user's attention and republishes them as `notification.published`.
//! Anything it does not map stays silent. An optional
//! [`NotificationStore`] persists each notification before it is fanned out.

mod router;

pub use router::{install_log_sink, notification_for, NotificationRouter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Routine lifecycle information.
    Info,
    /// Something the user probably wants to look at.
    Warning,
    /// An operation failed.
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// A notification as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Assigned by the store on save; empty until then.
    pub id: String,
    /// Severity.
    pub level: Level,
    /// Rendered text.
    pub message: String,
    /// When the router produced it.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Creates an unsaved notification stamped with the current time.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// Errors raised by notification persistence.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The backing store rejected the write.
    #[error("failed to persist notification: {0}")]
    Persist(String),
}

/// Persistence for notifications.
///
/// Called from inside the bus dispatch loop, so implementations must be
/// quick and must not block on the bus.
pub trait NotificationStore: Send + Sync {
    /// Saves `notification`, returning it with its assigned ID.
    fn save(&self, notification: Notification) -> Result<Notification, NotifyError>;

    /// Returns the most recent `limit` notifications, newest first.
    fn recent(&self, limit: usize) -> Vec<Notification>;
}

/// In-memory notification store with sequential IDs.
#[derive(Debug, Default)]
pub struct MemoryNotificationStore {
    inner: Mutex<Vec<Notification>>,
}

impl MemoryNotificationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored notifications.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns `true` if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationStore for MemoryNotificationStore {
    fn save(&self, mut notification: Notification) -> Result<Notification, NotifyError> {
        let mut all = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        notification.id = format!("n{}", all.len() + 1);
        all.push(notification.clone());
        Ok(notification)
    }

    fn recent(&self, limit: usize) -> Vec<Notification> {
        let all = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        all.iter().rev().take(limit).cloned().collect()
    }
}
