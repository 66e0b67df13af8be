//! Session store contract and implementations.
//!
//! The store is the only authority on durable session state; everything the
//! rest of the crate holds is a transient copy. Two implementations are
//! provided:
//!
//! - [`MemoryStore`]: `Arc<RwLock<HashMap>>`, used by tests and short-lived tools.
//! - [`JsonFileStore`]: a single JSON document in the data directory, shared
//!   by every CLI invocation pointed at that directory.
//!
//! Both pick recyclable sessions FIFO: among `Recycled` sessions for a remote,
//! the one with the oldest `updated_at` is handed out first, so no clone sits
//! in the pool forever while fresher ones are reused ahead of it.

use crate::{Session, SessionState, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

mod file;

pub use file::JsonFileStore;

#[cfg(test)]
mod tests;

/// Operations the lifecycle core needs from durable storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns every session, oldest first.
    async fn list(&self) -> Result<Vec<Session>, StoreError>;

    /// Returns the session with `id`, or [`StoreError::NotFound`].
    async fn get(&self, id: &str) -> Result<Session, StoreError>;

    /// Inserts or replaces the session keyed by its ID.
    async fn save(&self, session: &Session) -> Result<(), StoreError>;

    /// Removes the session with `id`, or fails with [`StoreError::NotFound`].
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Returns the least recently updated `Recycled` session for `remote`,
    /// or [`StoreError::NoRecyclable`].
    async fn find_recyclable(&self, remote: &str) -> Result<Session, StoreError>;
}

/// Picks the FIFO recycle candidate for `remote`.
///
/// Ties on `updated_at` break on `id` so the choice is deterministic.
pub(crate) fn oldest_recyclable<'a>(
    sessions: impl IntoIterator<Item = &'a Session>,
    remote: &str,
) -> Option<&'a Session> {
    sessions
        .into_iter()
        .filter(|s| s.is_recyclable_for(remote))
        .min_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)))
}

/// Rejects sessions whose timestamps are out of order.
pub(crate) fn validate(session: &Session) -> Result<(), StoreError> {
    if session.updated_at < session.created_at {
        return Err(StoreError::InvalidTimestamps(session.id.clone()));
    }
    Ok(())
}

/// Sorts sessions oldest first, breaking ties on ID.
pub(crate) fn sort_sessions(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Returns recycled sessions for `remote`, oldest `updated_at` first.
pub fn recycled_for(sessions: &[Session], remote: &str) -> Vec<Session> {
    let mut recycled: Vec<Session> = sessions
        .iter()
        .filter(|s| s.state == SessionState::Recycled && s.remote == remote)
        .cloned()
        .collect();
    recycled.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)));
    recycled
}

/// Thread-safe in-memory store wrapping a `HashMap` with `Arc<RwLock>`.
///
/// Clones share the same map.
///
/// # Example
///
/// ```
/// use hive::store::{MemoryStore, SessionStore};
/// use hive::Session;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() {
///     let store = MemoryStore::new();
///     let session = Session::new("a", "git@example.com:o/r.git", PathBuf::from("/tmp/a"));
///     store.save(&session).await.expect("save");
///     assert_eq!(store.get(&session.id).await.expect("get"), session);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if the store holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn list(&self) -> Result<Vec<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<Session> = sessions.values().cloned().collect();
        sort_sessions(&mut all);
        Ok(all)
    }

    async fn get(&self, id: &str) -> Result<Session, StoreError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        validate(session)?;
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn find_recyclable(&self, remote: &str) -> Result<Session, StoreError> {
        let sessions = self.sessions.read().await;
        oldest_recyclable(sessions.values(), remote)
            .cloned()
            .ok_or_else(|| StoreError::NoRecyclable(remote.to_string()))
    }
}
