//! Session lifecycle service.
//!
//! Owns the policy that sits on top of the store: reuse a recycled clone
//! before cloning a fresh one, cap the recycle pool per remote, and announce
//! every mutation on the event bus.
//!
//! ```text
//!         create              recycle
//! (none) ───────► Active ───────────────► Recycled
//!                   ▲                        │
//!                   └──────── reuse ─────────┘
//!                 Active ── corrupt ──► Corrupted ── delete ──► (none)
//! ```

mod git;

pub use git::{Git, GitCli, GitError};

use crate::bus::{
    EventBus, SessionCorrupted, SessionCreated, SessionDeleted, SessionRecycled, SessionRenamed,
};
use crate::store::{recycled_for, SessionStore};
use crate::{slugify, Session, SessionState, StoreError};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

/// Errors returned by lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The store rejected or could not complete the operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A git operation on the clone failed.
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Recycle-pool and clone placement settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleOptions {
    /// Directory new clones are placed under.
    pub clone_dir: PathBuf,
    /// Maximum recycled sessions kept per remote; `0` means unlimited.
    pub max_recycled: usize,
}

/// Creates, recycles, renames, corrupts and deletes sessions.
///
/// Every mutation holds the claim lock, so a slow git call in one operation
/// cannot interleave with another mutation from this process.
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    git: Arc<dyn Git>,
    bus: EventBus,
    options: LifecycleOptions,
    claim: Mutex<()>,
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("options", &self.options)
            .field("bus", &self.bus)
            .finish()
    }
}

impl SessionService {
    /// Builds a service over the given store, git backend and bus.
    pub fn new(
        store: Arc<dyn SessionStore>,
        git: Arc<dyn Git>,
        bus: EventBus,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            store,
            git,
            bus,
            options,
            claim: Mutex::new(()),
        }
    }

    /// Settings in effect.
    pub fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    /// Returns every session in the store.
    pub async fn list(&self) -> Result<Vec<Session>, ServiceError> {
        Ok(self.store.list().await?)
    }

    /// Returns one session.
    pub async fn get(&self, id: &str) -> Result<Session, ServiceError> {
        Ok(self.store.get(id).await?)
    }

    /// Creates a session for `remote`.
    ///
    /// The oldest recycled clone for the remote is reused when one exists;
    /// otherwise a fresh clone is made under the clone directory. Publishes
    /// `session.created` either way.
    pub async fn create(&self, name: &str, remote: &str) -> Result<Session, ServiceError> {
        let _claim = self.claim.lock().await;

        let session = match self.store.find_recyclable(remote).await {
            Ok(mut session) => {
                session.transition(SessionState::Active)?;
                session.name = name.to_string();
                session.slug = slugify(name);
                self.store.save(&session).await?;
                info!(id = %session.id, remote, "reused recycled session");
                session
            }
            Err(StoreError::NoRecyclable(_)) => {
                let mut session = Session::new(name, remote, PathBuf::new());
                session.path = self
                    .options
                    .clone_dir
                    .join(format!("{}-{}", session.slug, session.id));
                self.git.clone_repo(remote, &session.path).await?;
                self.store.save(&session).await?;
                info!(id = %session.id, remote, path = %session.path.display(), "cloned new session");
                session
            }
            Err(e) => return Err(e.into()),
        };

        self.bus.publish(SessionCreated {
            session: session.clone(),
        });
        Ok(session)
    }

    /// Resets an active session's clone and returns it to the recycle pool.
    ///
    /// Afterwards the pool for the session's remote is pruned down to
    /// `max_recycled`, deleting the oldest excess clones. Pruning failures are
    /// logged; the recycle itself has already succeeded.
    pub async fn recycle(&self, id: &str) -> Result<Session, ServiceError> {
        let _claim = self.claim.lock().await;

        let session = self.store.get(id).await?;
        Self::check_transition(&session, SessionState::Recycled)?;
        self.git.reset(&session.path).await?;

        // The reset can be slow; another process may have moved the session.
        let mut session = self.store.get(id).await?;
        session.transition(SessionState::Recycled)?;
        self.store.save(&session).await?;
        info!(id = %session.id, remote = %session.remote, "session recycled");
        self.bus.publish(SessionRecycled {
            session: session.clone(),
        });

        if let Err(e) = self.prune_remote(&session.remote).await {
            warn!(remote = %session.remote, error = %e, "failed to prune recycle pool");
        }
        Ok(session)
    }

    /// Deletes a session and its clone. Publishes `session.deleted`.
    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        let _claim = self.claim.lock().await;
        let session = self.store.get(id).await?;
        self.remove(&session).await
    }

    /// Renames a session. Publishes `session.renamed` with the old name.
    pub async fn rename(&self, id: &str, new_name: &str) -> Result<Session, ServiceError> {
        let _claim = self.claim.lock().await;
        let mut session = self.store.get(id).await?;
        let old_name = std::mem::replace(&mut session.name, new_name.to_string());
        session.slug = slugify(new_name);
        session.touch();
        self.store.save(&session).await?;
        debug!(id = %session.id, old = %old_name, new = %new_name, "session renamed");
        self.bus.publish(SessionRenamed {
            session: session.clone(),
            old_name,
        });
        Ok(session)
    }

    /// Marks an active session as corrupted. Publishes `session.corrupted`.
    pub async fn mark_corrupted(&self, id: &str) -> Result<Session, ServiceError> {
        let _claim = self.claim.lock().await;
        let session = self.store.get(id).await?;
        self.corrupt(session).await
    }

    /// Validates an active session's clone and marks it corrupted if unusable.
    ///
    /// Returns `true` if the session was healthy. Sessions in other states are
    /// left alone.
    pub async fn check(&self, id: &str) -> Result<bool, ServiceError> {
        let _claim = self.claim.lock().await;
        let session = self.store.get(id).await?;
        if session.state != SessionState::Active || self.git.is_valid(&session.path).await {
            return Ok(true);
        }
        self.corrupt(session).await?;
        Ok(false)
    }

    /// Prunes the recycle pool of every remote. Returns the deleted IDs.
    pub async fn prune_all(&self) -> Result<Vec<String>, ServiceError> {
        let _claim = self.claim.lock().await;
        let remotes: BTreeSet<String> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|s| s.state == SessionState::Recycled)
            .map(|s| s.remote)
            .collect();
        let mut pruned = Vec::new();
        for remote in remotes {
            pruned.extend(self.prune_remote(&remote).await?);
        }
        Ok(pruned)
    }

    /// Deletes the oldest recycled sessions for `remote` beyond `max_recycled`.
    async fn prune_remote(&self, remote: &str) -> Result<Vec<String>, ServiceError> {
        if self.options.max_recycled == 0 {
            return Ok(Vec::new());
        }
        let sessions = self.store.list().await?;
        let recycled = recycled_for(&sessions, remote);
        let excess = recycled.len().saturating_sub(self.options.max_recycled);
        let mut pruned = Vec::with_capacity(excess);
        for session in recycled.into_iter().take(excess) {
            match self.remove(&session).await {
                Ok(()) => pruned.push(session.id),
                Err(e) => warn!(id = %session.id, error = %e, "failed to prune recycled session"),
            }
        }
        if !pruned.is_empty() {
            info!(remote, count = pruned.len(), "pruned recycled sessions");
        }
        Ok(pruned)
    }

    fn check_transition(session: &Session, next: SessionState) -> Result<(), StoreError> {
        if session.state.can_transition_to(next) {
            return Ok(());
        }
        Err(StoreError::InvalidTransition {
            id: session.id.clone(),
            from: session.state,
            to: next,
        })
    }

    async fn corrupt(&self, mut session: Session) -> Result<Session, ServiceError> {
        session.transition(SessionState::Corrupted)?;
        self.store.save(&session).await?;
        warn!(id = %session.id, path = %session.path.display(), "session marked corrupted");
        self.bus.publish(SessionCorrupted {
            session: session.clone(),
        });
        Ok(session)
    }

    async fn remove(&self, session: &Session) -> Result<(), ServiceError> {
        self.git.remove(&session.path).await?;
        self.store.delete(&session.id).await?;
        info!(id = %session.id, "session deleted");
        self.bus.publish(SessionDeleted {
            session_id: session.id.clone(),
        });
        Ok(())
    }
}
