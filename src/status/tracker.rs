//! Agent status tracking.
//!
//! An [`AgentStatusSource`] (in production a terminal pane scraper) reports
//! the current [`AgentStatus`] of a session whenever asked. The
//! [`StatusTracker`] polls it, remembers the last status per session and
//! publishes `agent.status-changed` only when that status differs from the
//! previous observation. The first observation of a session is a baseline
//! and publishes nothing.

use super::ProbeError;
use crate::bus::{AgentStatusChanged, EventBus, SessionDeleted};
use crate::pool::WorkerPool;
use crate::store::SessionStore;
use crate::{AgentStatus, Session, SessionState};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reports the agent status of one session.
#[async_trait]
pub trait AgentStatusSource: Send + Sync {
    /// Current status of the agent attached to `session`.
    async fn status(&self, session: &Session) -> Result<AgentStatus, ProbeError>;
}

type LastSeen = Arc<Mutex<HashMap<String, AgentStatus>>>;

/// Polls an [`AgentStatusSource`] and publishes transitions.
pub struct StatusTracker {
    store: Arc<dyn SessionStore>,
    source: Arc<dyn AgentStatusSource>,
    bus: EventBus,
    pool: WorkerPool,
    last: LastSeen,
}

impl std::fmt::Debug for StatusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusTracker")
            .field("tracked", &self.tracked())
            .finish()
    }
}

impl StatusTracker {
    /// Creates a tracker and subscribes it to `session.deleted` so deleted
    /// sessions are forgotten.
    pub fn new(
        store: Arc<dyn SessionStore>,
        source: Arc<dyn AgentStatusSource>,
        bus: EventBus,
        pool: WorkerPool,
    ) -> Self {
        let last: LastSeen = Arc::default();
        {
            let last = Arc::clone(&last);
            bus.subscribe(move |deleted: &SessionDeleted| {
                last.lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&deleted.session_id);
            });
        }
        Self {
            store,
            source,
            bus,
            pool,
            last,
        }
    }

    /// Number of sessions with a remembered status.
    pub fn tracked(&self) -> usize {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Last observed status of `session_id`.
    pub fn last_status(&self, session_id: &str) -> Option<AgentStatus> {
        self.last
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .copied()
    }

    /// Records `status` for `session`, publishing a change if it differs
    /// from the previous observation. Returns `true` if an event was
    /// published.
    pub fn observe(&self, session: &Session, status: AgentStatus) -> bool {
        let previous = self
            .last
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.id.clone(), status);
        match previous {
            Some(old_status) if old_status != status => {
                debug!(session = %session.id, old = %old_status, new = %status, "agent status changed");
                self.bus.publish(AgentStatusChanged {
                    session: session.clone(),
                    old_status,
                    new_status: status,
                });
                true
            }
            _ => false,
        }
    }

    /// Polls every non-corrupted session once. Returns how many changes
    /// were published.
    ///
    /// Sessions whose source call fails keep their previous status.
    /// Sessions no longer in the store are forgotten.
    pub async fn poll_once(&self, token: &CancellationToken) -> usize {
        let sessions = match self.store.list().await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "failed to list sessions for status poll");
                return 0;
            }
        };

        {
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            last.retain(|id, _| sessions.iter().any(|s| &s.id == id));
        }

        let polls = sessions
            .iter()
            .filter(|s| s.state != SessionState::Corrupted)
            .map(|session| async move {
                let status = self
                    .pool
                    .run_context(token, || self.source.status(session))
                    .await;
                (session, status)
            });

        let mut changed = 0;
        for (session, status) in join_all(polls).await {
            match status {
                Ok(Ok(status)) => {
                    if self.observe(session, status) {
                        changed += 1;
                    }
                }
                Ok(Err(e)) => debug!(session = %session.id, error = %e, "agent status probe failed"),
                Err(_) => {}
            }
        }
        changed
    }

    /// Polls every `interval` until `token` is cancelled.
    pub async fn run(&self, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval = ?interval, "agent status tracker started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_once(&token).await;
                }
            }
        }
        info!("agent status tracker stopped");
    }
}
