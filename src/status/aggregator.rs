//! Concurrent status refresh across a batch of sessions.
//!
//! Every session gets its own task, so the number of sessions a caller is
//! interested in never limits throughput. Probe execution is what costs, and
//! that goes through the shared [`WorkerPool`]: at most `K` probes run at
//! once no matter how many tasks are waiting. A cache hit skips the pool
//! entirely.

use super::{Status, StatusPlugin};
use crate::cache::{cache_key, StatusCache};
use crate::pool::{PoolError, WorkerPool};
use crate::Session;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Runs status plugins over sessions with caching and bounded concurrency.
#[derive(Clone)]
pub struct StatusAggregator {
    pool: WorkerPool,
    cache: Option<Arc<dyn StatusCache>>,
}

impl std::fmt::Debug for StatusAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusAggregator")
            .field("pool", &self.pool)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl StatusAggregator {
    /// Creates an aggregator. A `None` cache disables memoization.
    pub fn new(pool: WorkerPool, cache: Option<Arc<dyn StatusCache>>) -> Self {
        Self { pool, cache }
    }

    /// The pool probes run on.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Produces `session ID -> Status` for one plugin.
    ///
    /// Sessions whose probe fails, is cancelled or renders to nothing are
    /// left out of the map. The only error is a pool that is already closed,
    /// detected before any work starts.
    pub async fn refresh_status(
        &self,
        token: &CancellationToken,
        sessions: &[Session],
        plugin: Arc<dyn StatusPlugin>,
    ) -> Result<HashMap<String, Status>, PoolError> {
        if self.pool.is_closed() {
            return Err(PoolError::Closed);
        }

        let mut tasks = JoinSet::new();
        for session in sessions {
            let pool = self.pool.clone();
            let cache = self.cache.clone();
            let plugin = Arc::clone(&plugin);
            let token = token.clone();
            let id = session.id.clone();
            let path = session.path.clone();
            tasks.spawn(async move {
                let key = cache_key(plugin.name(), &id);
                let value = match cached(cache.as_ref(), &key).await {
                    Some(value) => {
                        trace!(key = %key, "status cache hit");
                        value
                    }
                    None => {
                        let probed = pool
                            .run_context(&token, || plugin.probe(&token, &id, &path))
                            .await;
                        match probed {
                            Ok(Ok(value)) => {
                                if let Some(cache) = &cache {
                                    remember(Arc::clone(cache), key, value.clone(), plugin.ttl())
                                        .await;
                                }
                                value
                            }
                            Ok(Err(e)) => {
                                debug!(plugin = plugin.name(), session = %id, error = %e, "probe failed");
                                return None;
                            }
                            Err(e) => {
                                debug!(plugin = plugin.name(), session = %id, error = %e, "probe skipped");
                                return None;
                            }
                        }
                    }
                };
                plugin.render(&value).map(|status| (id, status))
            });
        }

        let mut statuses = HashMap::with_capacity(sessions.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some((id, status))) => {
                    statuses.insert(id, status);
                }
                Ok(None) => {}
                Err(e) => warn!(plugin = plugin.name(), error = %e, "status task failed"),
            }
        }
        Ok(statuses)
    }

    /// Drops expired cache entries. Returns how many were removed.
    pub async fn purge_cache(&self) -> usize {
        let Some(cache) = self.cache.clone() else {
            return 0;
        };
        match tokio::task::spawn_blocking(move || cache.purge_expired()).await {
            Ok(removed) => {
                if removed > 0 {
                    debug!(removed, "purged expired status cache entries");
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, "status cache purge failed");
                0
            }
        }
    }

    /// Runs [`refresh_status`](Self::refresh_status) for every plugin,
    /// keyed by plugin name.
    pub async fn refresh_all(
        &self,
        token: &CancellationToken,
        sessions: &[Session],
        plugins: &[Arc<dyn StatusPlugin>],
    ) -> Result<HashMap<String, HashMap<String, Status>>, PoolError> {
        let mut all = HashMap::with_capacity(plugins.len());
        for plugin in plugins {
            let statuses = self
                .refresh_status(token, sessions, Arc::clone(plugin))
                .await?;
            all.insert(plugin.name().to_string(), statuses);
        }
        Ok(all)
    }
}

async fn cached(cache: Option<&Arc<dyn StatusCache>>, key: &str) -> Option<String> {
    let cache = Arc::clone(cache?);
    let key = key.to_string();
    match tokio::task::spawn_blocking(move || cache.get(&key)).await {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "status cache read failed");
            None
        }
    }
}

async fn remember(cache: Arc<dyn StatusCache>, key: String, value: String, ttl: Option<Duration>) {
    let written = tokio::task::spawn_blocking(move || match ttl {
        Some(ttl) => cache.set_ttl(&key, value, ttl),
        None => cache.set(&key, value),
    })
    .await;
    if let Err(e) = written {
        warn!(error = %e, "status cache write failed");
    }
}
