//! Application wiring.
//!
//! [`App`] builds every component from a [`Config`] and a data directory and
//! hands each one the same [`EventBus`]. Nothing here is global: the binary
//! owns one `App`, starts it with a cancellation token and cancels that token
//! on shutdown.

use crate::bus::{ConfigReloaded, EventBus, BusError};
use crate::cache;
use crate::config::{schema::Config, ConfigError, ConfigLoader};
use crate::notify::{install_log_sink, MemoryNotificationStore, NotificationRouter};
use crate::pool::WorkerPool;
use crate::service::{GitCli, LifecycleOptions, SessionService};
use crate::status::{plugins, AgentStatusSource, Status, StatusAggregator, StatusPlugin, StatusTracker};
use crate::store::{JsonFileStore, SessionStore};
use crate::SessionState;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors raised while building or running the application.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The data directory or cache could not be prepared.
    #[error("failed to prepare {}", path.display())]
    Io {
        /// Path being prepared.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The event bus refused to start.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// A dispatch loop started for one short-lived command.
#[derive(Debug)]
pub struct Dispatch {
    bus: EventBus,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Dispatch {
    /// Delivers every queued event, then stops the loop.
    pub async fn finish(self) {
        self.bus.flush().await;
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "event bus task failed");
        }
    }
}

/// The assembled application.
pub struct App {
    config: RwLock<Config>,
    data_dir: PathBuf,
    bus: EventBus,
    store: Arc<dyn SessionStore>,
    service: Arc<SessionService>,
    notifications: Arc<MemoryNotificationStore>,
    aggregator: StatusAggregator,
    plugins: Vec<Arc<dyn StatusPlugin>>,
    tracker: Option<Arc<StatusTracker>>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("data_dir", &self.data_dir)
            .field("bus", &self.bus)
            .field("plugins", &self.plugins.len())
            .field("tracking", &self.tracker.is_some())
            .finish()
    }
}

impl App {
    /// Builds the application with the JSON file store and `git` on `PATH`.
    pub fn new(config: Config, data_dir: &Path) -> Result<Self, AppError> {
        config.validate()?;
        crate::config::xdg::ensure_dir(data_dir).map_err(|source| AppError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;
        let store: Arc<dyn SessionStore> = Arc::new(JsonFileStore::in_dir(data_dir));
        Self::with_store(config, data_dir, store)
    }

    /// Builds the application over an explicit session store.
    pub fn with_store(
        config: Config,
        data_dir: &Path,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, AppError> {
        let bus = EventBus::new(config.bus.capacity).with_log_hooks();

        let notifications = Arc::new(MemoryNotificationStore::new());
        NotificationRouter::register(&bus, Some(notifications.clone()));
        install_log_sink(&bus);

        let service = Arc::new(SessionService::new(
            Arc::clone(&store),
            Arc::new(GitCli::new()),
            bus.clone(),
            LifecycleOptions {
                clone_dir: config.sessions.clone_dir(data_dir),
                max_recycled: config.sessions.max_recycled,
            },
        ));

        let ttl = config.status.cache_ttl()?;
        let status_cache = cache::open(config.status.durable_cache, ttl, data_dir).map_err(
            |source| AppError::Io {
                path: data_dir.join("cache"),
                source,
            },
        )?;
        let aggregator = StatusAggregator::new(
            WorkerPool::from_config(config.status.workers),
            Some(status_cache),
        );
        let plugins = plugins::from_config(&config.plugins);

        debug!(data_dir = %data_dir.display(), plugins = plugins.len(), "application assembled");
        Ok(Self {
            config: RwLock::new(config),
            data_dir: data_dir.to_path_buf(),
            bus,
            store,
            service,
            notifications,
            aggregator,
            plugins,
            tracker: None,
        })
    }

    /// Attaches an agent status source; [`run`](Self::run) will poll it.
    pub fn with_status_source(mut self, source: Arc<dyn AgentStatusSource>) -> Self {
        self.tracker = Some(Arc::new(StatusTracker::new(
            Arc::clone(&self.store),
            source,
            self.bus.clone(),
            self.aggregator.pool().clone(),
        )));
        self
    }

    /// Adds a status plugin to the ones built from configuration.
    pub fn with_plugin(mut self, plugin: Arc<dyn StatusPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// The shared event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The session lifecycle service.
    pub fn service(&self) -> &Arc<SessionService> {
        &self.service
    }

    /// Notifications raised so far.
    pub fn notifications(&self) -> &Arc<MemoryNotificationStore> {
        &self.notifications
    }

    /// Data directory in use.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Reloads configuration from `path` (or the default location) and
    /// publishes `config.reloaded`.
    ///
    /// Only settings read on demand change behavior; the bus capacity, pool
    /// size and cache backing keep their startup values.
    pub fn reload_config(&self, path: Option<&Path>) -> Result<Config, ConfigError> {
        let config = ConfigLoader::load(path)?;
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config.clone();
        info!("configuration reloaded");
        self.bus.publish(ConfigReloaded {
            config: config.clone(),
        });
        Ok(config)
    }

    /// Refreshes every plugin's status for the active sessions.
    pub async fn refresh_statuses(
        &self,
        token: &CancellationToken,
    ) -> HashMap<String, HashMap<String, Status>> {
        let sessions: Vec<_> = match self.store.list().await {
            Ok(sessions) => sessions
                .into_iter()
                .filter(|s| s.state == SessionState::Active)
                .collect(),
            Err(e) => {
                warn!(error = %e, "failed to list sessions for status refresh");
                return HashMap::new();
            }
        };
        match self.aggregator.refresh_all(token, &sessions, &self.plugins).await {
            Ok(all) => all,
            Err(e) => {
                warn!(error = %e, "status refresh skipped");
                HashMap::new()
            }
        }
    }

    /// Starts the bus for a one-shot command so its events reach the
    /// notification router and log sink. Call [`Dispatch::finish`] afterwards.
    pub fn dispatch_events(&self) -> Result<Dispatch, AppError> {
        let token = CancellationToken::new();
        let handle = self.bus.start(token.clone())?;
        Ok(Dispatch {
            bus: self.bus.clone(),
            token,
            handle,
        })
    }

    /// Runs until `token` is cancelled.
    ///
    /// Starts the bus dispatch loop and, if a status source is attached, the
    /// agent status tracker. Every `status.poll_interval` the plugins are
    /// refreshed for the active sessions and expired cache entries are
    /// purged. Everything is stopped before this returns.
    pub async fn run(&self, token: CancellationToken) -> Result<(), AppError> {
        let dispatch = self.bus.start(token.clone())?;
        let poll_interval = self.config().status.poll_interval()?;

        let tracker = self.tracker.clone().map(|tracker| {
            let token = token.clone();
            tokio::spawn(async move { tracker.run(poll_interval, token).await })
        });

        info!(data_dir = %self.data_dir.display(), "hive running");
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.refresh_tick(&token).await,
            }
        }

        if let Some(handle) = tracker {
            if let Err(e) = handle.await {
                warn!(error = %e, "status tracker task failed");
            }
        }
        if let Err(e) = dispatch.await {
            warn!(error = %e, "event bus task failed");
        }
        self.aggregator.pool().close();
        info!("hive stopped");
        Ok(())
    }

    async fn refresh_tick(&self, token: &CancellationToken) {
        let all = self.refresh_statuses(token).await;
        for (plugin, statuses) in &all {
            for (id, status) in statuses {
                debug!(plugin = %plugin, session = %id, label = %status.label, "status refreshed");
            }
        }
        self.aggregator.purge_cache().await;
    }
}
