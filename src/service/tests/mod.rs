//! Tests for the session lifecycle service.
//!
//! - `lifecycle`: create, reuse, rename, corrupt and delete
//! - `prune`: recycle-pool cap per remote

mod lifecycle;

use super::{Git, GitError, LifecycleOptions, SessionService};
use crate::bus::{EventBus, EventName};
use crate::store::MemoryStore;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(super) const REMOTE: &str = "git@example.com:org/repo.git";

/// In-memory git stand-in that records every call.
#[derive(Debug, Default)]
pub(super) struct FakeGit {
    pub calls: Mutex<Vec<String>>,
    pub invalid: Mutex<HashSet<PathBuf>>,
    pub fail_remove: Mutex<HashSet<PathBuf>>,
    pub reset_delay: Mutex<Option<Duration>>,
}

impl FakeGit {
    fn record(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl Git for FakeGit {
    async fn clone_repo(&self, remote: &str, dest: &Path) -> Result<(), GitError> {
        self.record(format!("clone {} {}", remote, dest.display()));
        Ok(())
    }

    async fn reset(&self, path: &Path) -> Result<(), GitError> {
        self.record(format!("reset {}", path.display()));
        let delay = *self.reset_delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<(), GitError> {
        self.record(format!("remove {}", path.display()));
        if self.fail_remove.lock().expect("fail lock").contains(path) {
            return Err(GitError::Remove {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            });
        }
        Ok(())
    }

    async fn is_valid(&self, path: &Path) -> bool {
        !self.invalid.lock().expect("invalid lock").contains(path)
    }
}

/// Service wired to fresh fakes, plus the names of every published event.
pub(super) struct Harness {
    pub service: SessionService,
    pub store: MemoryStore,
    pub git: Arc<FakeGit>,
    pub published: Arc<Mutex<Vec<EventName>>>,
}

impl Harness {
    pub fn events(&self) -> Vec<EventName> {
        self.published.lock().expect("published lock").clone()
    }

    pub fn clear_events(&self) {
        self.published.lock().expect("published lock").clear();
    }
}

pub(super) fn harness(max_recycled: usize) -> Harness {
    let store = MemoryStore::new();
    let git = Arc::new(FakeGit::default());
    let bus = EventBus::new(256);
    let published = Arc::new(Mutex::new(Vec::new()));
    {
        let published = Arc::clone(&published);
        bus.on_publish(move |name, _| {
            published.lock().expect("published lock").push(name);
        });
    }
    let service = SessionService::new(
        Arc::new(store.clone()),
        git.clone(),
        bus,
        LifecycleOptions {
            clone_dir: PathBuf::from("/work/clones"),
            max_recycled,
        },
    );
    Harness {
        service,
        store,
        git,
        published,
    }
}
