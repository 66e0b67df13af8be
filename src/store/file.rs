//! JSON file session store.
//!
//! Every operation re-reads the file so that separate processes sharing the
//! data directory see each other's writes. Mutations hold an in-process
//! mutex across read-modify-write and replace the file atomically through a
//! temporary sibling and `rename`.

use super::{oldest_recyclable, sort_sessions, validate, SessionStore};
use crate::{Session, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionsFile {
    #[serde(default)]
    sessions: Vec<Session>,
}

/// Session store persisted as `sessions.json`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// File name used inside the data directory.
    pub const FILE_NAME: &'static str = "sessions.json";

    /// Opens a store at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Opens the store in `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(Self::FILE_NAME))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<Session>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => {
                let file: SessionsFile = serde_json::from_slice(&bytes)?;
                Ok(file.sessions)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn persist(&self, mut sessions: Vec<Session>) -> Result<(), StoreError> {
        sort_sessions(&mut sessions);
        let json = serde_json::to_vec_pretty(&SessionsFile { sessions })?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn list(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions = self.load().await?;
        sort_sessions(&mut sessions);
        Ok(sessions)
    }

    async fn get(&self, id: &str) -> Result<Session, StoreError> {
        self.load()
            .await?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        validate(session)?;
        let _guard = self.write_lock.lock().await;
        let mut sessions = self.load().await?;
        match sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session.clone(),
            None => sessions.push(session.clone()),
        }
        self.persist(sessions).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut sessions = self.load().await?;
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        if sessions.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.persist(sessions).await
    }

    async fn find_recyclable(&self, remote: &str) -> Result<Session, StoreError> {
        let sessions = self.load().await?;
        oldest_recyclable(&sessions, remote)
            .cloned()
            .ok_or_else(|| StoreError::NoRecyclable(remote.to_string()))
    }
}
