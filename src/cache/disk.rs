//! File-backed cache shared across processes.
//!
//! Each key maps to one JSON file holding the value and its absolute expiry.
//! File names are the hex encoding of the key, so any key is safe on disk.
//! Writes go to a temporary file in the same directory and are renamed into
//! place, so readers never observe a half-written entry.

use super::StatusCache;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    value: String,
    written_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Cache persisted under a directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    ttl: Duration,
}

impl DiskCache {
    /// Opens (creating if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>, ttl: Duration) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, ttl })
    }

    /// Directory holding the entry files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Removes every expired or unreadable entry file.
    pub fn remove_expired(&self) -> io::Result<usize> {
        let now = Utc::now();
        let mut removed = 0;
        for item in fs::read_dir(&self.dir)? {
            let path = item?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let expired = match read_entry(&path) {
                Some(entry) => entry.expires_at < now,
                None => true,
            };
            if expired && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() * 2 + 5);
        for byte in key.as_bytes() {
            let _ = write!(name, "{:02x}", byte);
        }
        name.push_str(".json");
        self.dir.join(name)
    }

    pub(crate) fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let path = self.entry_path(key);
        let entry = read_entry(&path)?;
        if now > entry.expires_at {
            debug!(key, "durable cache entry expired");
            let _ = fs::remove_file(&path);
            return None;
        }
        Some(entry.value)
    }

    fn write_entry(&self, key: &str, value: String, ttl: Duration) -> io::Result<()> {
        let written_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = written_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = DiskEntry {
            value,
            written_at,
            expires_at,
        };
        let json = serde_json::to_vec(&entry).map_err(io::Error::other)?;
        let path = self.entry_path(key);
        let tmp = path.with_extension(format!("tmp{}", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)
    }
}

fn read_entry(path: &Path) -> Option<DiskEntry> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read durable cache entry");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "discarding corrupt durable cache entry");
            let _ = fs::remove_file(path);
            None
        }
    }
}

impl StatusCache for DiskCache {
    fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Utc::now())
    }

    fn set(&self, key: &str, value: String) {
        self.set_ttl(key, value, self.ttl);
    }

    fn set_ttl(&self, key: &str, value: String, ttl: Duration) {
        if let Err(e) = self.write_entry(key, value, ttl) {
            warn!(key, error = %e, "failed to write durable cache entry");
        }
    }

    fn purge_expired(&self) -> usize {
        match self.remove_expired() {
            Ok(removed) => removed,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "failed to purge durable cache");
                0
            }
        }
    }
}
