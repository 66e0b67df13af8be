//! TTL status cache.
//!
//! Memoizes expensive status probes per `(plugin, session)` key. Expiry is
//! absolute: an entry written at `t` with time-to-live `ttl` is a miss once
//! `now - t > ttl`, however often it was read in between.
//!
//! Two backings share the [`StatusCache`] trait and are picked once at
//! construction by [`open`]:
//!
//! - [`MemoryCache`]: in-process map behind a `RwLock`, gone on restart.
//! - [`DiskCache`]: one file per key under the data directory, shared by
//!   every process using that directory. The store records the expiry next
//!   to the value and refuses to return expired entries.

mod disk;
mod memory;

pub use disk::DiskCache;
pub use memory::MemoryCache;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Default time-to-live for cached probe results.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Key/value cache with absolute per-entry expiry.
///
/// Values are opaque strings; callers serialize their own probe results.
/// Write failures in durable backings are logged and swallowed, as a missed
/// cache write only costs an extra probe later.
///
/// Calls may block on file I/O. Async callers run them on the blocking pool.
pub trait StatusCache: Send + Sync {
    /// Returns the value for `key` unless it is missing or expired.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` with the cache's default time-to-live, replacing any entry.
    fn set(&self, key: &str, value: String);

    /// Stores `value` with an explicit time-to-live, replacing any entry.
    fn set_ttl(&self, key: &str, value: String, ttl: Duration);

    /// Drops every expired entry. Returns how many were removed.
    fn purge_expired(&self) -> usize;
}

/// Builds the cache key for one plugin's view of one session.
pub fn cache_key(plugin: &str, session_id: &str) -> String {
    format!("{}:{}", plugin, session_id)
}

/// Selects and constructs the cache backing.
///
/// `durable` chooses [`DiskCache`] rooted at `<data_dir>/cache`; otherwise a
/// fresh [`MemoryCache`] is returned.
pub fn open(
    durable: bool,
    ttl: Duration,
    data_dir: &Path,
) -> std::io::Result<Arc<dyn StatusCache>> {
    if durable {
        let cache = DiskCache::open(data_dir.join("cache"), ttl)?;
        tracing::debug!(dir = %cache.dir().display(), "using durable status cache");
        Ok(Arc::new(cache))
    } else {
        Ok(Arc::new(MemoryCache::new(ttl)))
    }
}
