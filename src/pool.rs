//! Bounded worker pool for subprocess-backed probes.
//!
//! A counting semaphore caps how many probes run at once, no matter how many
//! sessions or plugins ask for one. Slots are released when the
//! [`WorkerSlot`] guard drops, so a job that errors or panics still frees its
//! slot. Waiters are served in whatever order the semaphore grants permits.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Pool size used when none (or a non-positive one) is configured.
pub const DEFAULT_WORKERS: usize = 5;

/// Errors returned while waiting for a slot.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    /// The token was cancelled before a slot became free; the job was skipped.
    #[error("cancelled while waiting for a worker slot")]
    Cancelled,
    /// The pool was closed and will never hand out another slot.
    #[error("worker pool is closed")]
    Closed,
}

/// A held pool slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
}

/// Fixed-capacity concurrency limiter.
///
/// Cloning shares the same slots.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// Creates a pool with `capacity` slots; zero falls back to [`DEFAULT_WORKERS`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_WORKERS
        } else {
            capacity
        };
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Builds a pool from a signed config value; values `<= 0` use the default.
    pub fn from_config(workers: i64) -> Self {
        Self::new(usize::try_from(workers).unwrap_or(0))
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Closes the pool. Pending and future acquisitions fail with [`PoolError::Closed`].
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> Result<WorkerSlot, PoolError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        trace!(available = self.available(), "worker slot acquired");
        Ok(WorkerSlot { _permit: permit })
    }

    /// Releases a slot explicitly. Equivalent to dropping it.
    pub fn release(&self, slot: WorkerSlot) {
        drop(slot);
    }

    /// Runs `job` while holding a slot.
    pub async fn run<F, Fut, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _slot = self.acquire().await?;
        Ok(job().await)
    }

    /// Like [`run`](Self::run), but gives up if `token` is cancelled while
    /// waiting. A cancelled call never invokes `job`.
    ///
    /// Cancellation after the slot is acquired does not interrupt `job`.
    pub async fn run_context<F, Fut, T>(
        &self,
        token: &CancellationToken,
        job: F,
    ) -> Result<T, PoolError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let slot = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(PoolError::Cancelled),
            slot = self.acquire() => slot?,
        };
        let out = job().await;
        drop(slot);
        Ok(out)
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}
