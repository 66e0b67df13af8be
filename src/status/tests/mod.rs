//! Tests for status aggregation and agent status tracking.
//!
//! - `aggregator`: cache short-circuit, pool bound, partial failure
//! - `tracker`: transition detection and forgetting deleted sessions


use super::{ProbeError, Status, StatusPlugin, StyleHint};
use crate::Session;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(super) fn sessions(n: usize) -> Vec<Session> {
    (0..n)
        .map(|i| {
            Session::new(
                format!("s{i}"),
                "git@example.com:org/repo.git",
                PathBuf::from(format!("/tmp/hive/s{i}")),
            )
        })
        .collect()
}

/// Plugin that echoes the session ID after `delay`, counting calls and
/// tracking peak concurrency.
#[derive(Default)]
pub(super) struct CountingPlugin {
    pub delay: Duration,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub failing: Mutex<HashSet<String>>,
}

impl CountingPlugin {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusPlugin for CountingPlugin {
    fn name(&self) -> &str {
        "counting"
    }

    async fn probe(
        &self,
        _token: &CancellationToken,
        session_id: &str,
        _path: &Path,
    ) -> Result<String, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.failing.lock().expect("failing lock").contains(session_id) {
            return Err(ProbeError::Command("boom".to_string()));
        }
        Ok(format!("value-{session_id}"))
    }

    fn render(&self, value: &str) -> Option<Status> {
        Some(Status::new(value, "", StyleHint::Plain))
    }
}
