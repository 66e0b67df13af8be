//! Tests for the session stores.
//!
//! - `basic`: CRUD and NotFound behaviour, run against both stores
//! - `recyclable`: FIFO recycle selection
//! - `file`: JSON file persistence specifics
//! - `concurrent`: concurrent access to the shared map


use crate::{Session, SessionState};
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;

pub(super) const REMOTE: &str = "git@example.com:org/repo.git";

/// Helper to create a test session with a given name.
pub(super) fn create_test_session(name: &str) -> Session {
    Session::new(name, REMOTE, PathBuf::from(format!("/tmp/hive/{}", name)))
}

/// Helper to create a recycled session last touched `minutes_ago` before `now`.
pub(super) fn recycled_session(
    name: &str,
    remote: &str,
    now: DateTime<Utc>,
    minutes_ago: i64,
) -> Session {
    let mut session = Session::new(name, remote, PathBuf::from(format!("/tmp/hive/{}", name)));
    session.state = SessionState::Recycled;
    session.created_at = now - Duration::hours(1);
    session.updated_at = now - Duration::minutes(minutes_ago);
    session
}
