//! Tests for the EventBus module.
//!
//! - `publish`: queueing, drop-on-full and publish/drop hooks
//! - `dispatch`: ordering, typed routing, panic isolation and shutdown

mod dispatch;

use std::time::Duration;

/// Polls `cond` every few milliseconds until it holds or `timeout` elapses.
pub(super) async fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
