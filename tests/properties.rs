//! End-to-end checks of the coordination core's guarantees.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use hive::bus::{
    AgentStatusChanged, EventBus, NotificationPublished, SessionDeleted, TuiStarted, TuiStopped,
};
use hive::cache::{MemoryCache, StatusCache};
use hive::notify::{Level, NotificationRouter};
use hive::pool::WorkerPool;
use hive::status::{ProbeError, Status, StatusAggregator, StatusPlugin, StyleHint};
use hive::store::{JsonFileStore, MemoryStore, SessionStore};
use hive::{AgentStatus, Session, SessionState};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const REMOTE: &str = "git@example.com:org/repo.git";

async fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

fn recycled(name: &str, minutes_ago: i64) -> Session {
    let now = Utc::now();
    let mut session = Session::new(name, REMOTE, PathBuf::from(format!("/tmp/hive/{name}")));
    session.state = SessionState::Recycled;
    session.created_at = now - ChronoDuration::hours(1);
    session.updated_at = now - ChronoDuration::minutes(minutes_ago);
    session
}

// =============================================================================
// P1: bounded drop
// =============================================================================

#[tokio::test]
async fn p1_publishing_past_capacity_drops_only_the_overflow() {
    const CAPACITY: usize = 4;
    let bus = EventBus::new(CAPACITY);
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let published = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(Mutex::new(Vec::new()));
    {
        let delivered = Arc::clone(&delivered);
        bus.subscribe(move |e: &SessionDeleted| {
            delivered
                .lock()
                .expect("delivered lock")
                .push(e.session_id.clone());
        });
        let published = Arc::clone(&published);
        bus.on_publish(move |_, _| {
            published.fetch_add(1, Ordering::SeqCst);
        });
        let dropped = Arc::clone(&dropped);
        bus.on_drop(move |_, event| {
            if let hive::bus::Event::SessionDeleted(e) = event {
                dropped
                    .lock()
                    .expect("dropped lock")
                    .push(e.session_id.clone());
            }
        });
    }

    for i in 0..=CAPACITY {
        bus.publish(SessionDeleted {
            session_id: format!("s{i}"),
        });
    }
    let token = CancellationToken::new();
    let handle = bus.start(token.clone()).expect("start");

    assert!(
        wait_until(Duration::from_secs(1), || delivered
            .lock()
            .expect("delivered lock")
            .len()
            == CAPACITY)
        .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        *delivered.lock().expect("delivered lock"),
        vec!["s0", "s1", "s2", "s3"]
    );
    assert_eq!(published.load(Ordering::SeqCst), CAPACITY);
    assert_eq!(*dropped.lock().expect("dropped lock"), vec!["s4"]);

    token.cancel();
    handle.await.expect("dispatch loop");
}

// =============================================================================
// P2: panic isolation
// =============================================================================

#[tokio::test]
async fn p2_panicking_subscriber_does_not_stop_the_bus() {
    let bus = EventBus::new(8);
    let panics = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));
    bus.subscribe(|_: &TuiStarted| panic!("subscriber bug"));
    {
        let b_calls = Arc::clone(&b_calls);
        bus.subscribe(move |_: &TuiStopped| {
            b_calls.fetch_add(1, Ordering::SeqCst);
        });
        let panics = Arc::clone(&panics);
        bus.on_panic(move |_, _, message| {
            assert!(message.contains("subscriber bug"));
            panics.fetch_add(1, Ordering::SeqCst);
        });
    }
    let token = CancellationToken::new();
    let handle = bus.start(token.clone()).expect("start");

    bus.publish(TuiStarted {});
    bus.publish(TuiStopped {});

    assert!(wait_until(Duration::from_secs(1), || b_calls.load(Ordering::SeqCst) == 1).await);
    assert_eq!(panics.load(Ordering::SeqCst), 1);
    assert!(bus.is_running());

    token.cancel();
    handle.await.expect("dispatch loop");
}

// =============================================================================
// P3: pool bound
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn p3_single_slot_pool_serializes_runs() {
    let pool = WorkerPool::new(1);
    let d = Duration::from_millis(50);
    let start = Instant::now();
    let job = |pool: WorkerPool| async move {
        pool.run(|| tokio::time::sleep(d)).await.expect("run");
    };
    tokio::join!(job(pool.clone()), job(pool.clone()));
    assert!(start.elapsed() >= 2 * d, "elapsed {:?}", start.elapsed());
}

// =============================================================================
// P4 and the recycling scenario
// =============================================================================

async fn assert_fifo(store: &dyn SessionStore) {
    let older = recycled("older", 10);
    let newer = recycled("newer", 1);
    store.save(&newer).await.expect("save newer");
    store.save(&older).await.expect("save older");

    let first = store.find_recyclable(REMOTE).await.expect("first pick");
    assert_eq!(first.id, older.id);

    let mut reused = first;
    reused.transition(SessionState::Active).expect("reuse");
    store.save(&reused).await.expect("save reused");

    let second = store.find_recyclable(REMOTE).await.expect("second pick");
    assert_eq!(second.id, newer.id);
}

#[tokio::test]
async fn p4_find_recyclable_is_fifo_in_memory() {
    assert_fifo(&MemoryStore::new()).await;
}

#[tokio::test]
async fn p4_find_recyclable_is_fifo_on_disk() {
    let dir = tempfile::tempdir().expect("temp dir");
    assert_fifo(&JsonFileStore::in_dir(dir.path())).await;
}

// =============================================================================
// P5: absolute TTL
// =============================================================================

#[tokio::test(start_paused = true)]
async fn p5_reads_do_not_extend_ttl() {
    let cache = MemoryCache::new(Duration::from_secs(30));
    cache.set("context:s1", "0.42".to_string());

    for _ in 0..29 {
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("context:s1").is_some());
    }
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(cache.get("context:s1").is_none());
}

// =============================================================================
// P6: notification mapping
// =============================================================================

#[tokio::test]
async fn p6_only_missing_agents_notify() {
    let bus = EventBus::new(16);
    NotificationRouter::register(&bus, None);
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        bus.subscribe(move |n: &NotificationPublished| {
            seen.lock()
                .expect("seen lock")
                .push((n.level, n.message.clone()));
        });
    }
    let token = CancellationToken::new();
    let handle = bus.start(token.clone()).expect("start");
    let session = Session::new("agent-a", REMOTE, PathBuf::from("/tmp/hive/agent-a"));

    bus.publish(AgentStatusChanged {
        session: session.clone(),
        old_status: AgentStatus::Active,
        new_status: AgentStatus::Missing,
    });
    assert!(wait_until(Duration::from_secs(1), || !seen.lock().expect("seen").is_empty()).await);
    {
        let seen = seen.lock().expect("seen lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, Level::Warning);
        assert!(seen[0].1.contains("agent-a"));
    }

    bus.publish(AgentStatusChanged {
        session,
        old_status: AgentStatus::Active,
        new_status: AgentStatus::Ready,
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(seen.lock().expect("seen lock").len(), 1);

    token.cancel();
    handle.await.expect("dispatch loop");
}

// =============================================================================
// P7: idempotent aggregation
// =============================================================================

struct Counting(AtomicUsize);

#[async_trait]
impl StatusPlugin for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    async fn probe(
        &self,
        _token: &CancellationToken,
        _session_id: &str,
        _path: &Path,
    ) -> Result<String, ProbeError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok("ok".to_string())
    }

    fn render(&self, value: &str) -> Option<Status> {
        Some(Status::new(value, "", StyleHint::Plain))
    }
}

#[tokio::test]
async fn p7_refresh_within_ttl_probes_once() {
    let cache: Arc<dyn StatusCache> = Arc::new(MemoryCache::new(Duration::from_secs(30)));
    let aggregator = StatusAggregator::new(WorkerPool::new(5), Some(cache));
    let plugin = Arc::new(Counting(AtomicUsize::new(0)));
    let sessions = vec![Session::new("a", REMOTE, PathBuf::from("/tmp/hive/a"))];
    let token = CancellationToken::new();

    let first = aggregator
        .refresh_status(&token, &sessions, plugin.clone())
        .await
        .expect("first");
    let second = aggregator
        .refresh_status(&token, &sessions, plugin.clone())
        .await
        .expect("second");
    assert_eq!(first, second);
    assert_eq!(plugin.0.load(Ordering::SeqCst), 1);
}
