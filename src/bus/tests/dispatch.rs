//! Dispatch ordering, typed routing, panic isolation and shutdown.

use super::super::*;
use super::wait_until;
use crate::{AgentStatus, Session};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn session(name: &str) -> Session {
    Session::new(name, "git@example.com:o/r.git", PathBuf::from("/tmp/r"))
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let bus = EventBus::new(4);
    let token = CancellationToken::new();
    let _handle = bus.start(token.clone()).expect("first start");
    assert!(bus.is_running());
    assert_eq!(bus.start(token.clone()).err(), Some(BusError::AlreadyStarted));
    token.cancel();
}

#[tokio::test]
async fn test_subscribers_called_in_registration_order() {
    let bus = EventBus::new(8);
    let calls = Arc::new(Mutex::new(Vec::new()));
    for label in ["first", "second", "third"] {
        let c = Arc::clone(&calls);
        bus.subscribe(move |_: &TuiStarted| c.lock().unwrap().push(label));
    }
    let token = CancellationToken::new();
    let _handle = bus.start(token.clone()).expect("start");
    bus.publish(TuiStarted {});

    let c = Arc::clone(&calls);
    assert!(wait_until(Duration::from_secs(1), move || c.lock().unwrap().len() == 3).await);
    assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "third"]);
    token.cancel();
}

#[tokio::test]
async fn test_events_delivered_in_publish_order() {
    let bus = EventBus::new(32);
    let ids = Arc::new(Mutex::new(Vec::new()));
    let i = Arc::clone(&ids);
    bus.subscribe(move |p: &SessionDeleted| i.lock().unwrap().push(p.session_id.clone()));
    let token = CancellationToken::new();
    let _handle = bus.start(token.clone()).expect("start");

    for n in 0..20 {
        bus.publish(SessionDeleted {
            session_id: n.to_string(),
        });
    }
    let i = Arc::clone(&ids);
    assert!(wait_until(Duration::from_secs(1), move || i.lock().unwrap().len() == 20).await);
    let expected: Vec<String> = (0..20).map(|n: i32| n.to_string()).collect();
    assert_eq!(*ids.lock().unwrap(), expected);
    token.cancel();
}

#[tokio::test]
async fn test_handler_only_sees_its_own_event_type() {
    let bus = EventBus::new(8);
    let created = Arc::new(AtomicUsize::new(0));
    let recycled = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&created);
    bus.subscribe(move |_: &SessionCreated| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    let r = Arc::clone(&recycled);
    bus.subscribe(move |_: &SessionRecycled| {
        r.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(bus.subscriber_count(EventName::SessionCreated), 1);
    assert_eq!(bus.subscriber_count(EventName::SessionDeleted), 0);

    let token = CancellationToken::new();
    let _handle = bus.start(token.clone()).expect("start");
    bus.publish(SessionCreated {
        session: session("a"),
    });
    bus.publish(SessionCreated {
        session: session("b"),
    });
    bus.publish(SessionRecycled {
        session: session("c"),
    });

    let (c, r) = (Arc::clone(&created), Arc::clone(&recycled));
    assert!(
        wait_until(Duration::from_secs(1), move || {
            c.load(Ordering::SeqCst) == 2 && r.load(Ordering::SeqCst) == 1
        })
        .await
    );
    token.cancel();
}

#[tokio::test]
async fn test_panicking_subscriber_is_isolated() {
    let bus = EventBus::new(8);
    let panics = Arc::new(Mutex::new(Vec::new()));
    let p = Arc::clone(&panics);
    bus.on_panic(move |name, _, message| p.lock().unwrap().push((name, message.to_string())));

    let after = Arc::new(AtomicUsize::new(0));
    bus.subscribe(|_: &AgentStatusChanged| panic!("subscriber bug"));
    let a = Arc::clone(&after);
    bus.subscribe(move |_: &AgentStatusChanged| {
        a.fetch_add(1, Ordering::SeqCst);
    });

    let token = CancellationToken::new();
    let _handle = bus.start(token.clone()).expect("start");
    bus.publish(AgentStatusChanged {
        session: session("a"),
        old_status: AgentStatus::Active,
        new_status: AgentStatus::Ready,
    });

    let a = Arc::clone(&after);
    assert!(wait_until(Duration::from_secs(1), move || a.load(Ordering::SeqCst) == 1).await);
    assert_eq!(
        *panics.lock().unwrap(),
        vec![(EventName::AgentStatusChanged, "subscriber bug".to_string())]
    );
    assert!(bus.is_running());
    token.cancel();
}

#[tokio::test]
async fn test_subscribe_fires_on_subscribe_hook() {
    let bus = EventBus::new(4);
    let names = Arc::new(Mutex::new(Vec::new()));
    let n = Arc::clone(&names);
    bus.on_subscribe(move |name| n.lock().unwrap().push(name));
    bus.subscribe(|_: &ConfigReloaded| {});
    bus.subscribe(|_: &TuiStopped| {});
    assert_eq!(
        *names.lock().unwrap(),
        vec![EventName::ConfigReloaded, EventName::TuiStopped]
    );
}

#[tokio::test]
async fn test_subscriber_may_publish_from_dispatch() {
    let bus = EventBus::new(8);
    let relay = bus.clone();
    bus.subscribe(move |_: &TuiStarted| relay.publish(TuiStopped {}));
    let stopped = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&stopped);
    bus.subscribe(move |_: &TuiStopped| {
        s.fetch_add(1, Ordering::SeqCst);
    });

    let token = CancellationToken::new();
    let _handle = bus.start(token.clone()).expect("start");
    bus.publish(TuiStarted {});
    let s = Arc::clone(&stopped);
    assert!(wait_until(Duration::from_secs(1), move || s.load(Ordering::SeqCst) == 1).await);
    token.cancel();
}

#[tokio::test]
async fn test_cancel_finishes_current_event_first() {
    let bus = EventBus::new(8);
    let finished = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&finished);
    let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
    let entered_tx = Mutex::new(entered_tx);
    bus.subscribe(move |_: &TuiStarted| {
        let _ = entered_tx.lock().unwrap().send(());
        std::thread::sleep(Duration::from_millis(100));
        f.fetch_add(1, Ordering::SeqCst);
    });

    let token = CancellationToken::new();
    let handle = bus.start(token.clone()).expect("start");
    bus.publish(TuiStarted {});
    bus.publish(TuiStarted {});

    tokio::task::spawn_blocking(move || entered_rx.recv())
        .await
        .expect("join")
        .expect("subscriber entered");
    token.cancel();
    handle.await.expect("dispatch loop");

    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_flush_waits_for_chained_events() {
    let bus = EventBus::new(8);
    let stopped = Arc::new(AtomicUsize::new(0));
    {
        let relay = bus.clone();
        bus.subscribe(move |_: &TuiStarted| {
            std::thread::sleep(Duration::from_millis(10));
            relay.publish(TuiStopped {});
        });
        let s = Arc::clone(&stopped);
        bus.subscribe(move |_: &TuiStopped| {
            s.fetch_add(1, Ordering::SeqCst);
        });
    }
    bus.publish(TuiStarted {});
    bus.publish(TuiStarted {});

    let token = CancellationToken::new();
    let handle = bus.start(token.clone()).expect("start");
    bus.flush().await;
    assert_eq!(stopped.load(Ordering::SeqCst), 2);

    token.cancel();
    handle.await.expect("dispatch loop");
    bus.flush().await;
}

#[tokio::test]
async fn test_flush_without_dispatch_loop_returns() {
    let bus = EventBus::new(4);
    bus.publish(TuiStarted {});
    bus.flush().await;
    assert!(!bus.is_running());
}

#[test]
fn test_event_names_match_wire_catalogue() {
    let wire: Vec<&str> = EventName::ALL.iter().map(|n| n.as_str()).collect();
    assert_eq!(
        wire,
        vec![
            "session.created",
            "session.recycled",
            "session.deleted",
            "session.renamed",
            "session.corrupted",
            "agent.status-changed",
            "message.received",
            "tui.started",
            "tui.stopped",
            "config.reloaded",
            "notification.published",
        ]
    );
    for name in EventName::ALL {
        assert_eq!(EventName::from_wire(name.as_str()), Some(*name));
    }
    assert_eq!(EventName::from_wire("session.exploded"), None);
}

#[test]
fn test_payload_from_event_rejects_other_variants() {
    let event = TuiStarted {}.into_event();
    assert_eq!(event.name(), EventName::TuiStarted);
    assert!(TuiStarted::from_event(&event).is_some());
    assert!(TuiStopped::from_event(&event).is_none());
}
