use super::{harness, REMOTE};
use crate::bus::EventName;
use crate::service::ServiceError;
use crate::store::SessionStore;
use crate::{SessionState, StoreError};
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// create
// =============================================================================

#[tokio::test]
async fn test_create_clones_when_pool_is_empty() {
    let h = harness(5);
    let session = h.service.create("Fix Login", REMOTE).await.expect("create");

    assert_eq!(session.state, SessionState::Active);
    assert_eq!(session.slug, "fix-login");
    assert_eq!(
        session.path,
        PathBuf::from(format!("/work/clones/fix-login-{}", session.id))
    );
    assert_eq!(
        h.git.calls(),
        vec![format!("clone {} {}", REMOTE, session.path.display())]
    );
    assert_eq!(h.store.get(&session.id).await.expect("stored"), session);
    assert_eq!(h.events(), vec![EventName::SessionCreated]);
}

#[tokio::test]
async fn test_create_reuses_recycled_clone() {
    let h = harness(5);
    let first = h.service.create("first", REMOTE).await.expect("create");
    h.service.recycle(&first.id).await.expect("recycle");

    let reused = h.service.create("second", REMOTE).await.expect("reuse");
    assert_eq!(reused.id, first.id);
    assert_eq!(reused.path, first.path);
    assert_eq!(reused.name, "second");
    assert_eq!(reused.state, SessionState::Active);
    assert_eq!(
        h.git.calls().iter().filter(|c| c.starts_with("clone")).count(),
        1,
        "reuse must not clone again"
    );
}

#[tokio::test]
async fn test_create_ignores_recycled_clone_of_other_remote() {
    let h = harness(5);
    let other = h
        .service
        .create("other", "git@example.com:org/other.git")
        .await
        .expect("create");
    h.service.recycle(&other.id).await.expect("recycle");

    let fresh = h.service.create("mine", REMOTE).await.expect("create");
    assert_ne!(fresh.id, other.id);
    assert_eq!(
        h.store.get(&other.id).await.expect("still pooled").state,
        SessionState::Recycled
    );
}

// =============================================================================
// recycle
// =============================================================================

#[tokio::test]
async fn test_recycle_resets_clone_and_publishes() {
    let h = harness(5);
    let session = h.service.create("a", REMOTE).await.expect("create");
    h.clear_events();

    let recycled = h.service.recycle(&session.id).await.expect("recycle");
    assert_eq!(recycled.state, SessionState::Recycled);
    assert!(recycled.updated_at >= session.updated_at);
    assert!(h
        .git
        .calls()
        .contains(&format!("reset {}", session.path.display())));
    assert_eq!(h.events(), vec![EventName::SessionRecycled]);
}

#[tokio::test]
async fn test_recycle_twice_is_rejected() {
    let h = harness(5);
    let session = h.service.create("a", REMOTE).await.expect("create");
    h.service.recycle(&session.id).await.expect("recycle");

    let err = h.service.recycle(&session.id).await.expect_err("second recycle");
    assert!(matches!(
        err,
        ServiceError::Store(StoreError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_recycle_unknown_session() {
    let h = harness(5);
    let err = h.service.recycle("missing").await.expect_err("unknown");
    assert!(matches!(err, ServiceError::Store(StoreError::NotFound(_))));
    assert!(h.git.calls().is_empty());
}

// =============================================================================
// rename / corrupt / check / delete
// =============================================================================

#[tokio::test]
async fn test_rename_updates_slug_and_reports_old_name() {
    let h = harness(5);
    let session = h.service.create("old name", REMOTE).await.expect("create");
    h.clear_events();

    let renamed = h.service.rename(&session.id, "New Name").await.expect("rename");
    assert_eq!(renamed.name, "New Name");
    assert_eq!(renamed.slug, "new-name");
    assert_eq!(renamed.path, session.path);
    assert_eq!(h.events(), vec![EventName::SessionRenamed]);
}

#[tokio::test]
async fn test_mark_corrupted_only_from_active() {
    let h = harness(5);
    let session = h.service.create("a", REMOTE).await.expect("create");
    let corrupted = h.service.mark_corrupted(&session.id).await.expect("corrupt");
    assert_eq!(corrupted.state, SessionState::Corrupted);

    let err = h
        .service
        .mark_corrupted(&session.id)
        .await
        .expect_err("already corrupted");
    assert!(matches!(
        err,
        ServiceError::Store(StoreError::InvalidTransition { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_during_slow_reset_waits_for_recycle() {
    let h = harness(5);
    let session = h.service.create("a", REMOTE).await.expect("create");
    *h.git.reset_delay.lock().expect("delay lock") = Some(Duration::from_millis(100));

    let (recycled, corrupted) = tokio::join!(h.service.recycle(&session.id), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.service.mark_corrupted(&session.id).await
    });

    let recycled = recycled.expect("recycle");
    assert_eq!(recycled.state, SessionState::Recycled);
    // Recycled -> Corrupted is not an edge, so the late corrupt is refused
    // instead of being overwritten.
    assert!(matches!(
        corrupted,
        Err(ServiceError::Store(StoreError::InvalidTransition {
            from: SessionState::Recycled,
            to: SessionState::Corrupted,
            ..
        }))
    ));
    let stored = h.store.get(&session.id).await.expect("stored");
    assert_eq!(stored.state, SessionState::Recycled);
    assert!(!h.events().contains(&EventName::SessionCorrupted));
}

#[tokio::test(start_paused = true)]
async fn test_recycle_refuses_session_corrupted_before_reset() {
    let h = harness(5);
    let session = h.service.create("a", REMOTE).await.expect("create");
    *h.git.reset_delay.lock().expect("delay lock") = Some(Duration::from_millis(100));

    let (corrupted, recycled) = tokio::join!(h.service.mark_corrupted(&session.id), async {
        tokio::time::sleep(Duration::from_millis(1)).await;
        h.service.recycle(&session.id).await
    });

    assert_eq!(corrupted.expect("corrupt").state, SessionState::Corrupted);
    assert!(matches!(
        recycled,
        Err(ServiceError::Store(StoreError::InvalidTransition { .. }))
    ));
    assert!(
        !h.git.calls().iter().any(|c| c.starts_with("reset")),
        "a corrupted clone is never reset back into the pool"
    );
    let stored = h.store.get(&session.id).await.expect("stored");
    assert_eq!(stored.state, SessionState::Corrupted);
}

#[tokio::test]
async fn test_check_marks_invalid_clone_corrupted() {
    let h = harness(5);
    let good = h.service.create("good", REMOTE).await.expect("create");
    let bad = h.service.create("bad", REMOTE).await.expect("create");
    h.git
        .invalid
        .lock()
        .expect("invalid lock")
        .insert(bad.path.clone());
    h.clear_events();

    assert!(h.service.check(&good.id).await.expect("check good"));
    assert!(!h.service.check(&bad.id).await.expect("check bad"));
    assert_eq!(
        h.store.get(&bad.id).await.expect("bad").state,
        SessionState::Corrupted
    );
    assert_eq!(h.events(), vec![EventName::SessionCorrupted]);
}

#[tokio::test]
async fn test_delete_removes_clone_and_record() {
    let h = harness(5);
    let session = h.service.create("a", REMOTE).await.expect("create");
    h.clear_events();

    h.service.delete(&session.id).await.expect("delete");
    assert!(matches!(
        h.store.get(&session.id).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(h
        .git
        .calls()
        .contains(&format!("remove {}", session.path.display())));
    assert_eq!(h.events(), vec![EventName::SessionDeleted]);
}

#[tokio::test]
async fn test_delete_keeps_record_when_removal_fails() {
    let h = harness(5);
    let session = h.service.create("a", REMOTE).await.expect("create");
    h.git
        .fail_remove
        .lock()
        .expect("fail lock")
        .insert(session.path.clone());

    let err = h.service.delete(&session.id).await.expect_err("remove fails");
    assert!(matches!(err, ServiceError::Git(_)));
    assert!(h.store.get(&session.id).await.is_ok());
}
