//! Abandonment, idle sweeping, store failures and shutdown

use std::time::Duration;

use assert_matches::assert_matches;
use SwovieMatch::database::{GroupStore, SwipeStore};
use SwovieMatch::models::{AbandonReason, GroupStatus, SessionEvent, SessionOutcome};
use SwovieMatch::SwovieError;

use crate::helpers::*;

#[tokio::test]
async fn test_leaving_abandons_the_session() {
    let ctx = TestContext::new();
    let group = ctx.full_group(&["u1", "u2", "u3"]).await;
    let events = ctx.subscribe(group.id).await;
    ctx.engine.record_swipe(approve(group.id, "u1", 1, 1)).await.unwrap();

    ctx.engine.leave_group(group.id, &member("u2")).await.unwrap();

    ctx.wait_closed(group.id).await;
    assert_matches!(
        ctx.engine.outcome(group.id),
        Some(SessionOutcome::Abandoned { reason: AbandonReason::MemberLeft { ref member_id } })
            if member_id.as_str() == "u2"
    );

    let events = collect_events(events).await;
    assert_matches!(
        events.last(),
        Some(SessionEvent::SessionClosed { outcome: SessionOutcome::Abandoned { .. }, .. })
    );
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::MatchFound { .. })));

    assert!(ctx.store.get_group(group.id).await.unwrap().is_none());
    assert_eq!(ctx.store.swipe_count(group.id), 0);

    let late = ctx.engine.record_swipe(approve(group.id, "u1", 2, 2)).await;
    assert_matches!(late, Err(SwovieError::GroupClosed { .. }));
}

#[tokio::test]
async fn test_outsider_cannot_leave() {
    let ctx = TestContext::new();
    let group = ctx.full_group(&["u1", "u2"]).await;

    let result = ctx.engine.leave_group(group.id, &member("stranger")).await;
    assert_matches!(result, Err(SwovieError::NotAMember { .. }));
    assert_eq!(
        ctx.engine.session_state(group.id).await.unwrap().members.len(),
        2
    );
}

#[tokio::test]
async fn test_idle_sessions_are_swept() {
    let ctx = TestContext::new_with_config(TestConfig {
        idle_timeout_seconds: 1,
        ..TestConfig::default()
    });
    let group = ctx.full_group(&["u1", "u2"]).await;

    assert_eq!(ctx.engine.sweep_idle().await, 0);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(ctx.engine.sweep_idle().await, 1);

    ctx.wait_closed(group.id).await;
    assert_eq!(
        ctx.engine.outcome(group.id),
        Some(SessionOutcome::Abandoned { reason: AbandonReason::IdleTimeout })
    );
    assert!(ctx.store.get_group(group.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_activity_keeps_session_alive() {
    let ctx = TestContext::new_with_config(TestConfig {
        idle_timeout_seconds: 1,
        ..TestConfig::default()
    });
    let group = ctx.full_group(&["u1", "u2"]).await;

    tokio::time::sleep(Duration::from_millis(700)).await;
    ctx.engine.record_swipe(approve(group.id, "u1", 1, 1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;

    assert_eq!(ctx.engine.sweep_idle().await, 0);
    assert!(ctx.engine.outcome(group.id).is_none());
}

#[tokio::test]
async fn test_store_outage_fails_the_session() {
    let ctx = TestContext::new();
    let group = ctx.full_group(&["u1", "u2"]).await;

    ctx.store.inject_failures(3);
    let result = ctx.engine.record_swipe(approve(group.id, "u1", 1, 1)).await;
    assert_matches!(result, Err(SwovieError::StoreUnavailable(_)));

    ctx.wait_closed(group.id).await;
    assert_matches!(ctx.engine.outcome(group.id), Some(SessionOutcome::Error { .. }));

    // stored state is kept for inspection, marked closed
    let stored = ctx.store.get_group(group.id).await.unwrap().unwrap();
    assert_eq!(stored.status, GroupStatus::Closed);
}

#[tokio::test]
async fn test_transient_store_errors_are_retried() {
    let ctx = TestContext::new();
    let group = ctx.full_group(&["u1", "u2"]).await;

    ctx.store.inject_failures(2);
    ctx.engine.record_swipe(approve(group.id, "u1", 1, 1)).await.unwrap();

    assert_eq!(ctx.store.swipe_count(group.id), 1);
    assert!(ctx.engine.outcome(group.id).is_none());
}

#[tokio::test]
async fn test_shutdown_leaves_groups_resumable() {
    let ctx = TestContext::new();
    let group = ctx.full_group(&["u1", "u2"]).await;
    ctx.engine.record_swipe(approve(group.id, "u1", 4, 1)).await.unwrap();

    ctx.engine.shutdown().await;
    tokio::time::timeout(Duration::from_secs(2), async {
        while ctx.engine.active_sessions() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sessions did not stop");

    assert!(ctx.engine.outcome(group.id).is_none());
    let stored = ctx.store.get_group(group.id).await.unwrap().unwrap();
    assert_eq!(stored.status, GroupStatus::Open);
    assert_eq!(ctx.store.list_for_group(group.id).await.unwrap().len(), 1);

    // a restarted process picks the session up where it stopped
    let restarted = ctx.replica();
    assert_eq!(restarted.resume_open_groups().await.unwrap(), 1);
    restarted.record_swipe(approve(group.id, "u2", 4, 2)).await.unwrap();
    let result = restarted.match_for_group(group.id, &member("u2")).await.unwrap();
    assert_eq!(result.map(|r| r.item_id.0), Some(4));
}

#[tokio::test]
async fn test_closed_and_unknown_groups_are_distinguished() {
    let ctx = TestContext::new();
    let group = ctx.full_group(&["u1", "u2"]).await;
    ctx.engine.record_swipe(approve(group.id, "u1", 1, 1)).await.unwrap();
    ctx.engine.record_swipe(approve(group.id, "u2", 1, 2)).await.unwrap();

    // a fresh process has no tombstone, only the archived result
    let fresh = ctx.replica();
    assert_matches!(
        fresh.session_state(group.id).await,
        Err(SwovieError::GroupClosed { .. })
    );

    let unknown = SwovieMatch::models::GroupId::new();
    assert_matches!(
        fresh.session_state(unknown).await,
        Err(SwovieError::NotFound { .. })
    );
}
