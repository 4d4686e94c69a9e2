//! Several engines over one store and feed

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use tokio_stream::StreamExt;
use SwovieMatch::config::EngineConfig;
use SwovieMatch::database::{DatabaseService, GroupStore, MatchHistoryStore, MemoryStore};
use SwovieMatch::models::{AbandonReason, GroupChange, GroupId, JoinOutcome, SessionOutcome};
use SwovieMatch::services::{ChangeFeed, FeedError, FeedStream, MemoryChangeFeed, StaticCatalog};
use SwovieMatch::state::Engine;
use SwovieMatch::utils::RetryPolicy;

use crate::helpers::*;

/// Shared feed whose `close` leaves streams open, as a broker-backed feed does
struct BrokerLikeFeed(MemoryChangeFeed);

#[async_trait]
impl ChangeFeed for BrokerLikeFeed {
    async fn publish(&self, change: GroupChange) -> Result<(), FeedError> {
        self.0.publish(change).await
    }

    async fn subscribe(&self, group_id: GroupId) -> Result<FeedStream, FeedError> {
        self.0.subscribe(group_id).await
    }

    async fn close(&self, _group_id: GroupId) {}
}

fn engine_over(store: &Arc<MemoryStore>, feed: Arc<dyn ChangeFeed>) -> Engine {
    Engine::with_retry(
        DatabaseService::from_memory(store.clone()),
        feed,
        Arc::new(StaticCatalog::sequential(20)),
        EngineConfig::default(),
        RetryPolicy::immediate(3),
    )
}

async fn wait_closed_on(engine: &Engine, group_id: GroupId) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while engine.outcome(group_id).is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("replica session did not close in time");
}

#[tokio::test]
async fn test_replicas_agree_on_one_match() {
    let ctx = TestContext::new();
    let other = ctx.replica();
    let group = ctx.full_group(&["u1", "u2"]).await;

    // both replicas serve the group
    assert_eq!(other.session_state(group.id).await.unwrap().members.len(), 2);

    ctx.engine.record_swipe(approve(group.id, "u1", 6, 1)).await.unwrap();
    other.record_swipe(approve(group.id, "u2", 6, 2)).await.unwrap();

    ctx.wait_closed(group.id).await;
    wait_closed_on(&other, group.id).await;

    assert_eq!(ctx.engine.outcome(group.id), other.outcome(group.id));
    assert_matches!(ctx.engine.outcome(group.id), Some(SessionOutcome::Matched { .. }));
    assert_eq!(ctx.store.list_for_member(&member("u1"), 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_join_on_one_replica_reaches_the_other() {
    let ctx = TestContext::new();
    let other = ctx.replica();
    let group = ctx.engine.create_group(create_request("u1", 2)).await.unwrap();
    assert_eq!(other.session_state(group.id).await.unwrap().members.len(), 1);

    let outcome = ctx.engine.join_group(join_request(group.id, "u2", CREDENTIAL)).await.unwrap();
    assert_matches!(outcome, JoinOutcome::Joined(_));

    tokio::time::timeout(Duration::from_secs(2), async {
        while other.session_state(group.id).await.unwrap().members.len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("membership never propagated");
}

#[tokio::test]
async fn test_lagging_replica_resyncs_from_store() {
    let ctx = TestContext::new_with_config(TestConfig {
        channel_capacity: 2,
        ..TestConfig::default()
    });
    let other = ctx.replica();
    let group = ctx.full_group(&["u1", "u2", "u3"]).await;
    assert_eq!(other.session_state(group.id).await.unwrap().swipes_recorded, 0);

    // far more notifications than the feed buffers
    for item in 1..=12 {
        ctx.engine.record_swipe(reject(group.id, "u1", item, item)).await.unwrap();
    }

    tokio::time::timeout(Duration::from_secs(2), async {
        while other.session_state(group.id).await.unwrap().swipes_recorded < 12 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("replica never caught up");

    // still consistent enough to reach a match across replicas
    ctx.engine.record_swipe(approve(group.id, "u1", 20, 30)).await.unwrap();
    ctx.engine.record_swipe(approve(group.id, "u2", 20, 31)).await.unwrap();
    other.record_swipe(approve(group.id, "u3", 20, 32)).await.unwrap();

    ctx.wait_closed(group.id).await;
    let result = ctx.engine.match_for_group(group.id, &member("u3")).await.unwrap();
    assert_eq!(result.map(|r| r.item_id.0), Some(20));
}

#[tokio::test]
async fn test_fresh_member_can_swipe_on_another_replica() {
    let ctx = TestContext::new();
    let other = ctx.replica();

    for _ in 0..20 {
        let group = ctx.engine.create_group(create_request("u1", 3)).await.unwrap();
        assert_eq!(other.session_state(group.id).await.unwrap().members.len(), 1);

        ctx.engine.join_group(join_request(group.id, "u2", CREDENTIAL)).await.unwrap();
        // no waiting for the membership notification
        other.record_swipe(approve(group.id, "u2", 1, 1)).await.unwrap();
    }
}

#[tokio::test]
async fn test_match_is_announced_once_across_replicas() {
    init_test_logging();
    let store = Arc::new(MemoryStore::new());
    let feed: Arc<dyn ChangeFeed> = Arc::new(BrokerLikeFeed(MemoryChangeFeed::new(64)));
    let first = engine_over(&store, feed.clone());
    let second = engine_over(&store, feed.clone());

    let group = first.create_group(create_request("u1", 2)).await.unwrap();
    first.join_group(join_request(group.id, "u2", CREDENTIAL)).await.unwrap();
    assert_eq!(second.session_state(group.id).await.unwrap().members.len(), 2);

    let mut raw = feed.subscribe(group.id).await.unwrap();
    first.record_swipe(approve(group.id, "u1", 6, 1)).await.unwrap();
    first.record_swipe(approve(group.id, "u2", 6, 2)).await.unwrap();

    wait_closed_on(&first, group.id).await;
    wait_closed_on(&second, group.id).await;
    assert_eq!(first.outcome(group.id), second.outcome(group.id));

    // the stream never ends on its own; drain until it goes quiet
    let mut changes = Vec::new();
    while let Ok(Some(change)) = tokio::time::timeout(Duration::from_millis(200), raw.next()).await {
        changes.push(change.unwrap());
    }

    let matches = changes.iter().filter(|c| matches!(c, GroupChange::MatchFound { .. })).count();
    let closes = changes.iter().filter(|c| matches!(c, GroupChange::SessionClosed { .. })).count();
    assert_eq!(matches, 1, "changes: {:?}", changes);
    assert_eq!(closes, 1, "changes: {:?}", changes);
}

#[tokio::test]
async fn test_group_removed_elsewhere_is_abandoned() {
    let ctx = TestContext::new();
    let other = ctx.replica();
    let group = ctx.full_group(&["u1", "u2"]).await;
    assert_eq!(other.session_state(group.id).await.unwrap().members.len(), 2);

    // removed behind both sessions' backs, with the notification lost
    ctx.store.delete_group(group.id).await.unwrap();
    ctx.feed.close(group.id).await;

    ctx.wait_closed(group.id).await;
    wait_closed_on(&other, group.id).await;

    let expected = Some(SessionOutcome::Abandoned { reason: AbandonReason::ClosedElsewhere });
    assert_eq!(ctx.engine.outcome(group.id), expected);
    assert_eq!(other.outcome(group.id), expected);
}
