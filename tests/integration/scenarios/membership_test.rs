//! Membership scenarios: credential checks, capacity races, idempotent joins

use std::sync::Arc;

use assert_matches::assert_matches;
use SwovieMatch::database::GroupStore;
use SwovieMatch::models::{JoinOutcome, SessionPhase};
use SwovieMatch::SwovieError;

use crate::helpers::*;

#[tokio::test]
async fn test_wrong_credential_leaves_membership_unchanged() {
    let ctx = TestContext::new();
    let group = ctx.engine.create_group(create_request("u1", 3)).await.unwrap();

    let joined = ctx.engine.join_group(join_request(group.id, "u2", "secret")).await.unwrap();
    assert_matches!(joined, JoinOutcome::Joined(ref g) if g.members.len() == 2);

    let rejected = ctx.engine.join_group(join_request(group.id, "u3", "SECRET")).await;
    assert_matches!(rejected, Err(SwovieError::InvalidCredential { .. }));

    let stored = ctx.store.get_group(group.id).await.unwrap().unwrap();
    assert_eq!(stored.members, [member("u1"), member("u2")].into_iter().collect());
}

#[tokio::test]
async fn test_full_group_rejects_newcomers() {
    let ctx = TestContext::new();
    let group = ctx.full_group(&["u1", "u2"]).await;

    let result = ctx.engine.join_group(join_request(group.id, "u3", CREDENTIAL)).await;
    assert_matches!(result, Err(SwovieError::Full { capacity: 2, .. }));

    let stored = ctx.store.get_group(group.id).await.unwrap().unwrap();
    assert_eq!(stored.members.len(), 2);
    assert!(!stored.is_member(&member("u3")));
}

#[tokio::test]
async fn test_rejoin_is_idempotent() {
    let ctx = TestContext::new();
    let group = ctx.full_group(&["u1", "u2"]).await;

    let again = ctx.engine.join_group(join_request(group.id, "u2", CREDENTIAL)).await.unwrap();
    assert_matches!(again, JoinOutcome::AlreadyMember(ref g) if g.members.len() == 2);
}

#[tokio::test]
async fn test_join_unknown_group_is_not_found() {
    let ctx = TestContext::new();
    let missing = SwovieMatch::models::GroupId::new();

    let result = ctx.engine.join_group(join_request(missing, "u2", CREDENTIAL)).await;
    assert_matches!(result, Err(SwovieError::NotFound { group_id }) if group_id == missing);
}

#[tokio::test]
async fn test_invalid_create_parameters() {
    let ctx = TestContext::new();

    for capacity in [0, 1, 11] {
        let result = ctx.engine.create_group(create_request("u1", capacity)).await;
        assert_matches!(result, Err(SwovieError::InvalidParameters(_)));
    }

    let mut short = create_request("u1", 2);
    short.credential = "abc".to_string();
    assert_matches!(ctx.engine.create_group(short).await, Err(SwovieError::InvalidParameters(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_admit_exactly_one_for_last_slot() {
    let ctx = Arc::new(TestContext::new());
    let group = ctx.engine.create_group(create_request("u1", 2)).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            ctx.engine
                .join_group(join_request(group.id, &format!("racer{}", i), CREDENTIAL))
                .await
        }));
    }

    let mut admitted = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(JoinOutcome::Joined(_)) => admitted += 1,
            Err(SwovieError::Full { .. }) => full += 1,
            other => panic!("unexpected join result: {:?}", other.map(|o| o.into_group().members)),
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(full, 15);
    let stored = ctx.store.get_group(group.id).await.unwrap().unwrap();
    assert_eq!(stored.members.len(), 2);
}

#[tokio::test]
async fn test_session_waits_until_group_is_full() {
    let ctx = TestContext::new();
    let group = ctx.engine.create_group(create_request("u1", 3)).await.unwrap();

    let state = ctx.engine.session_state(group.id).await.unwrap();
    assert_eq!(state.phase, SessionPhase::WaitingForMembers);
    assert!(ctx.engine.next_items(group.id, &member("u1"), None).await.unwrap().is_empty());

    ctx.engine.join_group(join_request(group.id, "u2", CREDENTIAL)).await.unwrap();
    ctx.engine.join_group(join_request(group.id, "u3", CREDENTIAL)).await.unwrap();

    let state = ctx.engine.session_state(group.id).await.unwrap();
    assert_eq!(state.phase, SessionPhase::Active);
    assert_eq!(state.members.len(), 3);
    assert_eq!(ctx.engine.next_items(group.id, &member("u1"), Some(3)).await.unwrap().len(), 3);
}
