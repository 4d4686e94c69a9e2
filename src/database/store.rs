//! Storage traits the engine depends on.
//!
//! Backends: Postgres (`repositories`) and in-process (`memory`). The group
//! store's membership column is the only state that needs compare-and-set
//! semantics; swipes and match results are append-only.

use async_trait::async_trait;

use crate::models::{
    Group, GroupId, GroupStatus, JoinGroupRequest, JoinOutcome, MatchResult, MemberId, SwipeEvent,
};
use crate::utils::errors::Result;

#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Persist a freshly built group together with its creator's membership
    /// as one write. No partial group is ever visible.
    async fn create_group(&self, group: &Group) -> Result<()>;

    async fn get_group(&self, group_id: GroupId) -> Result<Option<Group>>;

    /// Add-if-room as a single transaction.
    ///
    /// Fails with `NotFound` (missing or not Open), `InvalidCredential`, or
    /// `Full`, checked in that order. A member that is already present gets
    /// `JoinOutcome::AlreadyMember` even when the group is full.
    async fn join_group(&self, request: &JoinGroupRequest) -> Result<JoinOutcome>;

    /// Compare-and-set the lifecycle status. Returns false when the stored
    /// status was not `from` (someone else moved it first).
    async fn transition_status(
        &self,
        group_id: GroupId,
        from: GroupStatus,
        to: GroupStatus,
    ) -> Result<bool>;

    /// Remove the group and its memberships
    async fn delete_group(&self, group_id: GroupId) -> Result<()>;

    /// Groups still Open, oldest first; used to resume sessions after a restart
    async fn list_open_groups(&self) -> Result<Vec<Group>>;
}

#[async_trait]
pub trait SwipeStore: Send + Sync {
    /// Durable append. Re-appending an identical event is a no-op.
    async fn append(&self, event: &SwipeEvent) -> Result<()>;

    /// Full log for a group in append order
    async fn list_for_group(&self, group_id: GroupId) -> Result<Vec<SwipeEvent>>;

    /// Garbage-collect the log on teardown. Returns rows removed.
    async fn delete_for_group(&self, group_id: GroupId) -> Result<u64>;
}

#[async_trait]
pub trait MatchHistoryStore: Send + Sync {
    /// Archive a result. Returns false when the group already has one, which
    /// keeps the record exactly-once per group even across replicas.
    async fn record(&self, result: &MatchResult) -> Result<bool>;

    async fn find_by_group(&self, group_id: GroupId) -> Result<Option<MatchResult>>;

    /// Results whose membership snapshot contains `member_id`, newest first
    async fn list_for_member(&self, member_id: &MemberId, limit: i64) -> Result<Vec<MatchResult>>;
}
