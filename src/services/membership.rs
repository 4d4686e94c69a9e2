//! Membership coordinator
//!
//! Owns create and join against the group store. Parameter checks happen
//! here; the capacity and credential checks happen inside the store's single
//! join transaction so concurrent joiners cannot both take the last slot.

use std::sync::Arc;

use tracing::warn;

use crate::database::store::GroupStore;
use crate::models::{CreateGroupRequest, Group, GroupChange, JoinGroupRequest, JoinOutcome};
use crate::services::feed::ChangeFeed;
use crate::utils::errors::Result;
use crate::utils::helpers::{validate_capacity, validate_credential, validate_member_id};
use crate::utils::logging::log_group_event;
use crate::utils::retry::RetryPolicy;

#[derive(Clone)]
pub struct MembershipCoordinator {
    groups: Arc<dyn GroupStore>,
    feed: Arc<dyn ChangeFeed>,
    retry: RetryPolicy,
}

impl MembershipCoordinator {
    pub fn new(groups: Arc<dyn GroupStore>, feed: Arc<dyn ChangeFeed>, retry: RetryPolicy) -> Self {
        Self { groups, feed, retry }
    }

    /// Validate and persist a new Open group whose only member is the creator
    pub async fn create_group(&self, request: CreateGroupRequest) -> Result<Group> {
        validate_capacity(request.capacity)?;
        validate_credential(&request.credential)?;
        validate_member_id(request.creator.as_str())?;

        let group = Group::open(request.capacity, request.credential, request.creator);
        self.retry
            .run("create_group", || self.groups.create_group(&group))
            .await?;

        log_group_event(group.id, "created", Some(&group.creator), None);
        self.announce(&group).await;
        Ok(group)
    }

    /// Admit a member through the store's atomic add-if-room.
    ///
    /// Re-joining is not an error and publishes nothing.
    pub async fn join_group(&self, request: JoinGroupRequest) -> Result<JoinOutcome> {
        validate_member_id(request.member_id.as_str())?;

        let outcome = self
            .retry
            .run("join_group", || self.groups.join_group(&request))
            .await?;

        if let JoinOutcome::Joined(group) = &outcome {
            let details = format!("{}/{}", group.members.len(), group.capacity);
            log_group_event(group.id, "joined", Some(&request.member_id), Some(&details));
            self.announce(group).await;
        }

        Ok(outcome)
    }

    async fn announce(&self, group: &Group) {
        let change = GroupChange::MembershipChanged { group: group.clone() };
        if let Err(e) = self.feed.publish(change).await {
            // local sessions are told directly; remote ones resync on reconnect
            warn!(group_id = %group.id, error = %e, "Failed to publish membership change");
        }
    }
}
