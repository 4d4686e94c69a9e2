//! In-process store backend
//!
//! Backs every store trait with mutex-guarded maps. Used by tests and by
//! single-node deployments that do not need durability across restarts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::database::store::{GroupStore, MatchHistoryStore, SwipeStore};
use crate::models::{
    Group, GroupId, GroupStatus, JoinGroupRequest, JoinOutcome, MatchResult, MemberId, SwipeEvent,
};
use crate::utils::errors::{Result, SwovieError};
use crate::utils::helpers::credentials_match;

#[derive(Default)]
pub struct MemoryStore {
    groups: Mutex<HashMap<GroupId, Group>>,
    swipes: Mutex<HashMap<GroupId, Vec<SwipeEvent>>>,
    history: Mutex<HashMap<GroupId, MatchResult>>,
    failures: AtomicU32,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| SwovieError::StoreUnavailable("memory store lock poisoned".to_string()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` store calls fail with `StoreUnavailable`
    pub fn inject_failures(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        let consumed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match consumed {
            Ok(_) => Err(SwovieError::StoreUnavailable("injected failure".to_string())),
            Err(_) => Ok(()),
        }
    }

    /// Number of swipe events currently held for a group
    pub fn swipe_count(&self, group_id: GroupId) -> usize {
        self.swipes
            .lock()
            .map(|swipes| swipes.get(&group_id).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn create_group(&self, group: &Group) -> Result<()> {
        self.check_available()?;
        let mut groups = lock(&self.groups)?;
        match groups.get(&group.id) {
            // a retried create after a lost acknowledgement
            Some(existing) if existing == group => Ok(()),
            Some(_) => Err(SwovieError::InvalidParameters(format!(
                "group {} already exists",
                group.id
            ))),
            None => {
                groups.insert(group.id, group.clone());
                Ok(())
            }
        }
    }

    async fn get_group(&self, group_id: GroupId) -> Result<Option<Group>> {
        self.check_available()?;
        Ok(lock(&self.groups)?.get(&group_id).cloned())
    }

    async fn join_group(&self, request: &JoinGroupRequest) -> Result<JoinOutcome> {
        self.check_available()?;
        let group_id = request.group_id;
        let mut groups = lock(&self.groups)?;

        let group = match groups.get_mut(&group_id) {
            Some(group) if group.is_open() => group,
            _ => return Err(SwovieError::NotFound { group_id }),
        };

        if !credentials_match(&group.credential, &request.credential) {
            return Err(SwovieError::InvalidCredential { group_id });
        }

        if group.is_member(&request.member_id) {
            return Ok(JoinOutcome::AlreadyMember(group.clone()));
        }

        if group.is_full() {
            return Err(SwovieError::Full { group_id, capacity: group.capacity });
        }

        group.members.insert(request.member_id.clone());
        Ok(JoinOutcome::Joined(group.clone()))
    }

    async fn transition_status(
        &self,
        group_id: GroupId,
        from: GroupStatus,
        to: GroupStatus,
    ) -> Result<bool> {
        self.check_available()?;
        if !from.can_transition_to(to) {
            return Err(SwovieError::InvalidParameters(format!(
                "illegal status transition {} -> {}",
                from, to
            )));
        }

        let mut groups = lock(&self.groups)?;
        match groups.get_mut(&group_id) {
            Some(group) if group.status == from => {
                group.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_group(&self, group_id: GroupId) -> Result<()> {
        self.check_available()?;
        lock(&self.groups)?.remove(&group_id);
        lock(&self.swipes)?.remove(&group_id);
        Ok(())
    }

    async fn list_open_groups(&self) -> Result<Vec<Group>> {
        self.check_available()?;
        let mut open: Vec<Group> = lock(&self.groups)?
            .values()
            .filter(|group| group.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|group| group.created_at);
        Ok(open)
    }
}

#[async_trait]
impl SwipeStore for MemoryStore {
    async fn append(&self, event: &SwipeEvent) -> Result<()> {
        self.check_available()?;
        let mut swipes = lock(&self.swipes)?;
        let log = swipes.entry(event.group_id).or_default();
        if !log.contains(event) {
            log.push(event.clone());
        }
        Ok(())
    }

    async fn list_for_group(&self, group_id: GroupId) -> Result<Vec<SwipeEvent>> {
        self.check_available()?;
        Ok(lock(&self.swipes)?.get(&group_id).cloned().unwrap_or_default())
    }

    async fn delete_for_group(&self, group_id: GroupId) -> Result<u64> {
        self.check_available()?;
        let removed = lock(&self.swipes)?.remove(&group_id);
        Ok(removed.map_or(0, |log| log.len() as u64))
    }
}

#[async_trait]
impl MatchHistoryStore for MemoryStore {
    async fn record(&self, result: &MatchResult) -> Result<bool> {
        self.check_available()?;
        let mut history = lock(&self.history)?;
        if history.contains_key(&result.group_id) {
            return Ok(false);
        }
        history.insert(result.group_id, result.clone());
        Ok(true)
    }

    async fn find_by_group(&self, group_id: GroupId) -> Result<Option<MatchResult>> {
        self.check_available()?;
        Ok(lock(&self.history)?.get(&group_id).cloned())
    }

    async fn list_for_member(&self, member_id: &MemberId, limit: i64) -> Result<Vec<MatchResult>> {
        self.check_available()?;
        let mut results: Vec<MatchResult> = lock(&self.history)?
            .values()
            .filter(|result| result.is_visible_to(member_id))
            .cloned()
            .collect();
        results.sort_by(|a, b| b.matched_at.cmp(&a.matched_at));
        results.truncate(limit.max(0) as usize);
        Ok(results)
    }
}
