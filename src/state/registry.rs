//! Session registry and the engine's client-facing surface
//!
//! Routes every call to the owning session actor, spawning one on demand for
//! groups that exist in the store but are not served by this process yet
//! (after a restart, or when another replica created the group).

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::Stream;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::database::DatabaseService;
use crate::models::{
    AbandonReason, CreateGroupRequest, Group, GroupId, ItemId, JoinGroupRequest, JoinOutcome,
    MatchResult, MemberId, RecordSwipeRequest, SessionEvent, SessionOutcome, SessionSnapshot,
    SwipeEvent,
};
use crate::services::catalog::{prepare_deck, ItemCatalog};
use crate::services::feed::{ChangeFeed, FeedError};
use crate::services::membership::MembershipCoordinator;
use crate::state::session::{SessionActor, SessionContext, SessionHandle};
use crate::utils::errors::{Result, SwovieError};
use crate::utils::helpers::validate_member_id;
use crate::utils::retry::RetryPolicy;

/// Client view of one session's notifications. Ends after `SessionClosed`.
pub type SessionStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send>>;

/// Most history entries returned per query
pub const HISTORY_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct Engine {
    ctx: SessionContext,
    catalog: Arc<dyn ItemCatalog>,
    membership: MembershipCoordinator,
    config: EngineConfig,
    sessions: Arc<DashMap<GroupId, SessionHandle>>,
    /// Outcomes of sessions this process closed
    closed: Arc<DashMap<GroupId, SessionOutcome>>,
}

impl Engine {
    pub fn new(
        database: DatabaseService,
        feed: Arc<dyn ChangeFeed>,
        catalog: Arc<dyn ItemCatalog>,
        config: EngineConfig,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self::with_retry(database, feed, catalog, config, retry)
    }

    pub fn with_retry(
        database: DatabaseService,
        feed: Arc<dyn ChangeFeed>,
        catalog: Arc<dyn ItemCatalog>,
        config: EngineConfig,
        retry: RetryPolicy,
    ) -> Self {
        let membership = MembershipCoordinator::new(database.groups.clone(), feed.clone(), retry);
        let ctx = SessionContext {
            database,
            feed,
            retry,
            command_buffer: config.command_buffer,
        };

        Self {
            ctx,
            catalog,
            membership,
            config,
            sessions: Arc::new(DashMap::new()),
            closed: Arc::new(DashMap::new()),
        }
    }

    pub async fn create_group(&self, request: CreateGroupRequest) -> Result<Group> {
        let group = self.membership.create_group(request).await?;
        self.start_session(group.clone(), Vec::new()).await?;
        Ok(group)
    }

    pub async fn join_group(&self, request: JoinGroupRequest) -> Result<JoinOutcome> {
        let outcome = self.membership.join_group(request).await?;
        let group = outcome.group().clone();

        match self.sessions.get(&group.id).map(|entry| entry.value().clone()) {
            Some(handle) => handle.membership_changed(group).await,
            None => {
                self.ensure_session(group.id).await?;
            }
        }

        Ok(outcome)
    }

    pub async fn record_swipe(&self, request: RecordSwipeRequest) -> Result<()> {
        validate_member_id(request.member_id.as_str())?;
        let handle = self.ensure_session(request.group_id).await?;
        handle.record_swipe(request.into_event()).await
    }

    /// Stream of membership changes, the match, and the final close.
    ///
    /// The stream opens with the current membership and ends after
    /// `SessionClosed`; the feed subscription behind it is released then.
    pub async fn subscribe_to_session(&self, group_id: GroupId) -> Result<SessionStream> {
        let handle = self.ensure_session(group_id).await?;
        let mut changes = self.ctx.feed.subscribe(group_id).await?;

        let snapshot = match handle.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // session closed between the two calls
                self.ctx.feed.close(group_id).await;
                return Err(e);
            }
        };

        let stream = async_stream::stream! {
            yield SessionEvent::MembershipChanged {
                group_id,
                members: snapshot.members,
                capacity: snapshot.capacity,
            };

            while let Some(change) = changes.next().await {
                let change = match change {
                    Ok(change) => change,
                    Err(FeedError::Lagged(skipped)) => {
                        warn!(group_id = %group_id, skipped = skipped, "Session subscriber lagged");
                        continue;
                    }
                    Err(e) => {
                        warn!(group_id = %group_id, error = %e, "Session subscription lost");
                        break;
                    }
                };

                if let Some(event) = SessionEvent::from_change(change) {
                    let terminal = event.is_terminal();
                    yield event;
                    if terminal {
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Next items for `member_id` to swipe on. Empty while the group is
    /// still filling up, and once the member has been through the whole deck.
    pub async fn next_items(
        &self,
        group_id: GroupId,
        member_id: &MemberId,
        limit: Option<usize>,
    ) -> Result<Vec<ItemId>> {
        let handle = self.ensure_session(group_id).await?;
        let limit = limit.unwrap_or(self.config.queue_page_size);
        handle.next_items(member_id.clone(), limit).await
    }

    /// Start the member's deck over from the top
    pub async fn reset_queue(&self, group_id: GroupId, member_id: &MemberId) -> Result<()> {
        let handle = self.ensure_session(group_id).await?;
        handle.reset_queue(member_id.clone()).await
    }

    /// A member walking away abandons the whole session
    pub async fn leave_group(&self, group_id: GroupId, member_id: &MemberId) -> Result<()> {
        let handle = self.ensure_session(group_id).await?;
        handle.leave(member_id.clone()).await
    }

    pub async fn session_state(&self, group_id: GroupId) -> Result<SessionSnapshot> {
        let handle = self.ensure_session(group_id).await?;
        handle.snapshot().await
    }

    /// Matches the member took part in, newest first
    pub async fn match_history(&self, member_id: &MemberId) -> Result<Vec<MatchResult>> {
        validate_member_id(member_id.as_str())?;
        let matches = self.ctx.database.matches.clone();
        self.ctx
            .retry
            .run("match_history", || matches.list_for_member(member_id, HISTORY_LIMIT))
            .await
    }

    /// The group's result, readable only by members present at match time
    pub async fn match_for_group(
        &self,
        group_id: GroupId,
        member_id: &MemberId,
    ) -> Result<Option<MatchResult>> {
        let matches = self.ctx.database.matches.clone();
        let result = self
            .ctx
            .retry
            .run("match_for_group", || matches.find_by_group(group_id))
            .await?;

        match result {
            Some(result) if !result.is_visible_to(member_id) => Err(SwovieError::NotAMember {
                group_id,
                member_id: member_id.clone(),
            }),
            other => Ok(other),
        }
    }

    /// How a session served by this process ended, if it has
    pub fn outcome(&self, group_id: GroupId) -> Option<SessionOutcome> {
        self.closed.get(&group_id).map(|entry| entry.value().clone())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Start sessions for every Open group in the store
    pub async fn resume_open_groups(&self) -> Result<usize> {
        let groups = self.ctx.database.groups.clone();
        let open = self.ctx.retry.run("list_open_groups", || groups.list_open_groups()).await?;

        let mut resumed = 0;
        for group in open {
            match self.ensure_session(group.id).await {
                Ok(_) => resumed += 1,
                Err(e) => warn!(group_id = %group.id, error = %e, "Failed to resume session"),
            }
        }

        info!(resumed = resumed, "Open group sessions resumed");
        Ok(resumed)
    }

    /// Abandon every session idle for at least the configured timeout
    pub async fn sweep_idle(&self) -> usize {
        let timeout = Duration::from_secs(self.config.idle_timeout_seconds);
        let idle: Vec<SessionHandle> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for() >= timeout)
            .map(|entry| entry.value().clone())
            .collect();

        for handle in &idle {
            debug!(group_id = %handle.group_id(), "Abandoning idle session");
            handle.abandon(AbandonReason::IdleTimeout).await;
        }

        idle.len()
    }

    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let engine = self.clone();
        let period = Duration::from_secs(self.config.sweep_interval_seconds.max(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let swept = engine.sweep_idle().await;
                if swept > 0 {
                    info!(swept = swept, "Idle sessions abandoned");
                }
            }
        })
    }

    /// Stop every session without touching stored state
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();
        for handle in &handles {
            handle.shutdown().await;
        }
        info!(sessions = handles.len(), "Engine shut down");
    }

    /// Route to the live session, or load one from the store
    async fn ensure_session(&self, group_id: GroupId) -> Result<SessionHandle> {
        if let Some(handle) = self.sessions.get(&group_id) {
            return Ok(handle.value().clone());
        }
        if self.closed.contains_key(&group_id) {
            return Err(SwovieError::GroupClosed { group_id });
        }

        let groups = self.ctx.database.groups.clone();
        let group = self.ctx.retry.run("load_group", || groups.get_group(group_id)).await?;

        match group {
            Some(group) if group.is_open() => {
                let swipes = self.ctx.database.swipes.clone();
                let log = self
                    .ctx
                    .retry
                    .run("load_swipes", || swipes.list_for_group(group_id))
                    .await?;
                self.start_session(group, log).await
            }
            Some(_) => Err(SwovieError::GroupClosed { group_id }),
            None => {
                // a matched group's history record outlives it
                let matches = self.ctx.database.matches.clone();
                let archived = self
                    .ctx
                    .retry
                    .run("find_match", || matches.find_by_group(group_id))
                    .await?;
                if archived.is_some() {
                    Err(SwovieError::GroupClosed { group_id })
                } else {
                    Err(SwovieError::NotFound { group_id })
                }
            }
        }
    }

    async fn start_session(
        &self,
        group: Group,
        swipes: Vec<SwipeEvent>,
    ) -> Result<SessionHandle> {
        let group_id = group.id;
        let changes = self.ctx.feed.subscribe(group_id).await?;
        let catalog = self.catalog.clone();
        let deck = self.ctx.retry.run("load_deck", || catalog.deck(group_id)).await?;

        let (handle, actor) =
            SessionActor::new(self.ctx.clone(), group, &swipes, prepare_deck(deck), changes);

        let handle = match self.sessions.entry(group_id) {
            // lost a race with a concurrent loader; its session wins
            Entry::Occupied(existing) => return Ok(existing.get().clone()),
            Entry::Vacant(slot) => slot.insert(handle).value().clone(),
        };

        let sessions = self.sessions.clone();
        let closed = self.closed.clone();
        let registered = handle.clone();
        tokio::spawn(async move {
            let outcome = actor.run().await;
            if !matches!(outcome, SessionOutcome::Abandoned { reason: AbandonReason::Shutdown }) {
                closed.insert(group_id, outcome);
            }
            sessions.remove_if(&group_id, |_, current| current.same_session(&registered));
        });

        Ok(handle)
    }
}
