//! Per-group session actor
//!
//! Each live group is owned by one task. Commands from the engine and
//! notifications from the change feed are processed one at a time, which
//! makes consensus evaluation linearizable per group: there is exactly one
//! writer that can declare a match.
//!
//! The actor exits on every path through `Closed` (match, abandonment,
//! error, shutdown) and drops its feed subscription when it does.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tracing::{debug, error, warn};

use crate::database::DatabaseService;
use crate::models::{
    AbandonReason, Group, GroupChange, GroupId, GroupStatus, ItemId, MatchResult, MemberId,
    SessionOutcome, SessionPhase, SessionSnapshot, SwipeEvent,
};
use crate::services::feed::{ChangeFeed, FeedStream};
use crate::state::detector::MatchDetector;
use crate::utils::errors::{Result, SwovieError};
use crate::utils::logging::{log_evaluation, log_group_event, log_match, log_session_closed, log_swipe};
use crate::utils::retry::RetryPolicy;

/// Collaborators shared by every session
#[derive(Clone)]
pub struct SessionContext {
    pub database: DatabaseService,
    pub feed: Arc<dyn ChangeFeed>,
    pub retry: RetryPolicy,
    pub command_buffer: usize,
}

pub enum SessionCommand {
    RecordSwipe {
        event: SwipeEvent,
        reply: oneshot::Sender<Result<()>>,
    },
    MembershipChanged {
        group: Group,
    },
    NextItems {
        member_id: MemberId,
        limit: usize,
        reply: oneshot::Sender<Result<Vec<ItemId>>>,
    },
    ResetQueue {
        member_id: MemberId,
        reply: oneshot::Sender<Result<()>>,
    },
    Leave {
        member_id: MemberId,
        reply: oneshot::Sender<Result<()>>,
    },
    Abandon {
        reason: AbandonReason,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    /// Stop serving without touching stored state; the group resumes on restart
    Shutdown,
}

/// Cloneable address of a running session
#[derive(Clone)]
pub struct SessionHandle {
    group_id: GroupId,
    commands: mpsc::Sender<SessionCommand>,
    last_activity: Arc<Mutex<Instant>>,
}

impl SessionHandle {
    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    /// Whether the actor behind this handle has exited
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    pub fn same_session(&self, other: &SessionHandle) -> bool {
        self.commands.same_channel(&other.commands)
    }

    pub fn idle_for(&self) -> Duration {
        let last = match self.last_activity.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        last.elapsed()
    }

    fn closed(&self) -> SwovieError {
        SwovieError::GroupClosed { group_id: self.group_id }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> std::result::Result<T, SwovieError> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(build(tx)).await.map_err(|_| self.closed())?;
        // A dropped reply means the actor tore down with the command queued
        rx.await.map_err(|_| self.closed())
    }

    pub async fn record_swipe(&self, event: SwipeEvent) -> Result<()> {
        self.request(|reply| SessionCommand::RecordSwipe { event, reply }).await?
    }

    pub async fn membership_changed(&self, group: Group) {
        let _ = self.commands.send(SessionCommand::MembershipChanged { group }).await;
    }

    pub async fn next_items(&self, member_id: MemberId, limit: usize) -> Result<Vec<ItemId>> {
        self.request(|reply| SessionCommand::NextItems { member_id, limit, reply })
            .await?
    }

    pub async fn reset_queue(&self, member_id: MemberId) -> Result<()> {
        self.request(|reply| SessionCommand::ResetQueue { member_id, reply }).await?
    }

    pub async fn leave(&self, member_id: MemberId) -> Result<()> {
        self.request(|reply| SessionCommand::Leave { member_id, reply }).await?
    }

    pub async fn abandon(&self, reason: AbandonReason) {
        let _ = self.commands.send(SessionCommand::Abandon { reason }).await;
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
    }
}

/// Per-member position in the deck
#[derive(Debug, Default)]
struct MemberQueue {
    cursor: usize,
    /// Items decided since the last reset
    seen: HashSet<ItemId>,
}

impl MemberQueue {
    fn next(&mut self, deck: &[ItemId], limit: usize) -> Vec<ItemId> {
        while self.cursor < deck.len() && self.seen.contains(&deck[self.cursor]) {
            self.cursor += 1;
        }
        deck[self.cursor..]
            .iter()
            .filter(|item| !self.seen.contains(item))
            .take(limit)
            .copied()
            .collect()
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.seen.clear();
    }
}

fn phase_for(group: &Group) -> SessionPhase {
    if group.is_full() {
        SessionPhase::Active
    } else {
        SessionPhase::WaitingForMembers
    }
}

pub struct SessionActor {
    ctx: SessionContext,
    group: Group,
    phase: SessionPhase,
    detector: MatchDetector,
    deck: Vec<ItemId>,
    queues: HashMap<MemberId, MemberQueue>,
    commands: mpsc::Receiver<SessionCommand>,
    changes: FeedStream,
    last_activity: Arc<Mutex<Instant>>,
}

impl SessionActor {
    /// Build an actor from loaded state. `changes` must have been subscribed
    /// before `swipes` was read so no notification falls in between.
    pub fn new(
        ctx: SessionContext,
        group: Group,
        swipes: &[SwipeEvent],
        deck: Vec<ItemId>,
        changes: FeedStream,
    ) -> (SessionHandle, SessionActor) {
        let (tx, rx) = mpsc::channel(ctx.command_buffer.max(1));
        let last_activity = Arc::new(Mutex::new(Instant::now()));

        let handle = SessionHandle {
            group_id: group.id,
            commands: tx,
            last_activity: last_activity.clone(),
        };

        let actor = SessionActor {
            phase: phase_for(&group),
            detector: MatchDetector::rebuild(group.members.clone(), swipes),
            group,
            ctx,
            deck,
            queues: HashMap::new(),
            commands: rx,
            changes,
            last_activity,
        };

        (handle, actor)
    }

    pub async fn run(mut self) -> SessionOutcome {
        let group_id = self.group.id;
        debug!(group_id = %group_id, phase = %self.phase, "Session started");

        let outcome = match self.evaluate().await {
            Some(outcome) => outcome,
            None => self.event_loop().await,
        };

        log_session_closed(group_id, &outcome);
        outcome
    }

    async fn event_loop(&mut self) -> SessionOutcome {
        loop {
            let step = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    // every handle dropped; nobody can reach this session
                    None => Some(SessionOutcome::Abandoned { reason: AbandonReason::Shutdown }),
                },
                change = self.changes.next() => match change {
                    Some(Ok(change)) => self.handle_change(change).await,
                    Some(Err(e)) => {
                        warn!(group_id = %self.group.id, error = %e, "Change feed interrupted, resyncing");
                        self.resync().await
                    }
                    None => {
                        warn!(group_id = %self.group.id, "Change feed ended, resyncing");
                        self.resync().await
                    }
                },
            };

            if let Some(outcome) = step {
                return outcome;
            }
        }
    }

    fn touch(&self) {
        match self.last_activity.lock() {
            Ok(mut guard) => *guard = Instant::now(),
            Err(poisoned) => *poisoned.into_inner() = Instant::now(),
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            group_id: self.group.id,
            phase: self.phase,
            members: self.group.members.clone(),
            capacity: self.group.capacity,
            swipes_recorded: self.detector.decision_count(),
        }
    }

    fn require_member(&self, member_id: &MemberId) -> Result<()> {
        if self.group.is_member(member_id) {
            Ok(())
        } else {
            Err(SwovieError::NotAMember {
                group_id: self.group.id,
                member_id: member_id.clone(),
            })
        }
    }

    fn queue_for(&mut self, member_id: &MemberId) -> &mut MemberQueue {
        let detector = &self.detector;
        self.queues.entry(member_id.clone()).or_insert_with(|| MemberQueue {
            cursor: 0,
            seen: detector.decided_by(member_id),
        })
    }

    async fn handle_command(&mut self, command: SessionCommand) -> Option<SessionOutcome> {
        match command {
            SessionCommand::RecordSwipe { event, reply } => {
                self.touch();
                let (result, step) = self.record_swipe(event).await;
                let _ = reply.send(result);
                step
            }
            SessionCommand::MembershipChanged { group } => {
                self.touch();
                self.on_membership(group.members).await
            }
            SessionCommand::NextItems { member_id, limit, reply } => {
                self.touch();
                let (checked, step) = self.confirm_member(&member_id).await;
                let _ = reply.send(checked.map(|_| self.next_items(&member_id, limit)));
                step
            }
            SessionCommand::ResetQueue { member_id, reply } => {
                self.touch();
                let (checked, step) = self.confirm_member(&member_id).await;
                let _ = reply.send(checked.map(|_| self.queue_for(&member_id).reset()));
                step
            }
            SessionCommand::Leave { member_id, reply } => {
                let (checked, step) = self.confirm_member(&member_id).await;
                if let Err(e) = checked {
                    let _ = reply.send(Err(e));
                    return step;
                }
                log_group_event(self.group.id, "left", Some(&member_id), None);
                let outcome = self
                    .teardown(
                        SessionOutcome::Abandoned {
                            reason: AbandonReason::MemberLeft { member_id },
                        },
                        true,
                    )
                    .await;
                let _ = reply.send(Ok(()));
                Some(outcome)
            }
            SessionCommand::Abandon { reason } => {
                Some(self.teardown(SessionOutcome::Abandoned { reason }, true).await)
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
                None
            }
            SessionCommand::Shutdown => {
                Some(SessionOutcome::Abandoned { reason: AbandonReason::Shutdown })
            }
        }
    }

    async fn handle_change(&mut self, change: GroupChange) -> Option<SessionOutcome> {
        if change.group_id() != self.group.id {
            return None;
        }

        match change {
            GroupChange::MembershipChanged { group } => {
                self.touch();
                self.on_membership(group.members).await
            }
            GroupChange::SwipeRecorded { event } => {
                // Redelivery and our own echoes fold in as no-ops
                let changed = self.detector.apply(&event);
                if !changed {
                    return None;
                }
                self.touch();
                self.queue_for(&event.member_id).seen.insert(event.item_id);
                self.evaluate().await
            }
            GroupChange::MatchFound { result } => {
                // Another replica declared the match; finish its teardown idempotently
                Some(self.conclude(result).await)
            }
            GroupChange::SessionClosed { outcome, .. } => {
                self.phase = SessionPhase::Closed;
                self.ctx.feed.close(self.group.id).await;
                Some(outcome)
            }
        }
    }

    async fn record_swipe(&mut self, event: SwipeEvent) -> (Result<()>, Option<SessionOutcome>) {
        if !self.phase.accepts_swipes() {
            return (Err(SwovieError::GroupClosed { group_id: self.group.id }), None);
        }
        let (checked, step) = self.confirm_member(&event.member_id).await;
        if let Err(e) = checked {
            return (Err(e), step);
        }

        let swipes = self.ctx.database.swipes.clone();
        if let Err(e) = self.ctx.retry.run("append_swipe", || swipes.append(&event)).await {
            let message = e.to_string();
            return (Err(e), Some(self.fail(message).await));
        }

        log_swipe(&event);
        self.publish(GroupChange::SwipeRecorded { event: event.clone() }).await;

        self.queue_for(&event.member_id).seen.insert(event.item_id);
        let step = if self.detector.apply(&event) {
            self.evaluate().await
        } else {
            None
        };

        (Ok(()), step)
    }

    /// Membership check that tolerates a join not yet seen on the feed.
    ///
    /// On a miss the stored group is reloaded and merged before rejecting,
    /// since another replica may have committed the join already. Merging can
    /// fill the group and conclude the session, hence the optional outcome.
    async fn confirm_member(&mut self, member_id: &MemberId) -> (Result<()>, Option<SessionOutcome>) {
        if self.group.is_member(member_id) {
            return (Ok(()), None);
        }

        let group_id = self.group.id;
        let groups = self.ctx.database.groups.clone();
        match self.ctx.retry.run("reload_group", || groups.get_group(group_id)).await {
            Ok(Some(stored)) if stored.is_member(member_id) => {
                debug!(group_id = %group_id, member_id = %member_id, "Member found in store ahead of feed");
                if let Some(outcome) = self.on_membership(stored.members).await {
                    return (Err(SwovieError::GroupClosed { group_id }), Some(outcome));
                }
            }
            Ok(_) => {}
            Err(e) => return (Err(e), None),
        }

        (self.require_member(member_id), None)
    }

    fn next_items(&mut self, member_id: &MemberId, limit: usize) -> Vec<ItemId> {
        if self.phase != SessionPhase::Active {
            // passive until the group is full
            return Vec::new();
        }

        let deck = std::mem::take(&mut self.deck);
        let items = self.queue_for(member_id).next(&deck, limit);
        self.deck = deck;
        items
    }

    /// Membership only grows while a session lives, so stale notifications
    /// merge in without losing anyone.
    async fn on_membership(&mut self, members: BTreeSet<MemberId>) -> Option<SessionOutcome> {
        let merged: BTreeSet<MemberId> = self.group.members.union(&members).cloned().collect();
        if merged == self.group.members {
            return None;
        }

        self.group.members = merged;
        self.detector.set_members(self.group.members.clone());

        let previous = self.phase;
        self.phase = phase_for(&self.group);
        if previous != self.phase {
            log_group_event(self.group.id, "active", None, None);
        }

        self.evaluate().await
    }

    async fn evaluate(&mut self) -> Option<SessionOutcome> {
        if self.phase != SessionPhase::Active {
            return None;
        }

        let evaluation = self.detector.evaluate();
        log_evaluation(
            self.group.id,
            evaluation.candidates,
            evaluation.winner.map(|candidate| candidate.item_id),
        );

        let winner = evaluation.winner?;
        let result = MatchResult {
            group_id: self.group.id,
            item_id: winner.item_id,
            members: self.detector.members().clone(),
            matched_at: Utc::now(),
        };

        Some(self.conclude(result).await)
    }

    /// Archive the result exactly once, then tear the group down.
    ///
    /// Only the replica whose insert won announces the match; one that adopts
    /// an archived result closes quietly and leaves the feed to the winner.
    async fn conclude(&mut self, result: MatchResult) -> SessionOutcome {
        self.phase = SessionPhase::Matched;
        let group_id = self.group.id;
        let matches = self.ctx.database.matches.clone();

        let inserted = match self.ctx.retry.run("record_match", || matches.record(&result)).await {
            Ok(inserted) => inserted,
            Err(e) => return self.fail(e.to_string()).await,
        };

        let result = if inserted {
            log_match(&result);
            result
        } else {
            match self.ctx.retry.run("find_match", || matches.find_by_group(group_id)).await {
                Ok(Some(existing)) => existing,
                Ok(None) => result,
                Err(e) => return self.fail(e.to_string()).await,
            }
        };

        let groups = self.ctx.database.groups.clone();
        if let Err(e) = self
            .ctx
            .retry
            .run("mark_matched", || {
                groups.transition_status(group_id, GroupStatus::Open, GroupStatus::Matched)
            })
            .await
        {
            warn!(group_id = %group_id, error = %e, "Failed to mark group matched");
        }

        if inserted {
            self.publish(GroupChange::MatchFound { result: result.clone() }).await;
        }
        self.teardown(SessionOutcome::Matched { item_id: result.item_id }, inserted)
            .await
    }

    /// Close the group in the store and drop its live state. With `announce`
    /// subscribers are told and the group's feed channel is released.
    async fn teardown(&mut self, outcome: SessionOutcome, announce: bool) -> SessionOutcome {
        let group_id = self.group.id;
        let from = match outcome {
            SessionOutcome::Matched { .. } => GroupStatus::Matched,
            _ => GroupStatus::Open,
        };

        let groups = self.ctx.database.groups.clone();
        let swipes = self.ctx.database.swipes.clone();

        if let Err(e) = self
            .ctx
            .retry
            .run("close_group", || groups.transition_status(group_id, from, GroupStatus::Closed))
            .await
        {
            warn!(group_id = %group_id, error = %e, "Failed to mark group closed");
        }

        match self.ctx.retry.run("delete_swipes", || swipes.delete_for_group(group_id)).await {
            Ok(removed) => debug!(group_id = %group_id, removed = removed, "Swipe log removed"),
            Err(e) => error!(group_id = %group_id, error = %e, "Failed to remove swipe log"),
        }

        if let Err(e) = self.ctx.retry.run("delete_group", || groups.delete_group(group_id)).await {
            error!(group_id = %group_id, error = %e, "Failed to remove group");
        }

        if announce {
            self.close(outcome).await
        } else {
            self.phase = SessionPhase::Closed;
            outcome
        }
    }

    /// Give up after the store stayed unavailable. Stored state is left for
    /// an operator; the status is moved to Closed if the store answers.
    async fn fail(&mut self, message: String) -> SessionOutcome {
        let group_id = self.group.id;
        let groups = &self.ctx.database.groups;

        let closed = match groups
            .transition_status(group_id, GroupStatus::Open, GroupStatus::Closed)
            .await
        {
            Ok(false) => groups
                .transition_status(group_id, GroupStatus::Matched, GroupStatus::Closed)
                .await,
            other => other,
        };
        if let Err(e) = closed {
            warn!(group_id = %group_id, error = %e, "Could not mark failed group closed");
        }

        self.close(SessionOutcome::Error { message }).await
    }

    async fn close(&mut self, outcome: SessionOutcome) -> SessionOutcome {
        self.phase = SessionPhase::Closed;
        self.publish(GroupChange::SessionClosed {
            group_id: self.group.id,
            outcome: outcome.clone(),
        })
        .await;
        self.ctx.feed.close(self.group.id).await;
        outcome
    }

    async fn publish(&mut self, change: GroupChange) {
        let feed = self.ctx.feed.clone();
        let published = self
            .ctx
            .retry
            .run("publish_change", || {
                let feed = feed.clone();
                let change = change.clone();
                async move { feed.publish(change).await.map_err(SwovieError::from) }
            })
            .await;

        if let Err(e) = published {
            warn!(group_id = %self.group.id, error = %e, "Failed to publish group change");
        }
    }

    /// Rebuild from the store after the feed dropped notifications.
    ///
    /// Subscribes first, then reloads, so nothing published in between is lost.
    async fn resync(&mut self) -> Option<SessionOutcome> {
        let group_id = self.group.id;
        let feed = self.ctx.feed.clone();

        let changes = self
            .ctx
            .retry
            .run("resubscribe", || {
                let feed = feed.clone();
                async move { feed.subscribe(group_id).await.map_err(SwovieError::from) }
            })
            .await;
        match changes {
            Ok(changes) => self.changes = changes,
            Err(e) => return Some(self.fail(e.to_string()).await),
        }

        let groups = self.ctx.database.groups.clone();
        let stored = match self.ctx.retry.run("reload_group", || groups.get_group(group_id)).await {
            Ok(stored) => stored,
            Err(e) => return Some(self.fail(e.to_string()).await),
        };

        let stored = match stored {
            Some(group) if group.is_open() => group,
            _ => return Some(self.closed_elsewhere().await),
        };

        let swipes = self.ctx.database.swipes.clone();
        let log = match self.ctx.retry.run("reload_swipes", || swipes.list_for_group(group_id)).await {
            Ok(log) => log,
            Err(e) => return Some(self.fail(e.to_string()).await),
        };

        let members: BTreeSet<MemberId> = self.group.members.union(&stored.members).cloned().collect();
        self.detector = MatchDetector::rebuild(members.clone(), &log);
        self.group.members = members;
        self.phase = phase_for(&self.group);
        debug!(group_id = %group_id, swipes = log.len(), "Session resynced from store");

        self.evaluate().await
    }

    /// The group moved on without us: matched or removed by another replica
    async fn closed_elsewhere(&mut self) -> SessionOutcome {
        let group_id = self.group.id;
        let matches = self.ctx.database.matches.clone();

        match self.ctx.retry.run("find_match", || matches.find_by_group(group_id)).await {
            Ok(Some(result)) => self.conclude(result).await,
            Ok(None) => {
                // removed without a match, so another replica abandoned it
                self.phase = SessionPhase::Closed;
                self.ctx.feed.close(group_id).await;
                SessionOutcome::Abandoned { reason: AbandonReason::ClosedElsewhere }
            }
            Err(e) => self.fail(e.to_string()).await,
        }
    }
}
