//! Session lifecycle and change notification models

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::group::{Group, GroupId, MemberId};
use super::match_result::MatchResult;
use super::swipe::{ItemId, SwipeEvent};

/// Phase of a live group session: WaitingForMembers -> Active -> Matched -> Closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    WaitingForMembers,
    Active,
    Matched,
    Closed,
}

impl SessionPhase {
    /// Whether swipes are still accepted in this phase
    pub fn accepts_swipes(&self) -> bool {
        matches!(self, SessionPhase::WaitingForMembers | SessionPhase::Active)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::WaitingForMembers => "waiting_for_members",
            SessionPhase::Active => "active",
            SessionPhase::Matched => "matched",
            SessionPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbandonReason {
    MemberLeft { member_id: MemberId },
    IdleTimeout,
    Shutdown,
    /// Another replica removed the group without a match
    ClosedElsewhere,
}

/// How a session reached `Closed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Matched { item_id: ItemId },
    /// Closed without a match; not an error
    Abandoned { reason: AbandonReason },
    /// Closed because the session could not make progress
    Error { message: String },
}

impl SessionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SessionOutcome::Matched { .. } => "matched",
            SessionOutcome::Abandoned { .. } => "abandoned",
            SessionOutcome::Error { .. } => "error",
        }
    }
}

/// Notification published on a group's change feed.
///
/// Delivery is eventually consistent and may repeat; consumers must treat
/// every variant as idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupChange {
    MembershipChanged { group: Group },
    SwipeRecorded { event: SwipeEvent },
    MatchFound { result: MatchResult },
    SessionClosed { group_id: GroupId, outcome: SessionOutcome },
}

impl GroupChange {
    pub fn group_id(&self) -> GroupId {
        match self {
            GroupChange::MembershipChanged { group } => group.id,
            GroupChange::SwipeRecorded { event } => event.group_id,
            GroupChange::MatchFound { result } => result.group_id,
            GroupChange::SessionClosed { group_id, .. } => *group_id,
        }
    }
}

/// Client-facing view of a session's change feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    MembershipChanged {
        group_id: GroupId,
        members: BTreeSet<MemberId>,
        capacity: i32,
    },
    MatchFound { result: MatchResult },
    SessionClosed { group_id: GroupId, outcome: SessionOutcome },
}

impl SessionEvent {
    /// Project a feed change onto what clients see; swipe traffic stays internal
    pub fn from_change(change: GroupChange) -> Option<Self> {
        match change {
            GroupChange::MembershipChanged { group } => Some(SessionEvent::MembershipChanged {
                group_id: group.id,
                members: group.members,
                capacity: group.capacity,
            }),
            GroupChange::SwipeRecorded { .. } => None,
            GroupChange::MatchFound { result } => Some(SessionEvent::MatchFound { result }),
            GroupChange::SessionClosed { group_id, outcome } => {
                Some(SessionEvent::SessionClosed { group_id, outcome })
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::SessionClosed { .. })
    }
}

/// Point-in-time view of a live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub group_id: GroupId,
    pub phase: SessionPhase,
    pub members: BTreeSet<MemberId>,
    pub capacity: i32,
    pub swipes_recorded: usize,
}
