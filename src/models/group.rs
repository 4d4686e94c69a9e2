//! Group model

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Smallest group that can ever reach consensus
pub const MIN_CAPACITY: i32 = 2;
/// Largest group a session will serve
pub const MAX_CAPACITY: i32 = 10;
/// Shortest accepted shared credential, in characters
pub const MIN_CREDENTIAL_LENGTH: usize = 6;

/// Opaque group identifier, generated at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub Uuid);

impl GroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Pre-authenticated user identity handed to the engine by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle of a stored group. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Open,
    Matched,
    Closed,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Open => "open",
            GroupStatus::Matched => "matched",
            GroupStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(GroupStatus::Open),
            "matched" => Some(GroupStatus::Matched),
            "closed" => Some(GroupStatus::Closed),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` respects Open -> Matched -> Closed
    pub fn can_transition_to(&self, next: GroupStatus) -> bool {
        matches!(
            (self, next),
            (GroupStatus::Open, GroupStatus::Matched)
                | (GroupStatus::Open, GroupStatus::Closed)
                | (GroupStatus::Matched, GroupStatus::Closed)
        )
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub capacity: i32,
    /// Shared secret required to join; never leaves the process
    #[serde(skip_serializing, default)]
    pub credential: String,
    pub members: BTreeSet<MemberId>,
    pub creator: MemberId,
    pub status: GroupStatus,
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// A fresh Open group whose only member is its creator
    pub fn open(capacity: i32, credential: impl Into<String>, creator: MemberId) -> Self {
        Self {
            id: GroupId::new(),
            capacity,
            credential: credential.into(),
            members: std::iter::once(creator.clone()).collect(),
            creator,
            status: GroupStatus::Open,
            created_at: Utc::now(),
        }
    }

    pub fn is_member(&self, member_id: &MemberId) -> bool {
        self.members.contains(member_id)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity as usize
    }

    pub fn is_open(&self) -> bool {
        self.status == GroupStatus::Open
    }

    pub fn remaining_slots(&self) -> usize {
        (self.capacity as usize).saturating_sub(self.members.len())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    pub capacity: i32,
    pub credential: String,
    pub creator: MemberId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGroupRequest {
    pub group_id: GroupId,
    pub credential: String,
    pub member_id: MemberId,
}

/// Result of an atomic add-if-room against the group store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Member was admitted; membership grew by one
    Joined(Group),
    /// Member was already present; nothing changed
    AlreadyMember(Group),
}

impl JoinOutcome {
    pub fn group(&self) -> &Group {
        match self {
            JoinOutcome::Joined(group) | JoinOutcome::AlreadyMember(group) => group,
        }
    }

    pub fn into_group(self) -> Group {
        match self {
            JoinOutcome::Joined(group) | JoinOutcome::AlreadyMember(group) => group,
        }
    }
}
