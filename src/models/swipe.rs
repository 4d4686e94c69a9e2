//! Swipe event model

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::group::{GroupId, MemberId};

/// Catalog item (movie) identifier. The engine never sees item metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn is_approve(&self) -> bool {
        matches!(self, Decision::Approve)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approve" => Some(Decision::Approve),
            "reject" => Some(Decision::Reject),
            _ => None,
        }
    }
}

impl From<bool> for Decision {
    /// Right swipe (liked) is an approval
    fn from(is_liked: bool) -> Self {
        if is_liked {
            Decision::Approve
        } else {
            Decision::Reject
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeEvent {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub item_id: ItemId,
    pub decision: Decision,
    pub timestamp: DateTime<Utc>,
}

impl SwipeEvent {
    /// Last-write-wins ordering between two decisions for the same
    /// (group, member, item) triple.
    ///
    /// The later timestamp wins. On an exact timestamp tie a Reject outranks
    /// an Approve, so concurrent conflicting writes never manufacture consent.
    pub fn supersedes(&self, other: &SwipeEvent) -> bool {
        match self.timestamp.cmp(&other.timestamp) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => {
                self.decision == Decision::Reject && other.decision == Decision::Approve
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSwipeRequest {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub item_id: ItemId,
    pub decision: Decision,
    /// Client-observed decision time; the engine stamps `Utc::now()` when absent
    pub timestamp: Option<DateTime<Utc>>,
}

impl RecordSwipeRequest {
    pub fn into_event(self) -> SwipeEvent {
        SwipeEvent {
            group_id: self.group_id,
            member_id: self.member_id,
            item_id: self.item_id,
            decision: self.decision,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}
