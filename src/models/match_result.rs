//! Match result model

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::group::{GroupId, MemberId};
use super::swipe::ItemId;

/// The single consensus outcome of a group, archived after teardown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub group_id: GroupId,
    pub item_id: ItemId,
    /// Membership snapshot at match time
    pub members: BTreeSet<MemberId>,
    pub matched_at: DateTime<Utc>,
}

impl MatchResult {
    /// Only members present at match time may read the record
    pub fn is_visible_to(&self, member_id: &MemberId) -> bool {
        self.members.contains(member_id)
    }
}
