//! Consensus detection over a group's swipe log
//!
//! The detector keeps the latest effective decision per (member, item) and
//! derives each item's approval set from it. It is a pure projection: feeding
//! the same events in any order, any number of times, yields the same state.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::models::{ItemId, MemberId, SwipeEvent};

/// An item every current member approves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub item_id: ItemId,
    /// When the last member's approval landed
    pub qualified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub candidates: usize,
    pub winner: Option<Candidate>,
}

#[derive(Debug, Clone, Default)]
pub struct MatchDetector {
    members: BTreeSet<MemberId>,
    decisions: HashMap<(MemberId, ItemId), SwipeEvent>,
    approvals: HashMap<ItemId, BTreeMap<MemberId, DateTime<Utc>>>,
}

impl MatchDetector {
    pub fn new(members: BTreeSet<MemberId>) -> Self {
        Self {
            members,
            ..Self::default()
        }
    }

    /// Rebuild from a full log
    pub fn rebuild<'a>(
        members: BTreeSet<MemberId>,
        events: impl IntoIterator<Item = &'a SwipeEvent>,
    ) -> Self {
        let mut detector = Self::new(members);
        for event in events {
            detector.apply(event);
        }
        detector
    }

    /// Fold one event in. Returns true when the effective decision changed.
    pub fn apply(&mut self, event: &SwipeEvent) -> bool {
        let key = (event.member_id.clone(), event.item_id);
        if let Some(current) = self.decisions.get(&key) {
            if !event.supersedes(current) {
                return false;
            }
        }

        let approvals = self.approvals.entry(event.item_id).or_default();
        if event.decision.is_approve() {
            approvals.insert(event.member_id.clone(), event.timestamp);
        } else {
            approvals.remove(&event.member_id);
            if approvals.is_empty() {
                self.approvals.remove(&event.item_id);
            }
        }

        self.decisions.insert(key, event.clone());
        true
    }

    /// Replace the consensus threshold. Returns true when it changed.
    pub fn set_members(&mut self, members: BTreeSet<MemberId>) -> bool {
        if self.members == members {
            return false;
        }
        self.members = members;
        true
    }

    pub fn members(&self) -> &BTreeSet<MemberId> {
        &self.members
    }

    /// Members whose latest effective decision on `item_id` is Approve
    pub fn approval_set(&self, item_id: ItemId) -> BTreeSet<MemberId> {
        self.approvals
            .get(&item_id)
            .map(|approvals| approvals.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of effective (member, item) decisions
    pub fn decision_count(&self) -> usize {
        self.decisions.len()
    }

    /// Items `member_id` has decided on, in no particular order
    pub fn decided_by(&self, member_id: &MemberId) -> HashSet<ItemId> {
        self.decisions
            .keys()
            .filter(|(member, _)| member == member_id)
            .map(|(_, item)| *item)
            .collect()
    }

    /// Find the item the whole group agrees on.
    ///
    /// Only current members count, and a group needs at least two of them.
    /// Among several unanimous items the earliest `qualified_at` wins, then
    /// the smaller item id.
    pub fn evaluate(&self) -> Evaluation {
        if self.members.len() < 2 {
            return Evaluation { candidates: 0, winner: None };
        }

        let mut candidates = 0;
        let mut winner: Option<Candidate> = None;

        for (item_id, approvals) in &self.approvals {
            let mut qualified_at: Option<DateTime<Utc>> = None;
            let unanimous = self.members.iter().all(|member| match approvals.get(member) {
                Some(at) => {
                    qualified_at = Some(qualified_at.map_or(*at, |current| current.max(*at)));
                    true
                }
                None => false,
            });

            let Some(qualified_at) = qualified_at.filter(|_| unanimous) else {
                continue;
            };

            candidates += 1;
            let candidate = Candidate { item_id: *item_id, qualified_at };
            winner = match winner {
                Some(best) if (best.qualified_at, best.item_id) <= (qualified_at, *item_id) => Some(best),
                _ => Some(candidate),
            };
        }

        Evaluation { candidates, winner }
    }
}
