//! Data models module
//!
//! This module contains all data structures used throughout the engine

pub mod group;
pub mod swipe;
pub mod match_result;
pub mod session;

// Re-export commonly used models
pub use group::{Group, GroupId, MemberId, GroupStatus, CreateGroupRequest, JoinGroupRequest, JoinOutcome};
pub use swipe::{SwipeEvent, ItemId, Decision, RecordSwipeRequest};
pub use match_result::MatchResult;
pub use session::{SessionPhase, SessionOutcome, AbandonReason, GroupChange, SessionEvent, SessionSnapshot};
