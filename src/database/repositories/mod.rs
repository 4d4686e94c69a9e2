//! Postgres repositories
//!
//! One repository per table family; each implements a store trait.

pub mod group;
pub mod swipe;
pub mod match_result;

pub use group::GroupRepository;
pub use swipe::SwipeRepository;
pub use match_result::MatchHistoryRepository;
