//! Database service layer
//!
//! Bundles the three stores the engine needs behind trait objects so the
//! session layer never knows which backend it is talking to.

use std::sync::Arc;

use crate::database::memory::MemoryStore;
use crate::database::repositories::{GroupRepository, MatchHistoryRepository, SwipeRepository};
use crate::database::store::{GroupStore, MatchHistoryStore, SwipeStore};
use crate::database::DatabasePool;

#[derive(Clone)]
pub struct DatabaseService {
    pub groups: Arc<dyn GroupStore>,
    pub swipes: Arc<dyn SwipeStore>,
    pub matches: Arc<dyn MatchHistoryStore>,
}

impl DatabaseService {
    /// Postgres-backed stores sharing one pool
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            groups: Arc::new(GroupRepository::new(pool.clone())),
            swipes: Arc::new(SwipeRepository::new(pool.clone())),
            matches: Arc::new(MatchHistoryRepository::new(pool)),
        }
    }

    /// All three stores served by one in-process backend
    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    /// Share an existing memory store, keeping a handle for inspection
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            groups: store.clone(),
            swipes: store.clone(),
            matches: store,
        }
    }
}
