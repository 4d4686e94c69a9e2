//! Database module
//!
//! Store traits, their Postgres and in-process backends, and the service
//! bundle handed to the engine.

pub mod connection;
pub mod memory;
pub mod repositories;
pub mod service;
pub mod store;

pub use connection::{create_pool, health_check, run_migrations, DatabasePool};
pub use memory::MemoryStore;
pub use repositories::{GroupRepository, MatchHistoryRepository, SwipeRepository};
pub use service::DatabaseService;
pub use store::{GroupStore, MatchHistoryStore, SwipeStore};
