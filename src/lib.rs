//! Swovie group matching engine
//!
//! Lets a small group of members jointly pick a movie by swiping. A match is
//! declared once every current member has approved the same item, exactly
//! once per group, after which the group is archived and torn down.

#![allow(non_snake_case)]

pub mod config;
pub mod database;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use utils::errors::{Result, SwovieError};

// Re-export main components for easy access
pub use database::DatabaseService;
pub use services::{ChangeFeed, ItemCatalog, MemoryChangeFeed, ServiceFactory, StaticCatalog};
pub use state::{Engine, SessionStream};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
