//! Services module
//!
//! Change feeds, the item catalog boundary, and the membership coordinator.

pub mod catalog;
pub mod feed;
pub mod membership;
pub mod redis_feed;

pub use catalog::{ItemCatalog, StaticCatalog, MAX_DECK_SIZE};
pub use feed::{ChangeFeed, FeedError, FeedStream, MemoryChangeFeed};
pub use membership::MembershipCoordinator;
pub use redis_feed::RedisChangeFeed;

use std::sync::Arc;

use crate::config::{FeedBackend, Settings};
use crate::database::DatabaseService;
use crate::state::Engine;
use crate::utils::errors::Result;

/// Service factory for creating the engine's collaborators from settings
#[derive(Clone)]
pub struct ServiceFactory {
    pub feed: Arc<dyn ChangeFeed>,
    pub catalog: Arc<dyn ItemCatalog>,
    redis_feed: Option<RedisChangeFeed>,
    settings: Settings,
}

impl ServiceFactory {
    /// Connect the configured change feed backend
    pub async fn new(settings: Settings, catalog: Arc<dyn ItemCatalog>) -> Result<Self> {
        let (feed, redis_feed): (Arc<dyn ChangeFeed>, Option<RedisChangeFeed>) =
            match settings.feed.backend {
                FeedBackend::Memory => {
                    (Arc::new(MemoryChangeFeed::new(settings.feed.channel_capacity)), None)
                }
                FeedBackend::Redis => {
                    let redis = RedisChangeFeed::new(&settings.redis).await?;
                    (Arc::new(redis.clone()), Some(redis))
                }
            };

        tracing::info!(backend = ?settings.feed.backend, "Change feed ready");

        Ok(Self {
            feed,
            catalog,
            redis_feed,
            settings,
        })
    }

    /// Build the engine over the given stores
    pub fn engine(&self, database: DatabaseService) -> Engine {
        Engine::new(
            database,
            self.feed.clone(),
            self.catalog.clone(),
            self.settings.engine.clone(),
        )
    }

    /// Health check for external services
    pub async fn health_check(&self) -> ServiceHealthStatus {
        let redis_healthy = match &self.redis_feed {
            Some(redis) => Some(redis.health_check().await.unwrap_or(false)),
            None => None,
        };

        ServiceHealthStatus {
            feed_backend: self.settings.feed.backend,
            redis_healthy,
        }
    }
}

/// Health status for external services
#[derive(Debug, Clone)]
pub struct ServiceHealthStatus {
    pub feed_backend: FeedBackend,
    /// `None` when Redis is not in use
    pub redis_healthy: Option<bool>,
}

impl ServiceHealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.redis_healthy.unwrap_or(true)
    }

    /// Get list of unhealthy services
    pub fn get_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.redis_healthy == Some(false) {
            issues.push("Redis connection failed".to_string());
        }
        issues
    }
}
