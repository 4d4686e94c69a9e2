//! Application settings management
//!
//! This module defines the configuration structure and provides methods
//! for loading settings from TOML files and environment variables.

use serde::{Deserialize, Serialize};

/// Main application configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub feed: FeedConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
}

/// Redis configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    pub url: String,
    /// Prefix for pub/sub channel names
    pub prefix: String,
}

/// Which change feed carries group notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedBackend {
    /// In-process broadcast; single replica only
    Memory,
    /// Redis pub/sub; shared across replicas
    Redis,
}

/// Change feed configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    pub backend: FeedBackend,
    /// Per-group broadcast buffer before slow subscribers lag
    pub channel_capacity: usize,
}

/// Session engine tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Sessions with no activity for this long are abandoned
    pub idle_timeout_seconds: u64,
    /// Attempts per store call before the session gives up
    pub store_retry_attempts: u32,
    pub store_retry_base_delay_ms: u64,
    pub store_retry_max_delay_ms: u64,
    /// Bounded mailbox size of each session actor
    pub command_buffer: usize,
    /// Default number of items handed out per `next_items` call
    pub queue_page_size: usize,
    pub sweep_interval_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: String,
    pub file_prefix: String,
}

impl Settings {
    /// Load settings from configuration file and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::from_file("config")
    }

    /// Load settings layered over defaults: file (optional), then `SWOVIE__*` env vars
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&Settings::default())?;
        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("SWOVIE").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), crate::utils::errors::SwovieError> {
        super::validation::validate_settings(self)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/swovie".to_string(),
                max_connections: 10,
                min_connections: 1,
                acquire_timeout_seconds: 30,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                prefix: "swovie:".to_string(),
            },
            feed: FeedConfig {
                backend: FeedBackend::Memory,
                channel_capacity: 256,
            },
            engine: EngineConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                directory: "/var/log/swovie".to_string(),
                file_prefix: "swovie.log".to_string(),
            },
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: 1800,
            store_retry_attempts: 5,
            store_retry_base_delay_ms: 50,
            store_retry_max_delay_ms: 2000,
            command_buffer: 64,
            queue_page_size: 10,
            sweep_interval_seconds: 60,
        }
    }
}
