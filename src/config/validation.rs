//! Configuration validation module
//!
//! This module provides validation functions for application configuration
//! to ensure all required settings are properly configured.

use crate::utils::errors::{SwovieError, Result};
use super::{FeedBackend, Settings};

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_database_config(&settings.database)?;
    validate_feed_config(&settings.feed)?;
    if settings.feed.backend == FeedBackend::Redis {
        validate_redis_config(&settings.redis)?;
    }
    validate_engine_config(&settings.engine)?;
    validate_logging_config(&settings.logging)?;

    Ok(())
}

/// Validate database configuration
fn validate_database_config(config: &super::DatabaseConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(SwovieError::Config(
            "Database URL is required".to_string()
        ));
    }

    if config.max_connections == 0 {
        return Err(SwovieError::Config(
            "Max connections must be greater than 0".to_string()
        ));
    }

    if config.min_connections > config.max_connections {
        return Err(SwovieError::Config(
            "Min connections cannot be greater than max connections".to_string()
        ));
    }

    Ok(())
}

/// Validate Redis configuration
fn validate_redis_config(config: &super::RedisConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(SwovieError::Config(
            "Redis URL is required for the redis feed backend".to_string()
        ));
    }

    Ok(())
}

/// Validate change feed configuration
fn validate_feed_config(config: &super::FeedConfig) -> Result<()> {
    if config.channel_capacity == 0 {
        return Err(SwovieError::Config(
            "Feed channel capacity must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate engine tuning
fn validate_engine_config(config: &super::EngineConfig) -> Result<()> {
    if config.store_retry_attempts == 0 {
        return Err(SwovieError::Config(
            "Store retry attempts must be at least 1".to_string()
        ));
    }

    if config.store_retry_base_delay_ms > config.store_retry_max_delay_ms {
        return Err(SwovieError::Config(
            "Retry base delay cannot exceed the max delay".to_string()
        ));
    }

    if config.command_buffer == 0 {
        return Err(SwovieError::Config(
            "Session command buffer must be greater than 0".to_string()
        ));
    }

    if config.queue_page_size == 0 {
        return Err(SwovieError::Config(
            "Queue page size must be greater than 0".to_string()
        ));
    }

    if config.idle_timeout_seconds == 0 || config.sweep_interval_seconds == 0 {
        return Err(SwovieError::Config(
            "Idle timeout and sweep interval must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    if config.level.is_empty() {
        return Err(SwovieError::Config(
            "Log level is required".to_string()
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(SwovieError::Config(
            format!("Invalid log level: {}. Valid levels: {:?}", config.level, valid_levels)
        ));
    }

    Ok(())
}
