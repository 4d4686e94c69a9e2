//! Error handling for Swovie
//!
//! This module defines the main error type used throughout the engine.
//! Precondition failures are scoped to one group's session; none of them
//! are fatal to the engine as a whole.

use thiserror::Error;

use crate::models::{GroupId, MemberId};
use crate::services::feed::FeedError;

/// Main error type for the Swovie matching engine
#[derive(Error, Debug)]
pub enum SwovieError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Group not found: {group_id}")]
    NotFound { group_id: GroupId },

    #[error("Invalid credential for group {group_id}")]
    InvalidCredential { group_id: GroupId },

    #[error("Group {group_id} is full (capacity {capacity})")]
    Full { group_id: GroupId, capacity: i32 },

    #[error("Group {group_id} no longer accepts swipes")]
    GroupClosed { group_id: GroupId },

    #[error("Member {member_id} is not part of group {group_id}")]
    NotAMember { group_id: GroupId, member_id: MemberId },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Change feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for Swovie operations
pub type Result<T> = std::result::Result<T, SwovieError>;

impl SwovieError {
    /// Classify a sqlx failure: connectivity problems become `StoreUnavailable`
    /// so the retry layer can see them, everything else stays a database error.
    pub fn from_store(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => SwovieError::StoreUnavailable(error.to_string()),
            other => SwovieError::Database(other),
        }
    }

    /// Check if the error is transient and worth retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            SwovieError::StoreUnavailable(_) => true,
            SwovieError::Redis(e) => e.is_connection_dropped() || e.is_timeout() || e.is_io_error(),
            SwovieError::Io(_) => true,
            SwovieError::Feed(FeedError::Backend(_)) => true,
            SwovieError::Feed(FeedError::Lagged(_)) => false,
            SwovieError::InvalidParameters(_)
            | SwovieError::NotFound { .. }
            | SwovieError::InvalidCredential { .. }
            | SwovieError::Full { .. }
            | SwovieError::GroupClosed { .. }
            | SwovieError::NotAMember { .. }
            | SwovieError::Database(_)
            | SwovieError::Migration(_)
            | SwovieError::Serialization(_)
            | SwovieError::Config(_) => false,
        }
    }

    /// Whether the caller broke a precondition (as opposed to an infrastructure fault)
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SwovieError::InvalidParameters(_)
                | SwovieError::NotFound { .. }
                | SwovieError::InvalidCredential { .. }
                | SwovieError::Full { .. }
                | SwovieError::GroupClosed { .. }
                | SwovieError::NotAMember { .. }
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SwovieError::Database(_) => ErrorSeverity::Critical,
            SwovieError::Migration(_) => ErrorSeverity::Critical,
            SwovieError::Config(_) => ErrorSeverity::Critical,
            SwovieError::InvalidCredential { .. } => ErrorSeverity::Warning,
            SwovieError::StoreUnavailable(_) => ErrorSeverity::Warning,
            SwovieError::Feed(_) => ErrorSeverity::Warning,
            SwovieError::InvalidParameters(_)
            | SwovieError::NotFound { .. }
            | SwovieError::Full { .. }
            | SwovieError::GroupClosed { .. }
            | SwovieError::NotAMember { .. } => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
