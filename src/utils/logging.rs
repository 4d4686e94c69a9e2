//! Logging configuration and setup
//!
//! This module provides logging initialization and structured logging utilities
//! for the matching engine.

use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::models::{GroupId, ItemId, MatchResult, MemberId, SessionOutcome, SwipeEvent};
use crate::utils::errors::{Result, SwovieError};

/// Initialize logging based on configuration.
///
/// The returned guard flushes the file appender on drop and must be held for
/// the life of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(&config.directory, &config.file_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::try_new(&config.level)
        .map_err(|e| SwovieError::Config(format!("invalid log filter {}: {}", config.level, e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking),
        )
        .try_init()
        .map_err(|e| SwovieError::Config(format!("logging already initialized: {}", e)))?;

    info!("Logging initialized with level: {}", config.level);
    Ok(guard)
}

/// Log group lifecycle events
pub fn log_group_event(group_id: GroupId, event: &str, member_id: Option<&MemberId>, details: Option<&str>) {
    info!(
        group_id = %group_id,
        event = event,
        member_id = member_id.map(MemberId::as_str),
        details = details,
        "Group event occurred"
    );
}

/// Log an ingested swipe
pub fn log_swipe(event: &SwipeEvent) {
    debug!(
        group_id = %event.group_id,
        member_id = %event.member_id,
        item_id = %event.item_id,
        decision = %event.decision,
        "Swipe recorded"
    );
}

/// Log a detected match
pub fn log_match(result: &MatchResult) {
    info!(
        group_id = %result.group_id,
        item_id = %result.item_id,
        members = result.members.len(),
        "Match found"
    );
}

/// Log session teardown
pub fn log_session_closed(group_id: GroupId, outcome: &SessionOutcome) {
    match outcome {
        SessionOutcome::Error { message } => warn!(
            group_id = %group_id,
            outcome = outcome.label(),
            error = %message,
            "Session closed"
        ),
        _ => info!(group_id = %group_id, outcome = outcome.label(), "Session closed"),
    }
}

/// Log a consensus evaluation pass
pub fn log_evaluation(group_id: GroupId, candidates: usize, winner: Option<ItemId>) {
    debug!(
        group_id = %group_id,
        candidates = candidates,
        winner = winner.map(|item| item.0),
        "Consensus evaluated"
    );
}
