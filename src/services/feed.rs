//! Group change feed
//!
//! Swipes, membership changes and matches are fanned out per group. Delivery
//! is at-least-once and eventually consistent; a subscriber that falls behind
//! sees `FeedError::Lagged` and must resync from the swipe log.

use std::pin::Pin;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::Stream;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::models::{GroupChange, GroupId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The subscriber missed `skipped` notifications
    #[error("Feed subscriber lagged, {0} notifications skipped")]
    Lagged(u64),

    #[error("Feed backend error: {0}")]
    Backend(String),
}

pub type FeedStream = Pin<Box<dyn Stream<Item = Result<GroupChange, FeedError>> + Send>>;

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn publish(&self, change: GroupChange) -> Result<(), FeedError>;

    /// Changes published after this call returns. The stream ends when the
    /// group's channel is closed.
    async fn subscribe(&self, group_id: GroupId) -> Result<FeedStream, FeedError>;

    /// Release everything held for a torn-down group
    async fn close(&self, group_id: GroupId);
}

/// In-process feed over tokio broadcast channels, one per group.
///
/// Only reaches subscribers inside this process.
pub struct MemoryChangeFeed {
    channels: DashMap<GroupId, broadcast::Sender<GroupChange>>,
    capacity: usize,
}

impl MemoryChangeFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    fn channel(&self, group_id: GroupId) -> broadcast::Sender<GroupChange> {
        self.channels
            .entry(group_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Number of groups with a live channel
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for MemoryChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl ChangeFeed for MemoryChangeFeed {
    async fn publish(&self, change: GroupChange) -> Result<(), FeedError> {
        let tx = self.channel(change.group_id());
        // No receivers is fine
        let _ = tx.send(change);
        Ok(())
    }

    async fn subscribe(&self, group_id: GroupId) -> Result<FeedStream, FeedError> {
        let rx = self.channel(group_id).subscribe();

        let stream = BroadcastStream::new(rx).map(|item| {
            item.map_err(|BroadcastStreamRecvError::Lagged(skipped)| FeedError::Lagged(skipped))
        });

        Ok(Box::pin(stream))
    }

    async fn close(&self, group_id: GroupId) {
        // Dropping the last sender ends every open subscription
        self.channels.remove(&group_id);
    }
}
