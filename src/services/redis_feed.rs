//! Redis pub/sub change feed
//!
//! Every replica publishes to and subscribes on `{prefix}group:{id}`, so
//! sessions hosted anywhere see the same notifications. Pub/sub has no
//! replay: a dropped connection surfaces as `FeedError::Backend` and the
//! subscriber resyncs from the swipe log before resubscribing.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, warn};

use crate::config::RedisConfig;
use crate::models::{GroupChange, GroupId};
use crate::services::feed::{ChangeFeed, FeedError, FeedStream};
use crate::utils::errors::{Result, SwovieError};

#[derive(Clone)]
pub struct RedisChangeFeed {
    client: Client,
    publisher: ConnectionManager,
    prefix: String,
}

impl RedisChangeFeed {
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str()).map_err(SwovieError::Redis)?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(SwovieError::Redis)?;

        Ok(Self {
            client,
            publisher,
            prefix: config.prefix.clone(),
        })
    }

    fn channel_name(&self, group_id: GroupId) -> String {
        channel_name(&self.prefix, group_id)
    }

    /// Check Redis connectivity
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.publisher.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(SwovieError::Redis)?;

        Ok(pong == "PONG")
    }
}

fn channel_name(prefix: &str, group_id: GroupId) -> String {
    format!("{}group:{}", prefix, group_id)
}

fn backend(error: redis::RedisError) -> FeedError {
    FeedError::Backend(error.to_string())
}

#[async_trait]
impl ChangeFeed for RedisChangeFeed {
    async fn publish(&self, change: GroupChange) -> std::result::Result<(), FeedError> {
        let channel = self.channel_name(change.group_id());
        let payload =
            serde_json::to_string(&change).map_err(|e| FeedError::Backend(e.to_string()))?;

        let mut conn = self.publisher.clone();
        let receivers: i64 = conn.publish(&channel, payload).await.map_err(backend)?;

        debug!(channel = %channel, receivers = receivers, "Change published to Redis");
        Ok(())
    }

    async fn subscribe(&self, group_id: GroupId) -> std::result::Result<FeedStream, FeedError> {
        let channel = self.channel_name(group_id);
        let conn = self.client.get_async_connection().await.map_err(backend)?;
        let mut pubsub = conn.into_pubsub();
        pubsub.subscribe(&channel).await.map_err(backend)?;

        let stream = async_stream::stream! {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "Unreadable feed payload");
                        continue;
                    }
                };
                match serde_json::from_str::<GroupChange>(&payload) {
                    Ok(change) => yield Ok(change),
                    Err(e) => warn!(channel = %channel, error = %e, "Malformed feed payload"),
                }
            }
            yield Err(FeedError::Backend(format!("subscription to {} dropped", channel)));
        };

        Ok(Box::pin(stream))
    }

    async fn close(&self, _group_id: GroupId) {
        // Subscriptions are owned by their streams; nothing is held here
    }
}
