//! Test context for unified engine setup
//!
//! Builds an engine over the in-memory stores and feed, keeping handles to
//! both so tests can inject failures and inspect stored state.

use std::sync::{Arc, Once};
use std::time::Duration;

use tokio_stream::StreamExt;
use SwovieMatch::config::EngineConfig;
use SwovieMatch::database::{DatabaseService, MemoryStore};
use SwovieMatch::models::{Group, GroupId, JoinOutcome, SessionEvent};
use SwovieMatch::services::{MemoryChangeFeed, StaticCatalog};
use SwovieMatch::state::{Engine, SessionStream};
use SwovieMatch::utils::RetryPolicy;

use super::test_data::{create_request, join_request, CREDENTIAL};

static INIT: Once = Once::new();

/// Initialize logging for tests (called once)
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

/// Test configuration options
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub deck_size: i64,
    pub retry_attempts: u32,
    pub channel_capacity: usize,
    pub idle_timeout_seconds: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            deck_size: 20,
            retry_attempts: 3,
            channel_capacity: 256,
            idle_timeout_seconds: 1800,
        }
    }
}

pub struct TestContext {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub feed: Arc<MemoryChangeFeed>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::new_with_config(TestConfig::default())
    }

    pub fn new_with_config(config: TestConfig) -> Self {
        init_test_logging();

        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(MemoryChangeFeed::new(config.channel_capacity));
        let engine_config = EngineConfig {
            idle_timeout_seconds: config.idle_timeout_seconds,
            store_retry_attempts: config.retry_attempts,
            ..EngineConfig::default()
        };

        let engine = Engine::with_retry(
            DatabaseService::from_memory(store.clone()),
            feed.clone(),
            Arc::new(StaticCatalog::sequential(config.deck_size)),
            engine_config,
            RetryPolicy::immediate(config.retry_attempts),
        );

        Self { engine, store, feed }
    }

    /// A second engine sharing this one's stores and feed, like another replica
    pub fn replica(&self) -> Engine {
        Engine::with_retry(
            DatabaseService::from_memory(self.store.clone()),
            self.feed.clone(),
            Arc::new(StaticCatalog::sequential(20)),
            EngineConfig::default(),
            RetryPolicy::immediate(3),
        )
    }

    /// Create a group and fill it with `members`, creator first
    pub async fn full_group(&self, members: &[&str]) -> Group {
        let group = self
            .engine
            .create_group(create_request(members[0], members.len() as i32))
            .await
            .expect("create group");

        let mut latest = group;
        for member in &members[1..] {
            let outcome = self
                .engine
                .join_group(join_request(latest.id, member, CREDENTIAL))
                .await
                .expect("join group");
            assert!(matches!(outcome, JoinOutcome::Joined(_)));
            latest = outcome.into_group();
        }
        latest
    }

    pub async fn subscribe(&self, group_id: GroupId) -> SessionStream {
        self.engine
            .subscribe_to_session(group_id)
            .await
            .expect("subscribe to session")
    }

    /// Wait until the engine has recorded an outcome for the group
    pub async fn wait_closed(&self, group_id: GroupId) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.engine.outcome(group_id).is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session did not close in time");
    }
}

/// Drain a session stream to its end, failing if it stalls
pub async fn collect_events(mut stream: SessionStream) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(2), stream.next()).await {
            Ok(Some(event)) => events.push(event),
            Ok(None) => return events,
            Err(_) => panic!("session stream stalled after {:?}", events),
        }
    }
}
