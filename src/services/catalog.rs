//! Item catalog boundary
//!
//! The engine only ever sees opaque item ids. Metadata, posters and genre
//! lookups live with the catalog service.

use async_trait::async_trait;

use crate::models::{GroupId, ItemId};
use crate::utils::errors::Result;

/// Largest deck a session will serve
pub const MAX_DECK_SIZE: usize = 250;

#[async_trait]
pub trait ItemCatalog: Send + Sync {
    /// Ranked item ids to offer a group, best first
    async fn deck(&self, group_id: GroupId) -> Result<Vec<ItemId>>;
}

/// Fixed deck shared by every group
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    items: Vec<ItemId>,
}

impl StaticCatalog {
    pub fn new(items: impl IntoIterator<Item = ItemId>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    /// Items `1..=count`, handy for local runs
    pub fn sequential(count: i64) -> Self {
        Self::new((1..=count).map(ItemId))
    }
}

#[async_trait]
impl ItemCatalog for StaticCatalog {
    async fn deck(&self, _group_id: GroupId) -> Result<Vec<ItemId>> {
        Ok(self.items.clone())
    }
}

/// Trim a catalog deck to what a session serves: duplicates dropped, ranking
/// kept, at most `MAX_DECK_SIZE` entries.
pub fn prepare_deck(items: Vec<ItemId>) -> Vec<ItemId> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(*item))
        .take(MAX_DECK_SIZE)
        .collect()
}
