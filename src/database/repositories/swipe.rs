//! Swipe log repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::store::SwipeStore;
use crate::models::{Decision, GroupId, ItemId, MemberId, SwipeEvent};
use crate::utils::errors::{Result, SwovieError};

#[derive(Debug, FromRow)]
struct SwipeRow {
    group_id: Uuid,
    member_id: String,
    item_id: i64,
    decision: String,
    swiped_at: DateTime<Utc>,
}

impl TryFrom<SwipeRow> for SwipeEvent {
    type Error = SwovieError;

    fn try_from(row: SwipeRow) -> Result<Self> {
        let decision = Decision::parse(&row.decision).ok_or_else(|| {
            SwovieError::StoreUnavailable(format!("unknown swipe decision {}", row.decision))
        })?;
        Ok(SwipeEvent {
            group_id: GroupId(row.group_id),
            member_id: MemberId(row.member_id),
            item_id: ItemId(row.item_id),
            decision,
            timestamp: row.swiped_at,
        })
    }
}

#[derive(Clone)]
pub struct SwipeRepository {
    pool: PgPool,
}

impl SwipeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SwipeStore for SwipeRepository {
    async fn append(&self, event: &SwipeEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO group_swipes (group_id, member_id, item_id, decision, swiped_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (group_id, member_id, item_id, decision, swiped_at) DO NOTHING
            "#,
        )
        .bind(event.group_id.0)
        .bind(event.member_id.as_str())
        .bind(event.item_id.0)
        .bind(event.decision.as_str())
        .bind(event.timestamp)
        .execute(&self.pool)
        .await
        .map_err(SwovieError::from_store)?;

        Ok(())
    }

    async fn list_for_group(&self, group_id: GroupId) -> Result<Vec<SwipeEvent>> {
        let rows = sqlx::query_as::<_, SwipeRow>(
            r#"
            SELECT group_id, member_id, item_id, decision, swiped_at
            FROM group_swipes
            WHERE group_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(group_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(SwovieError::from_store)?;

        rows.into_iter().map(SwipeEvent::try_from).collect()
    }

    async fn delete_for_group(&self, group_id: GroupId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM group_swipes WHERE group_id = $1")
            .bind(group_id.0)
            .execute(&self.pool)
            .await
            .map_err(SwovieError::from_store)?;

        Ok(result.rows_affected())
    }
}
