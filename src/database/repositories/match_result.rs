//! Match history repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::store::MatchHistoryStore;
use crate::models::{GroupId, ItemId, MatchResult, MemberId};
use crate::utils::errors::{Result, SwovieError};

#[derive(Debug, FromRow)]
struct MatchRow {
    group_id: Uuid,
    item_id: i64,
    members: Vec<String>,
    matched_at: DateTime<Utc>,
}

impl From<MatchRow> for MatchResult {
    fn from(row: MatchRow) -> Self {
        MatchResult {
            group_id: GroupId(row.group_id),
            item_id: ItemId(row.item_id),
            members: row.members.into_iter().map(MemberId).collect(),
            matched_at: row.matched_at,
        }
    }
}

#[derive(Clone)]
pub struct MatchHistoryRepository {
    pool: PgPool,
}

impl MatchHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchHistoryStore for MatchHistoryRepository {
    async fn record(&self, result: &MatchResult) -> Result<bool> {
        let members: Vec<String> = result.members.iter().map(|m| m.0.clone()).collect();

        let inserted = sqlx::query(
            r#"
            INSERT INTO match_history (group_id, item_id, members, matched_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (group_id) DO NOTHING
            "#,
        )
        .bind(result.group_id.0)
        .bind(result.item_id.0)
        .bind(&members)
        .bind(result.matched_at)
        .execute(&self.pool)
        .await
        .map_err(SwovieError::from_store)?;

        Ok(inserted.rows_affected() == 1)
    }

    async fn find_by_group(&self, group_id: GroupId) -> Result<Option<MatchResult>> {
        let row = sqlx::query_as::<_, MatchRow>(
            "SELECT group_id, item_id, members, matched_at FROM match_history WHERE group_id = $1",
        )
        .bind(group_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(SwovieError::from_store)?;

        Ok(row.map(MatchResult::from))
    }

    async fn list_for_member(&self, member_id: &MemberId, limit: i64) -> Result<Vec<MatchResult>> {
        let rows = sqlx::query_as::<_, MatchRow>(
            r#"
            SELECT group_id, item_id, members, matched_at
            FROM match_history
            WHERE $1 = ANY(members)
            ORDER BY matched_at DESC
            LIMIT $2
            "#,
        )
        .bind(member_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(SwovieError::from_store)?;

        Ok(rows.into_iter().map(MatchResult::from).collect())
    }
}
