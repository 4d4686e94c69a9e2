//! Group repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::store::GroupStore;
use crate::models::group::{Group, GroupId, GroupStatus, JoinGroupRequest, JoinOutcome, MemberId};
use crate::utils::errors::{Result, SwovieError};
use crate::utils::helpers::credentials_match;

const SELECT_GROUP: &str = r#"
    SELECT g.id, g.capacity, g.credential, g.creator, g.status, g.created_at,
           COALESCE(array_agg(m.member_id) FILTER (WHERE m.member_id IS NOT NULL), '{}') AS members
    FROM groups g
    LEFT JOIN group_members m ON m.group_id = g.id
"#;

#[derive(Debug, FromRow)]
struct GroupRow {
    id: Uuid,
    capacity: i32,
    credential: String,
    creator: String,
    status: String,
    created_at: DateTime<Utc>,
    members: Vec<String>,
}

impl TryFrom<GroupRow> for Group {
    type Error = SwovieError;

    fn try_from(row: GroupRow) -> Result<Self> {
        let status = GroupStatus::parse(&row.status).ok_or_else(|| {
            SwovieError::StoreUnavailable(format!("unknown group status {}", row.status))
        })?;
        Ok(Group {
            id: GroupId(row.id),
            capacity: row.capacity,
            credential: row.credential,
            members: row.members.into_iter().map(MemberId).collect(),
            creator: MemberId(row.creator),
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LockedGroupRow {
    capacity: i32,
    credential: String,
    status: String,
}

#[derive(Clone)]
pub struct GroupRepository {
    pool: PgPool,
}

impl GroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, group_id: GroupId) -> Result<Option<Group>> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "{} WHERE g.id = $1 GROUP BY g.id",
            SELECT_GROUP
        ))
        .bind(group_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(SwovieError::from_store)?;

        row.map(Group::try_from).transpose()
    }
}

#[async_trait]
impl GroupStore for GroupRepository {
    async fn create_group(&self, group: &Group) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(SwovieError::from_store)?;

        sqlx::query(
            r#"
            INSERT INTO groups (id, capacity, credential, creator, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(group.id.0)
        .bind(group.capacity)
        .bind(&group.credential)
        .bind(group.creator.as_str())
        .bind(group.status.as_str())
        .bind(group.created_at)
        .execute(&mut *tx)
        .await
        .map_err(SwovieError::from_store)?;

        for member in &group.members {
            sqlx::query(
                r#"
                INSERT INTO group_members (group_id, member_id, joined_at) VALUES ($1, $2, $3)
                ON CONFLICT (group_id, member_id) DO NOTHING
                "#,
            )
            .bind(group.id.0)
            .bind(member.as_str())
            .bind(group.created_at)
            .execute(&mut *tx)
            .await
            .map_err(SwovieError::from_store)?;
        }

        tx.commit().await.map_err(SwovieError::from_store)?;
        Ok(())
    }

    async fn get_group(&self, group_id: GroupId) -> Result<Option<Group>> {
        self.fetch(group_id).await
    }

    async fn join_group(&self, request: &JoinGroupRequest) -> Result<JoinOutcome> {
        let group_id = request.group_id;
        let mut tx = self.pool.begin().await.map_err(SwovieError::from_store)?;

        // Row lock serializes concurrent joiners on the same group
        let locked = sqlx::query_as::<_, LockedGroupRow>(
            "SELECT capacity, credential, status FROM groups WHERE id = $1 FOR UPDATE",
        )
        .bind(group_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(SwovieError::from_store)?;

        let locked = match locked {
            Some(row) if row.status == GroupStatus::Open.as_str() => row,
            _ => return Err(SwovieError::NotFound { group_id }),
        };

        if !credentials_match(&locked.credential, &request.credential) {
            return Err(SwovieError::InvalidCredential { group_id });
        }

        let (already,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM group_members WHERE group_id = $1 AND member_id = $2)",
        )
        .bind(group_id.0)
        .bind(request.member_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(SwovieError::from_store)?;

        if !already {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM group_members WHERE group_id = $1")
                    .bind(group_id.0)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(SwovieError::from_store)?;

            if count >= locked.capacity as i64 {
                return Err(SwovieError::Full { group_id, capacity: locked.capacity });
            }

            sqlx::query(
                "INSERT INTO group_members (group_id, member_id, joined_at) VALUES ($1, $2, $3)",
            )
            .bind(group_id.0)
            .bind(request.member_id.as_str())
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(SwovieError::from_store)?;
        }

        tx.commit().await.map_err(SwovieError::from_store)?;

        let group = self
            .fetch(group_id)
            .await?
            .ok_or(SwovieError::NotFound { group_id })?;

        Ok(if already {
            JoinOutcome::AlreadyMember(group)
        } else {
            JoinOutcome::Joined(group)
        })
    }

    async fn transition_status(
        &self,
        group_id: GroupId,
        from: GroupStatus,
        to: GroupStatus,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(SwovieError::InvalidParameters(format!(
                "illegal status transition {} -> {}",
                from, to
            )));
        }

        let result = sqlx::query("UPDATE groups SET status = $3 WHERE id = $1 AND status = $2")
            .bind(group_id.0)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await
            .map_err(SwovieError::from_store)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_group(&self, group_id: GroupId) -> Result<()> {
        // group_members and group_swipes cascade
        sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(group_id.0)
            .execute(&self.pool)
            .await
            .map_err(SwovieError::from_store)?;

        Ok(())
    }

    async fn list_open_groups(&self) -> Result<Vec<Group>> {
        let rows = sqlx::query_as::<_, GroupRow>(&format!(
            "{} WHERE g.status = 'open' GROUP BY g.id ORDER BY g.created_at ASC",
            SELECT_GROUP
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(SwovieError::from_store)?;

        rows.into_iter().map(Group::try_from).collect()
    }
}
