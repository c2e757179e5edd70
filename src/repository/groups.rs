use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::GroupStore;
use crate::domain::models::{Group, Member};

/// Repository for group metadata and membership
#[derive(Clone)]
pub struct GroupRepository {
    pool: PgPool,
}

impl GroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupStore for GroupRepository {
    async fn get_group(&self, group_id: Uuid) -> Result<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(
            r#"
            SELECT id, name, description, status, max_size, created_at
            FROM groups
            WHERE id = $1
            "#,
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    async fn list_member_ids(&self, group_id: Uuid) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT user_id
            FROM group_members
            WHERE group_id = $1
            ORDER BY joined_at ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn list_member_profiles(&self, group_id: Uuid) -> Result<Vec<Member>> {
        let members = sqlx::query_as::<_, Member>(
            r#"
            SELECT u.id, u.city, u.goal_weight, u.start_weight, u.created_at
            FROM users u
            JOIN group_members m ON m.user_id = u.id
            WHERE m.group_id = $1
            ORDER BY m.joined_at ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    async fn list_candidate_groups(&self, user_id: Uuid, limit: i64) -> Result<Vec<Group>> {
        let groups = sqlx::query_as::<_, Group>(
            r#"
            SELECT g.id, g.name, g.description, g.status, g.max_size, g.created_at
            FROM groups g
            WHERE g.status = 'approved'
              AND NOT EXISTS (
                  SELECT 1 FROM group_members m
                  WHERE m.group_id = g.id AND m.user_id = $1
              )
              AND NOT EXISTS (
                  SELECT 1 FROM recommendation_dismissals d
                  WHERE d.group_id = g.id AND d.user_id = $1
              )
            ORDER BY g.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(groups)
    }
}
