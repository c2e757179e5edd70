use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::DismissalStore;

/// Repository for recommendation dismissals
#[derive(Clone)]
pub struct DismissalRepository {
    pool: PgPool,
}

impl DismissalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DismissalStore for DismissalRepository {
    async fn dismiss(&self, user_id: Uuid, group_id: Uuid) -> Result<bool> {
        let inserted = sqlx::query_as::<_, (Uuid,)>(
            r#"
            INSERT INTO recommendation_dismissals (user_id, group_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id, group_id) DO NOTHING
            RETURNING user_id
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(inserted.is_some())
    }
}
