use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::WeightStore;
use crate::domain::models::WeightRecord;

/// Repository over the append-only weight record log
#[derive(Clone)]
pub struct WeightRepository {
    pool: PgPool,
}

impl WeightRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WeightStore for WeightRepository {
    async fn latest_at_or_before(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<WeightRecord>> {
        let record = sqlx::query_as::<_, WeightRecord>(
            r#"
            SELECT id, user_id, weight, recorded_at
            FROM weight_records
            WHERE user_id = $1 AND recorded_at <= $2
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn latest_in_range(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<WeightRecord>> {
        let record = sqlx::query_as::<_, WeightRecord>(
            r#"
            SELECT id, user_id, weight, recorded_at
            FROM weight_records
            WHERE user_id = $1 AND recorded_at BETWEEN $2 AND $3
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
