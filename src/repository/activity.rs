use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::ActivityStore;
use crate::domain::models::ActivityKind;

/// Repository over the append-only activity event log
#[derive(Clone)]
pub struct ActivityRepository {
    pool: PgPool,
}

impl ActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityStore for ActivityRepository {
    async fn count_events_by_kind(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(ActivityKind, i64)>> {
        let counts = sqlx::query_as::<_, (ActivityKind, i64)>(
            r#"
            SELECT kind, COUNT(*)
            FROM activity_events
            WHERE user_id = $1
              AND group_id = $2
              AND created_at BETWEEN $3 AND $4
            GROUP BY kind
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(counts)
    }

    async fn list_active_dates(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NaiveDate>> {
        let dates: Vec<NaiveDate> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT created_at::date
            FROM activity_events
            WHERE user_id = $1
              AND created_at BETWEEN $2 AND $3
            ORDER BY 1 ASC
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(dates)
    }

    async fn count_user_events_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM activity_events
            WHERE user_id = $1 AND created_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_events_for_users_since(
        &self,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<i64> {
        if user_ids.is_empty() {
            return Ok(0);
        }

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM activity_events
            WHERE user_id = ANY($1) AND created_at >= $2
            "#,
        )
        .bind(user_ids)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
