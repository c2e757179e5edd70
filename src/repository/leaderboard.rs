use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::LeaderboardStore;
use crate::domain::models::{LeaderboardEntry, PeriodKind};

/// Repository for the engine-owned leaderboard rows
#[derive(Clone)]
pub struct LeaderboardRepository {
    pool: PgPool,
}

impl LeaderboardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaderboardStore for LeaderboardRepository {
    async fn upsert_entry(&self, entry: &LeaderboardEntry) -> Result<()> {
        // Rank is deliberately not part of the update set: score upserts and
        // rank assignment are separate phases of a rebuild.
        sqlx::query(
            r#"
            INSERT INTO leaderboard_entries
                (group_id, user_id, period_kind, period_start, period_end,
                 activity_score, weight_loss_score, streak_score, total_score, rank)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL)
            ON CONFLICT (group_id, user_id, period_kind, period_start) DO UPDATE SET
                period_end = EXCLUDED.period_end,
                activity_score = EXCLUDED.activity_score,
                weight_loss_score = EXCLUDED.weight_loss_score,
                streak_score = EXCLUDED.streak_score,
                total_score = EXCLUDED.total_score
            "#,
        )
        .bind(entry.group_id)
        .bind(entry.user_id)
        .bind(entry.period_kind)
        .bind(entry.period_start)
        .bind(entry.period_end)
        .bind(entry.activity_score)
        .bind(entry.weight_loss_score)
        .bind(entry.streak_score)
        .bind(entry.total_score)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_partition(
        &self,
        group_id: Uuid,
        kind: PeriodKind,
        period_start: DateTime<Utc>,
    ) -> Result<Vec<LeaderboardEntry>> {
        let entries = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT group_id, user_id, period_kind, period_start, period_end,
                   activity_score, weight_loss_score, streak_score, total_score, rank
            FROM leaderboard_entries
            WHERE group_id = $1 AND period_kind = $2 AND period_start = $3
            ORDER BY total_score DESC, user_id ASC
            "#,
        )
        .bind(group_id)
        .bind(kind)
        .bind(period_start)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn write_ranks(
        &self,
        group_id: Uuid,
        kind: PeriodKind,
        period_start: DateTime<Utc>,
        ranks: &[(Uuid, i32)],
    ) -> Result<()> {
        // All ranks of a partition land atomically or not at all.
        let mut tx = self.pool.begin().await?;

        for (user_id, rank) in ranks {
            sqlx::query(
                r#"
                UPDATE leaderboard_entries
                SET rank = $1
                WHERE group_id = $2 AND user_id = $3
                  AND period_kind = $4 AND period_start = $5
                "#,
            )
            .bind(rank)
            .bind(group_id)
            .bind(user_id)
            .bind(kind)
            .bind(period_start)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn top_entries(
        &self,
        group_id: Uuid,
        kind: PeriodKind,
        period_start: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>> {
        let entries = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT group_id, user_id, period_kind, period_start, period_end,
                   activity_score, weight_loss_score, streak_score, total_score, rank
            FROM leaderboard_entries
            WHERE group_id = $1 AND period_kind = $2 AND period_start = $3
              AND rank IS NOT NULL
            ORDER BY rank ASC
            LIMIT $4
            "#,
        )
        .bind(group_id)
        .bind(kind)
        .bind(period_start)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn member_entry(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        kind: PeriodKind,
        period_start: DateTime<Utc>,
    ) -> Result<Option<LeaderboardEntry>> {
        let entry = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT group_id, user_id, period_kind, period_start, period_end,
                   activity_score, weight_loss_score, streak_score, total_score, rank
            FROM leaderboard_entries
            WHERE group_id = $1 AND user_id = $2
              AND period_kind = $3 AND period_start = $4
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(kind)
        .bind(period_start)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }
}
