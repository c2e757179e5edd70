//! Persistence access for the scoring engine.
//!
//! Every store is a trait so the services can run against in-memory fakes
//! in tests; the Postgres implementations live alongside and are the only
//! code that speaks SQL. Raw events and weight records are append-only
//! inputs owned by collaborator services - this crate only ever reads them.
//! The one table the engine owns is `leaderboard_entries`.

mod activity;
mod dismissals;
mod groups;
mod leaderboard;
mod social;
mod weights;

pub use activity::ActivityRepository;
pub use dismissals::DismissalRepository;
pub use groups::GroupRepository;
pub use leaderboard::LeaderboardRepository;
pub use social::SocialRepository;
pub use weights::WeightRepository;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::models::{
    ActivityKind, Group, LeaderboardEntry, Member, PeriodKind, WeightRecord,
};

/// Group metadata and membership reads
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn get_group(&self, group_id: Uuid) -> Result<Option<Group>>;

    /// Current member ids of a group
    async fn list_member_ids(&self, group_id: Uuid) -> Result<Vec<Uuid>>;

    /// Member profiles of a group (for match scoring)
    async fn list_member_profiles(&self, group_id: Uuid) -> Result<Vec<Member>>;

    /// Approved groups the user neither belongs to nor has dismissed,
    /// newest first, capped at `limit`.
    async fn list_candidate_groups(&self, user_id: Uuid, limit: i64) -> Result<Vec<Group>>;
}

/// Append-only activity event reads
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Event counts per kind for one member in one group within a window
    async fn count_events_by_kind(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(ActivityKind, i64)>>;

    /// Distinct calendar dates on which the member had any event in the
    /// window, across all groups (check-ins carry no group).
    async fn list_active_dates(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NaiveDate>>;

    /// Total events for one member since an instant
    async fn count_user_events_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<i64>;

    /// Total events for a set of members since an instant
    async fn count_events_for_users_since(
        &self,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<i64>;
}

/// Append-only weight record reads
#[async_trait]
pub trait WeightStore: Send + Sync {
    /// Most recent record at or before `at`
    async fn latest_at_or_before(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<WeightRecord>>;

    /// Most recent record within [start, end]
    async fn latest_in_range(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<WeightRecord>>;
}

/// Member profile and follow graph reads
#[async_trait]
pub trait SocialStore: Send + Sync {
    async fn get_member(&self, user_id: Uuid) -> Result<Option<Member>>;

    /// Ids the user follows with an accepted relationship
    async fn list_following(&self, user_id: Uuid) -> Result<Vec<Uuid>>;
}

/// The engine's own durable output
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    /// Insert or overwrite one row by its natural key. Rank is left
    /// untouched; the rank barrier owns that column.
    async fn upsert_entry(&self, entry: &LeaderboardEntry) -> Result<()>;

    /// All rows of one (group, period_kind, period_start) partition
    async fn list_partition(
        &self,
        group_id: Uuid,
        kind: PeriodKind,
        period_start: DateTime<Utc>,
    ) -> Result<Vec<LeaderboardEntry>>;

    /// Write ranks for a partition in a single transaction
    async fn write_ranks(
        &self,
        group_id: Uuid,
        kind: PeriodKind,
        period_start: DateTime<Utc>,
        ranks: &[(Uuid, i32)],
    ) -> Result<()>;

    /// Top `limit` ranked rows of a partition, rank ascending
    async fn top_entries(
        &self,
        group_id: Uuid,
        kind: PeriodKind,
        period_start: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>>;

    /// One member's row in a partition, if any
    async fn member_entry(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        kind: PeriodKind,
        period_start: DateTime<Utc>,
    ) -> Result<Option<LeaderboardEntry>>;
}

/// "Not interested" records for recommendations
#[async_trait]
pub trait DismissalStore: Send + Sync {
    /// Idempotent insert; returns true if a new row was created
    async fn dismiss(&self, user_id: Uuid, group_id: Uuid) -> Result<bool>;
}
