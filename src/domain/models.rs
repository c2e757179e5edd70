use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Leaderboard period selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum PeriodKind {
    Weekly,
    Monthly,
    AllTime,
}

impl PeriodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodKind::Weekly => "weekly",
            PeriodKind::Monthly => "monthly",
            PeriodKind::AllTime => "all_time",
        }
    }
}

/// A resolved scoring window. Start and end are both inclusive in queries;
/// end sits at 23:59:59.999 of the window's last day so adjacent windows of
/// the same kind never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub kind: PeriodKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Activity event type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ActivityKind {
    Post,
    Comment,
    Like,
    Message,
    Checkin,
}

/// Group approval status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum GroupStatus {
    Approved,
    Pending,
}

/// Member profile attributes consumed by scoring. Owned by the user
/// management service; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Member {
    pub id: Uuid,
    pub city: Option<String>,
    pub goal_weight: Option<f64>,
    pub start_weight: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Member {
    /// Planned weight loss (start minus goal), if both attributes are set.
    pub fn weight_loss_goal(&self) -> Option<f64> {
        match (self.start_weight, self.goal_weight) {
            (Some(start), Some(goal)) => Some(start - goal),
            _ => None,
        }
    }
}

/// Group entity - read-only to the scoring engine
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: GroupStatus,
    pub max_size: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// One immutable user action (post, comment, like, message, check-in).
/// `group_id` is null for ungrouped actions such as daily check-ins.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub group_id: Option<Uuid>,
    pub kind: ActivityKind,
    pub created_at: DateTime<Utc>,
}

/// Immutable timestamped weight measurement
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WeightRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub weight: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Durable leaderboard row. Natural key is
/// (group_id, user_id, period_kind, period_start); recomputation upserts in
/// place, never duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub period_kind: PeriodKind,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub activity_score: f64,
    pub weight_loss_score: f64,
    pub streak_score: f64,
    pub total_score: f64,
    pub rank: Option<i32>,
}

/// Per-request match result for one candidate group. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMatchScore {
    pub group_id: Uuid,
    pub group_name: String,
    pub goal_match: f64,
    pub friend_match: f64,
    pub activity_match: f64,
    pub location_match: f64,
    pub total: f64,
    pub reason: String,
}

/// First-class "not interested" record keyed by (user, group)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecommendationDismissal {
    pub user_id: Uuid,
    pub group_id: Uuid,
    pub created_at: DateTime<Utc>,
}
