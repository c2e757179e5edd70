//! Four-factor group match scoring.
//!
//! Computes the compatibility of one user with one candidate group from
//! goal similarity, social overlap, activity-level similarity, and
//! location. The point values and bucket boundaries are behavioral
//! constants inherited from the product; treat them as tunables, not as
//! derived quantities.

use anyhow::Result;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::{Group, Member};
use crate::repository::ActivityStore;

/// Goal-similarity points: |user goal - group avg goal| <= 10 scores full,
/// <= 20 scores half, otherwise nothing.
pub const GOAL_POINTS_CLOSE: f64 = 40.0;
pub const GOAL_POINTS_NEAR: f64 = 20.0;
pub const GOAL_DIFF_CLOSE: f64 = 10.0;
pub const GOAL_DIFF_NEAR: f64 = 20.0;

/// Followed accounts in the group: 0 -> 0, 1 -> 15, 2 -> 25, 3+ -> 30
pub const FRIEND_POINTS: [f64; 4] = [0.0, 15.0, 25.0, 30.0];

/// Same activity bucket -> 20, adjacent -> 10, two apart -> 0
pub const ACTIVITY_POINTS_SAME: f64 = 20.0;
pub const ACTIVITY_POINTS_ADJACENT: f64 = 10.0;

/// Exact city string shared with at least one member -> 10
pub const LOCATION_POINTS: f64 = 10.0;

/// Activity bucket boundaries over the trailing event count
pub const ACTIVITY_MEDIUM_MIN: f64 = 10.0;
pub const ACTIVITY_HIGH_MIN: f64 = 30.0;

/// Trailing window for activity-level classification
pub const TRAILING_WINDOW_DAYS: i64 = 30;

/// Coarse activity level over a 30-day trailing window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityBucket {
    Low,
    Medium,
    High,
}

impl ActivityBucket {
    pub fn from_rate(events: f64) -> Self {
        if events >= ACTIVITY_HIGH_MIN {
            ActivityBucket::High
        } else if events >= ACTIVITY_MEDIUM_MIN {
            ActivityBucket::Medium
        } else {
            ActivityBucket::Low
        }
    }

    fn index(self) -> i32 {
        match self {
            ActivityBucket::Low => 0,
            ActivityBucket::Medium => 1,
            ActivityBucket::High => 2,
        }
    }
}

/// Goal-similarity sub-score. Contributes 0 when the user has no complete
/// goal, or when no group member has one.
pub fn goal_match(user: &Member, members: &[Member]) -> f64 {
    let user_goal = match user.weight_loss_goal() {
        Some(goal) => goal,
        None => return 0.0,
    };

    let member_goals: Vec<f64> = members.iter().filter_map(|m| m.weight_loss_goal()).collect();
    if member_goals.is_empty() {
        return 0.0;
    }
    let group_avg = member_goals.iter().sum::<f64>() / member_goals.len() as f64;

    let diff = (user_goal - group_avg).abs();
    if diff <= GOAL_DIFF_CLOSE {
        GOAL_POINTS_CLOSE
    } else if diff <= GOAL_DIFF_NEAR {
        GOAL_POINTS_NEAR
    } else {
        0.0
    }
}

/// Social-overlap sub-score from the count of followed accounts that are
/// group members.
pub fn friend_match(following: &HashSet<Uuid>, members: &[Member]) -> f64 {
    let count = members.iter().filter(|m| following.contains(&m.id)).count();
    FRIEND_POINTS[count.min(FRIEND_POINTS.len() - 1)]
}

/// Activity-level sub-score from bucket proximity
pub fn activity_match(user: ActivityBucket, group: ActivityBucket) -> f64 {
    match (user.index() - group.index()).abs() {
        0 => ACTIVITY_POINTS_SAME,
        1 => ACTIVITY_POINTS_ADJACENT,
        _ => 0.0,
    }
}

/// Location sub-score: exact city string match with any member
pub fn location_match(city: Option<&str>, members: &[Member]) -> f64 {
    let city = match city {
        Some(city) => city,
        None => return 0.0,
    };
    let shared = members
        .iter()
        .any(|m| m.city.as_deref().map(|c| c == city).unwrap_or(false));
    if shared {
        LOCATION_POINTS
    } else {
        0.0
    }
}

/// Sub-scores and total for one candidate group
#[derive(Debug, Clone, Copy)]
pub struct MatchBreakdown {
    pub group_id: Uuid,
    pub goal: f64,
    pub friend: f64,
    pub activity: f64,
    pub location: f64,
    pub total: f64,
}

/// Scores one user against candidate groups. Reads the activity log for
/// the group-side trailing counts; everything user-side is passed in so a
/// request fetches it once across all candidates.
pub struct MatchScorer {
    activity: Arc<dyn ActivityStore>,
}

impl MatchScorer {
    pub fn new(activity: Arc<dyn ActivityStore>) -> Self {
        Self { activity }
    }

    pub async fn score(
        &self,
        user: &Member,
        following: &HashSet<Uuid>,
        user_bucket: ActivityBucket,
        group: &Group,
        members: &[Member],
    ) -> Result<MatchBreakdown> {
        let since = Utc::now() - Duration::days(TRAILING_WINDOW_DAYS);
        let member_ids: Vec<Uuid> = members.iter().map(|m| m.id).collect();
        let group_events = self
            .activity
            .count_events_for_users_since(&member_ids, since)
            .await?;
        let group_rate = if members.is_empty() {
            0.0
        } else {
            group_events as f64 / members.len() as f64
        };
        let group_bucket = ActivityBucket::from_rate(group_rate);

        let goal = goal_match(user, members);
        let friend = friend_match(following, members);
        let activity = activity_match(user_bucket, group_bucket);
        let location = location_match(user.city.as_deref(), members);

        Ok(MatchBreakdown {
            group_id: group.id,
            goal,
            friend,
            activity,
            location,
            total: goal + friend + activity + location,
        })
    }
}
