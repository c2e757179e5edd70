//! Metric aggregators.
//!
//! Each aggregator reduces one member's raw history within a window to a
//! single non-negative score. A member with no events or records in the
//! window scores 0 on every metric - data absence is never an error.

use anyhow::Result;
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::{ActivityKind, Period};
use crate::repository::{ActivityStore, WeightStore};
use crate::services::composite::CompositeWeights;

/// Points per event type for the activity score
pub const POST_POINTS: f64 = 10.0;
pub const COMMENT_POINTS: f64 = 5.0;
pub const LIKE_POINTS: f64 = 2.0;
pub const MESSAGE_POINTS: f64 = 1.0;

/// Points per day of the longest consecutive-day run
pub const STREAK_POINTS_PER_DAY: f64 = 5.0;

/// Kilogram-to-points multiplier for weight loss
pub const WEIGHT_LOSS_MULTIPLIER: f64 = 100.0;

/// Per-kind event counts within a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityCounts {
    pub posts: i64,
    pub comments: i64,
    pub likes: i64,
    pub messages: i64,
}

impl ActivityCounts {
    /// Fold grouped count rows into the four scored buckets. Check-ins
    /// carry no activity points (they only feed the streak metric).
    pub fn from_rows(rows: &[(ActivityKind, i64)]) -> Self {
        let mut counts = Self::default();
        for (kind, count) in rows {
            match kind {
                ActivityKind::Post => counts.posts += count,
                ActivityKind::Comment => counts.comments += count,
                ActivityKind::Like => counts.likes += count,
                ActivityKind::Message => counts.messages += count,
                ActivityKind::Checkin => {}
            }
        }
        counts
    }
}

/// Weighted activity score: 10 per post, 5 per comment, 2 per like,
/// 1 per message.
pub fn activity_score(counts: ActivityCounts) -> f64 {
    counts.posts as f64 * POST_POINTS
        + counts.comments as f64 * COMMENT_POINTS
        + counts.likes as f64 * LIKE_POINTS
        + counts.messages as f64 * MESSAGE_POINTS
}

/// Weight-loss score from a baseline (latest record at or before window
/// start) and a current reading (latest record inside the window). Missing
/// either side scores 0; weight gain clamps to 0, never negative.
pub fn weight_loss_score(baseline: Option<f64>, current: Option<f64>) -> f64 {
    match (baseline, current) {
        (Some(baseline), Some(current)) => {
            (baseline - current).max(0.0) * WEIGHT_LOSS_MULTIPLIER
        }
        _ => 0.0,
    }
}

/// Streak score: 5 points per day of the longest run of consecutive
/// calendar days with at least one event.
pub fn streak_score(active_dates: &[NaiveDate]) -> f64 {
    longest_run(active_dates) as f64 * STREAK_POINTS_PER_DAY
}

/// Length of the longest run of consecutive calendar days. Input may be
/// unsorted or contain duplicates.
fn longest_run(dates: &[NaiveDate]) -> u32 {
    if dates.is_empty() {
        return 0;
    }

    let mut sorted: Vec<NaiveDate> = dates.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut longest = 1u32;
    let mut current = 1u32;
    for pair in sorted.windows(2) {
        if (pair[1] - pair[0]).num_days() == 1 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 1;
        }
    }
    longest
}

/// All three metric scores plus the composite for one member
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemberScores {
    pub activity: f64,
    pub weight_loss: f64,
    pub streak: f64,
    pub total: f64,
}

/// Aggregates a member's raw history into scores. Always recomputes from
/// the event and weight logs - previously persisted leaderboard rows are
/// never an input.
pub struct MetricAggregator {
    activity: Arc<dyn ActivityStore>,
    weights: Arc<dyn WeightStore>,
    composite: CompositeWeights,
}

impl MetricAggregator {
    pub fn new(
        activity: Arc<dyn ActivityStore>,
        weights: Arc<dyn WeightStore>,
        composite: CompositeWeights,
    ) -> Self {
        Self {
            activity,
            weights,
            composite,
        }
    }

    /// Compute all metric scores for one member of one group in one window.
    pub async fn score_member(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        period: &Period,
    ) -> Result<MemberScores> {
        let count_rows = self
            .activity
            .count_events_by_kind(user_id, group_id, period.start, period.end)
            .await?;
        let activity = activity_score(ActivityCounts::from_rows(&count_rows));

        let baseline = self
            .weights
            .latest_at_or_before(user_id, period.start)
            .await?;
        let current = self
            .weights
            .latest_in_range(user_id, period.start, period.end)
            .await?;
        let weight_loss =
            weight_loss_score(baseline.map(|r| r.weight), current.map(|r| r.weight));

        let active_dates = self
            .activity
            .list_active_dates(user_id, period.start, period.end)
            .await?;
        let streak = streak_score(&active_dates);

        let total = self.composite.total(activity, weight_loss, streak);

        Ok(MemberScores {
            activity,
            weight_loss,
            streak,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn activity_score_weights_event_types() {
        // 3 posts, 2 comments, 1 like, 0 messages -> 42
        let counts = ActivityCounts {
            posts: 3,
            comments: 2,
            likes: 1,
            messages: 0,
        };
        assert_eq!(activity_score(counts), 42.0);
    }

    #[test]
    fn activity_score_zero_events() {
        assert_eq!(activity_score(ActivityCounts::default()), 0.0);
    }

    #[test]
    fn checkins_carry_no_activity_points() {
        let counts = ActivityCounts::from_rows(&[(ActivityKind::Checkin, 7)]);
        assert_eq!(counts, ActivityCounts::default());
        assert_eq!(activity_score(counts), 0.0);
    }

    #[test]
    fn from_rows_maps_each_kind() {
        let counts = ActivityCounts::from_rows(&[
            (ActivityKind::Post, 3),
            (ActivityKind::Comment, 2),
            (ActivityKind::Like, 1),
            (ActivityKind::Message, 4),
        ]);
        assert_eq!(
            counts,
            ActivityCounts {
                posts: 3,
                comments: 2,
                likes: 1,
                messages: 4
            }
        );
    }

    #[test]
    fn weight_loss_score_rewards_loss() {
        // baseline 90, current 87 -> 300
        assert_eq!(weight_loss_score(Some(90.0), Some(87.0)), 300.0);
    }

    #[test]
    fn weight_gain_clamps_to_zero() {
        assert_eq!(weight_loss_score(Some(87.0), Some(90.0)), 0.0);
    }

    #[test]
    fn missing_records_score_zero() {
        assert_eq!(weight_loss_score(None, Some(80.0)), 0.0);
        assert_eq!(weight_loss_score(Some(80.0), None), 0.0);
        assert_eq!(weight_loss_score(None, None), 0.0);
    }

    #[test]
    fn streak_counts_longest_consecutive_run() {
        // Mon, Tue, Wed, then Fri, Sat -> longest run 3 -> 15
        let dates = vec![
            date(2024, 3, 11),
            date(2024, 3, 12),
            date(2024, 3, 13),
            date(2024, 3, 15),
            date(2024, 3, 16),
        ];
        assert_eq!(streak_score(&dates), 15.0);
    }

    #[test]
    fn streak_of_empty_set_is_zero() {
        assert_eq!(streak_score(&[]), 0.0);
    }

    #[test]
    fn streak_single_day() {
        assert_eq!(streak_score(&[date(2024, 3, 11)]), 5.0);
    }

    #[test]
    fn streak_ignores_duplicates_and_order() {
        let dates = vec![
            date(2024, 3, 13),
            date(2024, 3, 11),
            date(2024, 3, 12),
            date(2024, 3, 12),
        ];
        assert_eq!(streak_score(&dates), 15.0);
    }

    #[test]
    fn streak_run_at_end_wins() {
        let dates = vec![
            date(2024, 3, 1),
            date(2024, 3, 2),
            date(2024, 3, 10),
            date(2024, 3, 11),
            date(2024, 3, 12),
            date(2024, 3, 13),
        ];
        assert_eq!(streak_score(&dates), 20.0);
    }
}
