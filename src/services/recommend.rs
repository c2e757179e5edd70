//! Group recommendation ranking.
//!
//! Builds a bounded candidate set (approved groups the user neither
//! belongs to nor has dismissed), scores every candidate with the match
//! scorer, and returns the top results with a human-readable reason.
//! Nothing here is persisted; every call recomputes from current data.

use chrono::{Duration, Utc};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::domain::models::{Group, GroupMatchScore};
use crate::error::{AppError, Result};
use crate::repository::{ActivityStore, GroupStore, SocialStore};
use crate::services::matching::{
    ActivityBucket, MatchBreakdown, MatchScorer, ACTIVITY_POINTS_ADJACENT, GOAL_POINTS_NEAR,
    TRAILING_WINDOW_DAYS,
};

/// Concurrent candidate scoring bound
const SCORING_CONCURRENCY: usize = 8;

pub struct RecommendationService {
    groups: Arc<dyn GroupStore>,
    social: Arc<dyn SocialStore>,
    activity: Arc<dyn ActivityStore>,
    scorer: MatchScorer,
    config: ScoringConfig,
}

impl RecommendationService {
    pub fn new(
        groups: Arc<dyn GroupStore>,
        social: Arc<dyn SocialStore>,
        activity: Arc<dyn ActivityStore>,
        config: ScoringConfig,
    ) -> Self {
        let scorer = MatchScorer::new(Arc::clone(&activity));
        Self {
            groups,
            social,
            activity,
            scorer,
            config,
        }
    }

    /// Score candidate groups for a user and return the best matches,
    /// highest total first.
    pub async fn recommend(
        &self,
        user_id: Uuid,
        max_results: usize,
    ) -> Result<Vec<GroupMatchScore>> {
        let user = self
            .social
            .get_member(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {} not found", user_id)))?;

        let following: HashSet<Uuid> =
            self.social.list_following(user_id).await?.into_iter().collect();

        let since = Utc::now() - Duration::days(TRAILING_WINDOW_DAYS);
        let user_events = self.activity.count_user_events_since(user_id, since).await?;
        let user_bucket = ActivityBucket::from_rate(user_events as f64);

        // The store excludes joined and dismissed groups and caps the
        // sample, so scoring cost stays bounded no matter how many groups
        // exist.
        let candidates = self
            .groups
            .list_candidate_groups(user_id, self.config.candidate_cap)
            .await?;

        debug!(
            user_id = %user_id,
            candidate_count = candidates.len(),
            "Scoring recommendation candidates"
        );

        let outcomes: Vec<(Uuid, String, anyhow::Result<MatchBreakdown>)> =
            futures::stream::iter(candidates.iter().map(|group| {
                let user = &user;
                let following = &following;
                async move {
                    let outcome = self.score_candidate(user, following, user_bucket, group).await;
                    (group.id, group.name.clone(), outcome)
                }
            }))
            .buffer_unordered(SCORING_CONCURRENCY)
            .collect()
            .await;

        let mut scored: Vec<(String, MatchBreakdown)> = Vec::with_capacity(outcomes.len());
        for (group_id, name, outcome) in outcomes {
            match outcome {
                Ok(breakdown) => scored.push((name, breakdown)),
                Err(e) => {
                    warn!(
                        user_id = %user_id,
                        group_id = %group_id,
                        error = %e,
                        "Skipping candidate: match scoring failed"
                    );
                }
            }
        }

        // Total descending; ties broken by group id for a stable order.
        scored.sort_by(|a, b| {
            b.1.total
                .partial_cmp(&a.1.total)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.group_id.cmp(&b.1.group_id))
        });
        scored.truncate(max_results);

        Ok(scored
            .into_iter()
            .map(|(name, b)| GroupMatchScore {
                group_id: b.group_id,
                group_name: name,
                goal_match: b.goal,
                friend_match: b.friend,
                activity_match: b.activity,
                location_match: b.location,
                total: b.total,
                reason: reason_for(&b),
            })
            .collect())
    }

    async fn score_candidate(
        &self,
        user: &crate::domain::models::Member,
        following: &HashSet<Uuid>,
        user_bucket: ActivityBucket,
        group: &Group,
    ) -> anyhow::Result<MatchBreakdown> {
        let members = self.groups.list_member_profiles(group.id).await?;
        self.scorer
            .score(user, following, user_bucket, group, &members)
            .await
    }
}

/// Why this group was suggested, from the strongest qualifying factor:
/// goals, then friends, then activity level, then location.
fn reason_for(breakdown: &MatchBreakdown) -> String {
    if breakdown.goal >= GOAL_POINTS_NEAR {
        "Members share a similar weight loss goal".to_string()
    } else if breakdown.friend > 0.0 {
        "People you follow are in this group".to_string()
    } else if breakdown.activity >= ACTIVITY_POINTS_ADJACENT {
        "The group's activity level matches yours".to_string()
    } else if breakdown.location > 0.0 {
        "Members live in your city".to_string()
    } else {
        "An active community you might like".to_string()
    }
}
