//! Scoring engine services.
//!
//! Leaf to root: metric aggregators reduce raw history to scores, the
//! composite calculator folds them into one total, the leaderboard service
//! orchestrates rebuilds and serves pages, and the matching/recommendation
//! pair scores candidate groups per request.

pub mod composite;
pub mod leaderboard;
pub mod matching;
pub mod metrics;
pub mod recommend;

pub use composite::CompositeWeights;
pub use leaderboard::{LeaderboardPage, LeaderboardService, RebuildSummary};
pub use matching::{ActivityBucket, MatchBreakdown, MatchScorer};
pub use metrics::{ActivityCounts, MemberScores, MetricAggregator};
pub use recommend::RecommendationService;
