//! Cache key schema for scoring results.
//!
//! Key format: v{VERSION}:leaderboard:{group_id}:{period_kind}:{limit}

use uuid::Uuid;

use crate::domain::models::PeriodKind;

/// Cache schema version - increment when changing key formats
pub const CACHE_VERSION: u32 = 1;

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Leaderboard page for one (group, period kind, limit)
    pub fn leaderboard(group_id: Uuid, kind: PeriodKind, limit: i64) -> String {
        format!(
            "v{}:leaderboard:{}:{}:{}",
            CACHE_VERSION,
            group_id,
            kind.as_str(),
            limit
        )
    }

    /// Pattern for every leaderboard entry of a group
    pub fn group_pattern(group_id: Uuid) -> String {
        format!("v{}:leaderboard:{}:*", CACHE_VERSION, group_id)
    }

    /// Pattern for one group's entries of a single period kind
    pub fn group_period_pattern(group_id: Uuid, kind: PeriodKind) -> String {
        format!(
            "v{}:leaderboard:{}:{}:*",
            CACHE_VERSION,
            group_id,
            kind.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaderboard_key() {
        let group_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let key = CacheKey::leaderboard(group_id, PeriodKind::Weekly, 10);
        assert_eq!(
            key,
            "v1:leaderboard:550e8400-e29b-41d4-a716-446655440000:weekly:10"
        );
    }

    #[test]
    fn test_group_pattern_matches_all_periods() {
        let group_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let pattern = CacheKey::group_pattern(group_id);
        assert!(pattern.ends_with(":*"));
        assert!(pattern.contains(&group_id.to_string()));
    }

    #[test]
    fn test_period_pattern_is_narrower() {
        let group_id = Uuid::new_v4();
        let pattern = CacheKey::group_period_pattern(group_id, PeriodKind::Monthly);
        assert!(pattern.contains(":monthly:"));
    }
}
