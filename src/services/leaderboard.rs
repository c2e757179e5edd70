//! Leaderboard building and serving.
//!
//! `rebuild` fans per-member score computation out across a bounded set of
//! workers, upserts one row per member by natural key, then runs the rank
//! barrier: a serial read-back, sort, and dense-rank write for the whole
//! partition. One member failing to score never aborts the batch - that
//! member's prior row just stays stale. The barrier itself is all or
//! nothing and retries until it can see every row it wrote.
//!
//! `fetch` serves the persisted output through the result cache; the cache
//! is an optimization only and every failure path falls through to the
//! store.

use chrono::Utc;
use dashmap::DashMap;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheKey, ScoreCache};
use crate::config::ScoringConfig;
use crate::domain::models::{LeaderboardEntry, Period, PeriodKind};
use crate::error::{AppError, Result};
use crate::period;
use crate::repository::{GroupStore, LeaderboardStore};
use crate::services::metrics::MetricAggregator;

/// Outcome of one rebuild pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildSummary {
    pub group_id: Uuid,
    pub period: Period,
    /// Members whose rows were written this pass
    pub scored: usize,
    /// Members skipped because their score computation failed
    pub skipped: usize,
    /// Rows ranked in the partition (includes stale rows of past members)
    pub ranked: usize,
}

/// One leaderboard page plus the requester's own row, which is always
/// present when they have one - even outside the visible top N.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardPage {
    pub period: Period,
    pub entries: Vec<LeaderboardEntry>,
    pub self_entry: Option<LeaderboardEntry>,
}

pub struct LeaderboardService {
    groups: Arc<dyn GroupStore>,
    store: Arc<dyn LeaderboardStore>,
    aggregator: Arc<MetricAggregator>,
    cache: Arc<dyn ScoreCache>,
    config: ScoringConfig,
    /// Serializes rebuilds per (group, period kind) so one rank pass never
    /// runs over another rebuild's half-written partition. Entries are shed
    /// once the last holder finishes.
    rebuild_locks: DashMap<(Uuid, PeriodKind), Arc<Mutex<()>>>,
    /// Per-key single flight for cache misses. Only keys with a flight in
    /// progress have an entry; cache hits never touch the map.
    flight_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LeaderboardService {
    pub fn new(
        groups: Arc<dyn GroupStore>,
        store: Arc<dyn LeaderboardStore>,
        aggregator: Arc<MetricAggregator>,
        cache: Arc<dyn ScoreCache>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            groups,
            store,
            aggregator,
            cache,
            config,
            rebuild_locks: DashMap::new(),
            flight_locks: DashMap::new(),
        }
    }

    fn rebuild_lock(&self, group_id: Uuid, kind: PeriodKind) -> Arc<Mutex<()>> {
        self.rebuild_locks
            .entry((group_id, kind))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    fn flight_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.flight_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Recompute and persist the leaderboard for one group and period kind.
    pub async fn rebuild(&self, group_id: Uuid, kind: PeriodKind) -> Result<RebuildSummary> {
        self.groups
            .get_group(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group {} not found", group_id)))?;

        let period = period::resolve(kind, Utc::now());
        let members = self.groups.list_member_ids(group_id).await?;

        let lock = self.rebuild_lock(group_id, kind);
        let result = {
            let _guard = lock.lock().await;
            self.rebuild_partition(group_id, kind, period, &members).await
        };
        drop(lock);
        self.rebuild_locks
            .remove_if(&(group_id, kind), |_, holder| Arc::strong_count(holder) == 1);
        result
    }

    async fn rebuild_partition(
        &self,
        group_id: Uuid,
        kind: PeriodKind,
        period: Period,
        members: &[Uuid],
    ) -> Result<RebuildSummary> {
        info!(
            group_id = %group_id,
            period_kind = kind.as_str(),
            member_count = members.len(),
            "Rebuilding leaderboard"
        );

        // Phase 1: score every member concurrently, bounded.
        let timeout = Duration::from_millis(self.config.member_timeout_ms);
        let results: Vec<_> = futures::stream::iter(members.iter().copied().map(|user_id| {
            let aggregator = Arc::clone(&self.aggregator);
            async move {
                let outcome =
                    tokio::time::timeout(timeout, aggregator.score_member(user_id, group_id, &period))
                        .await
                        .unwrap_or_else(|_| Err(anyhow::anyhow!("score computation timed out")));
                (user_id, outcome)
            }
        }))
        .buffer_unordered(self.config.rebuild_concurrency.max(1))
        .collect()
        .await;

        // Phase 2: upsert one row per scored member by natural key.
        let mut scored_ids = Vec::with_capacity(results.len());
        let mut skipped = 0usize;
        for (user_id, outcome) in results {
            let scores = match outcome {
                Ok(scores) => scores,
                Err(e) => {
                    warn!(
                        group_id = %group_id,
                        user_id = %user_id,
                        error = %e,
                        "Skipping member: score computation failed"
                    );
                    skipped += 1;
                    continue;
                }
            };

            let entry = LeaderboardEntry {
                group_id,
                user_id,
                period_kind: kind,
                period_start: period.start,
                period_end: period.end,
                activity_score: scores.activity,
                weight_loss_score: scores.weight_loss,
                streak_score: scores.streak,
                total_score: scores.total,
                rank: None,
            };

            match self.store.upsert_entry(&entry).await {
                Ok(()) => scored_ids.push(user_id),
                Err(e) => {
                    warn!(
                        group_id = %group_id,
                        user_id = %user_id,
                        error = %e,
                        "Skipping member: row upsert failed"
                    );
                    skipped += 1;
                }
            }
        }

        // Phase 3: rank barrier. Serial by construction (we hold the
        // partition lock) and all or nothing for the partition.
        let entries = self.read_back_partition(group_id, kind, &period, &scored_ids).await?;
        let ranks = assign_dense_ranks(&entries);
        self.store
            .write_ranks(group_id, kind, period.start, &ranks)
            .await?;

        // Scores changed; cached pages for this group and kind are stale.
        self.invalidate_group(group_id, Some(kind)).await;

        info!(
            group_id = %group_id,
            period_kind = kind.as_str(),
            scored = scored_ids.len(),
            skipped,
            ranked = ranks.len(),
            "Leaderboard rebuilt"
        );

        Ok(RebuildSummary {
            group_id,
            period,
            scored: scored_ids.len(),
            skipped,
            ranked: ranks.len(),
        })
    }

    /// Read the partition back until it contains every row written this
    /// pass, with bounded backoff. Never ranks a partial set.
    async fn read_back_partition(
        &self,
        group_id: Uuid,
        kind: PeriodKind,
        period: &Period,
        scored_ids: &[Uuid],
    ) -> Result<Vec<LeaderboardEntry>> {
        let mut attempt = 0u32;
        loop {
            match self.store.list_partition(group_id, kind, period.start).await {
                Ok(entries)
                    if scored_ids
                        .iter()
                        .all(|id| entries.iter().any(|e| e.user_id == *id)) =>
                {
                    return Ok(entries);
                }
                Ok(entries) => {
                    warn!(
                        group_id = %group_id,
                        expected = scored_ids.len(),
                        got = entries.len(),
                        "Rank barrier read back an incomplete partition"
                    );
                }
                Err(e) => {
                    warn!(group_id = %group_id, error = %e, "Rank barrier read failed");
                }
            }

            attempt += 1;
            if attempt >= self.config.rank_retry_attempts.max(1) {
                return Err(AppError::Internal(format!(
                    "rank barrier gave up after {} attempts for group {}",
                    attempt, group_id
                )));
            }
            let backoff = self.config.rank_retry_base_ms << (attempt - 1);
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }
    }

    /// Serve the top `limit` entries for the current window of `kind`,
    /// plus the requester's own row when `requester` is given.
    pub async fn fetch(
        &self,
        group_id: Uuid,
        kind: PeriodKind,
        limit: i64,
        requester: Option<Uuid>,
    ) -> Result<LeaderboardPage> {
        if limit <= 0 {
            return Err(AppError::Validation("limit must be positive".to_string()));
        }

        self.groups
            .get_group(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group {} not found", group_id)))?;

        let period = period::resolve(kind, Utc::now());
        let key = CacheKey::leaderboard(group_id, kind, limit);

        let entries = match self.read_cached(&key).await {
            Some(entries) => entries,
            None => self.load_entries(group_id, kind, &period, limit, &key).await?,
        };

        // The requester's own position varies per caller, so it is read
        // directly rather than cached with the page.
        let self_entry = match requester {
            Some(user_id) => {
                self.store
                    .member_entry(group_id, user_id, kind, period.start)
                    .await?
            }
            None => None,
        };

        Ok(LeaderboardPage {
            period,
            entries,
            self_entry,
        })
    }

    /// Cache-miss path. Simultaneous misses on one key compute the page
    /// once: the first flight fills the cache, later ones re-check it after
    /// acquiring the lock. The lock entry is shed once the last holder is
    /// done, so the map only ever tracks keys with a flight in progress.
    async fn load_entries(
        &self,
        group_id: Uuid,
        kind: PeriodKind,
        period: &Period,
        limit: i64,
        key: &str,
    ) -> Result<Vec<LeaderboardEntry>> {
        let lock = self.flight_lock(key);
        let result = {
            let _guard = lock.lock().await;
            match self.read_cached(key).await {
                Some(entries) => Ok(entries),
                None => {
                    match self.store.top_entries(group_id, kind, period.start, limit).await {
                        Ok(entries) => {
                            self.write_cached(key, &entries).await;
                            Ok(entries)
                        }
                        Err(e) => Err(e),
                    }
                }
            }
        };
        drop(lock);
        self.flight_locks
            .remove_if(key, |_, holder| Arc::strong_count(holder) == 1);
        Ok(result?)
    }

    /// Drop cached pages for a group, optionally scoped to one period
    /// kind. Cache trouble degrades to a no-op; staleness is bounded by
    /// the TTL.
    pub async fn invalidate_group(&self, group_id: Uuid, kind: Option<PeriodKind>) -> usize {
        let pattern = match kind {
            Some(kind) => CacheKey::group_period_pattern(group_id, kind),
            None => CacheKey::group_pattern(group_id),
        };
        match self.cache.invalidate_pattern(&pattern).await {
            Ok(count) => count,
            Err(e) => {
                warn!(group_id = %group_id, error = %e, "Cache invalidation failed");
                0
            }
        }
    }

    async fn read_cached(&self, key: &str) -> Option<Vec<LeaderboardEntry>> {
        let raw = match self.cache.get_raw(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, falling through");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => {
                debug!(key = %key, "Leaderboard cache hit");
                Some(entries)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache payload corrupt, falling through");
                None
            }
        }
    }

    async fn write_cached(&self, key: &str, entries: &[LeaderboardEntry]) {
        let payload = match serde_json::to_string(entries) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache serialization failed");
                return;
            }
        };
        if let Err(e) = self
            .cache
            .set_raw(key, &payload, self.config.leaderboard_ttl_secs)
            .await
        {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }
}

/// Dense ranks 1..N over a partition: total score descending, ties broken
/// by user id ascending so recomputation never shuffles equal scores.
fn assign_dense_ranks(entries: &[LeaderboardEntry]) -> Vec<(Uuid, i32)> {
    let mut ordered: Vec<&LeaderboardEntry> = entries.iter().collect();
    ordered.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    ordered
        .iter()
        .enumerate()
        .map(|(i, entry)| (entry.user_id, i as i32 + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::domain::models::{
        ActivityEvent, ActivityKind, Group, GroupStatus, Member, WeightRecord,
    };
    use crate::repository::{ActivityStore, GroupStore, LeaderboardStore, WeightStore};
    use crate::services::composite::CompositeWeights;
    use anyhow::{anyhow, Result as AnyResult};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, NaiveDate};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex as StdMutex;

    struct FakeGroupStore {
        groups: HashMap<Uuid, Group>,
        members: HashMap<Uuid, Vec<Uuid>>,
    }

    #[async_trait]
    impl GroupStore for FakeGroupStore {
        async fn get_group(&self, group_id: Uuid) -> AnyResult<Option<Group>> {
            Ok(self.groups.get(&group_id).cloned())
        }

        async fn list_member_ids(&self, group_id: Uuid) -> AnyResult<Vec<Uuid>> {
            Ok(self.members.get(&group_id).cloned().unwrap_or_default())
        }

        async fn list_member_profiles(&self, _group_id: Uuid) -> AnyResult<Vec<Member>> {
            Ok(vec![])
        }

        async fn list_candidate_groups(&self, _user_id: Uuid, _limit: i64) -> AnyResult<Vec<Group>> {
            Ok(vec![])
        }
    }

    struct FakeActivityStore {
        events: Vec<ActivityEvent>,
        fail_for: HashSet<Uuid>,
    }

    #[async_trait]
    impl ActivityStore for FakeActivityStore {
        async fn count_events_by_kind(
            &self,
            user_id: Uuid,
            group_id: Uuid,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> AnyResult<Vec<(ActivityKind, i64)>> {
            if self.fail_for.contains(&user_id) {
                return Err(anyhow!("event store unavailable"));
            }
            let mut counts: HashMap<ActivityKind, i64> = HashMap::new();
            for event in &self.events {
                if event.user_id == user_id
                    && event.group_id == Some(group_id)
                    && event.created_at >= start
                    && event.created_at <= end
                {
                    *counts.entry(event.kind).or_insert(0) += 1;
                }
            }
            Ok(counts.into_iter().collect())
        }

        async fn list_active_dates(
            &self,
            user_id: Uuid,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> AnyResult<Vec<NaiveDate>> {
            let mut dates: Vec<NaiveDate> = self
                .events
                .iter()
                .filter(|e| e.user_id == user_id && e.created_at >= start && e.created_at <= end)
                .map(|e| e.created_at.date_naive())
                .collect();
            dates.sort_unstable();
            dates.dedup();
            Ok(dates)
        }

        async fn count_user_events_since(
            &self,
            user_id: Uuid,
            since: DateTime<Utc>,
        ) -> AnyResult<i64> {
            Ok(self
                .events
                .iter()
                .filter(|e| e.user_id == user_id && e.created_at >= since)
                .count() as i64)
        }

        async fn count_events_for_users_since(
            &self,
            user_ids: &[Uuid],
            since: DateTime<Utc>,
        ) -> AnyResult<i64> {
            Ok(self
                .events
                .iter()
                .filter(|e| user_ids.contains(&e.user_id) && e.created_at >= since)
                .count() as i64)
        }
    }

    struct FakeWeightStore {
        records: Vec<WeightRecord>,
    }

    #[async_trait]
    impl WeightStore for FakeWeightStore {
        async fn latest_at_or_before(
            &self,
            user_id: Uuid,
            at: DateTime<Utc>,
        ) -> AnyResult<Option<WeightRecord>> {
            Ok(self
                .records
                .iter()
                .filter(|r| r.user_id == user_id && r.recorded_at <= at)
                .max_by_key(|r| r.recorded_at)
                .cloned())
        }

        async fn latest_in_range(
            &self,
            user_id: Uuid,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> AnyResult<Option<WeightRecord>> {
            Ok(self
                .records
                .iter()
                .filter(|r| {
                    r.user_id == user_id && r.recorded_at >= start && r.recorded_at <= end
                })
                .max_by_key(|r| r.recorded_at)
                .cloned())
        }
    }

    type PartitionKey = (Uuid, Uuid, PeriodKind, DateTime<Utc>);

    #[derive(Default)]
    struct FakeLeaderboardStore {
        rows: StdMutex<HashMap<PartitionKey, LeaderboardEntry>>,
    }

    #[async_trait]
    impl LeaderboardStore for FakeLeaderboardStore {
        async fn upsert_entry(&self, entry: &LeaderboardEntry) -> AnyResult<()> {
            let key = (
                entry.group_id,
                entry.user_id,
                entry.period_kind,
                entry.period_start,
            );
            let mut rows = self.rows.lock().unwrap();
            let rank = rows.get(&key).and_then(|prior| prior.rank);
            let mut stored = entry.clone();
            stored.rank = rank;
            rows.insert(key, stored);
            Ok(())
        }

        async fn list_partition(
            &self,
            group_id: Uuid,
            kind: PeriodKind,
            period_start: DateTime<Utc>,
        ) -> AnyResult<Vec<LeaderboardEntry>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .values()
                .filter(|e| {
                    e.group_id == group_id
                        && e.period_kind == kind
                        && e.period_start == period_start
                })
                .cloned()
                .collect())
        }

        async fn write_ranks(
            &self,
            group_id: Uuid,
            kind: PeriodKind,
            period_start: DateTime<Utc>,
            ranks: &[(Uuid, i32)],
        ) -> AnyResult<()> {
            let mut rows = self.rows.lock().unwrap();
            for (user_id, rank) in ranks {
                if let Some(entry) = rows.get_mut(&(group_id, *user_id, kind, period_start)) {
                    entry.rank = Some(*rank);
                }
            }
            Ok(())
        }

        async fn top_entries(
            &self,
            group_id: Uuid,
            kind: PeriodKind,
            period_start: DateTime<Utc>,
            limit: i64,
        ) -> AnyResult<Vec<LeaderboardEntry>> {
            let rows = self.rows.lock().unwrap();
            let mut entries: Vec<LeaderboardEntry> = rows
                .values()
                .filter(|e| {
                    e.group_id == group_id
                        && e.period_kind == kind
                        && e.period_start == period_start
                        && e.rank.is_some()
                })
                .cloned()
                .collect();
            entries.sort_by_key(|e| e.rank);
            entries.truncate(limit as usize);
            Ok(entries)
        }

        async fn member_entry(
            &self,
            group_id: Uuid,
            user_id: Uuid,
            kind: PeriodKind,
            period_start: DateTime<Utc>,
        ) -> AnyResult<Option<LeaderboardEntry>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.get(&(group_id, user_id, kind, period_start)).cloned())
        }
    }

    /// Store whose partition reads fail a set number of times before
    /// behaving, for exercising the rank barrier's retry path.
    struct FlakyLeaderboardStore {
        inner: FakeLeaderboardStore,
        failing_reads: StdMutex<u32>,
    }

    impl FlakyLeaderboardStore {
        fn new(failing_reads: u32) -> Self {
            Self {
                inner: FakeLeaderboardStore::default(),
                failing_reads: StdMutex::new(failing_reads),
            }
        }
    }

    #[async_trait]
    impl LeaderboardStore for FlakyLeaderboardStore {
        async fn upsert_entry(&self, entry: &LeaderboardEntry) -> AnyResult<()> {
            self.inner.upsert_entry(entry).await
        }

        async fn list_partition(
            &self,
            group_id: Uuid,
            kind: PeriodKind,
            period_start: DateTime<Utc>,
        ) -> AnyResult<Vec<LeaderboardEntry>> {
            {
                let mut failing = self.failing_reads.lock().unwrap();
                if *failing > 0 {
                    *failing -= 1;
                    return Err(anyhow!("partition read unavailable"));
                }
            }
            self.inner.list_partition(group_id, kind, period_start).await
        }

        async fn write_ranks(
            &self,
            group_id: Uuid,
            kind: PeriodKind,
            period_start: DateTime<Utc>,
            ranks: &[(Uuid, i32)],
        ) -> AnyResult<()> {
            self.inner.write_ranks(group_id, kind, period_start, ranks).await
        }

        async fn top_entries(
            &self,
            group_id: Uuid,
            kind: PeriodKind,
            period_start: DateTime<Utc>,
            limit: i64,
        ) -> AnyResult<Vec<LeaderboardEntry>> {
            self.inner.top_entries(group_id, kind, period_start, limit).await
        }

        async fn member_entry(
            &self,
            group_id: Uuid,
            user_id: Uuid,
            kind: PeriodKind,
            period_start: DateTime<Utc>,
        ) -> AnyResult<Option<LeaderboardEntry>> {
            self.inner.member_entry(group_id, user_id, kind, period_start).await
        }
    }

    struct Fixture {
        service: LeaderboardService,
        group_id: Uuid,
        member_ids: Vec<Uuid>,
    }

    fn event(user_id: Uuid, group_id: Uuid, kind: ActivityKind, at: DateTime<Utc>) -> ActivityEvent {
        ActivityEvent {
            id: Uuid::new_v4(),
            user_id,
            group_id: Some(group_id),
            kind,
            created_at: at,
        }
    }

    fn weight(user_id: Uuid, value: f64, at: DateTime<Utc>) -> WeightRecord {
        WeightRecord {
            id: Uuid::new_v4(),
            user_id,
            weight: value,
            recorded_at: at,
        }
    }

    fn test_config() -> ScoringConfig {
        ScoringConfig {
            rank_retry_base_ms: 1,
            ..ScoringConfig::default()
        }
    }

    fn member_a() -> Uuid {
        Uuid::parse_str("aaaaaaaa-0000-0000-0000-000000000001").unwrap()
    }

    fn member_b() -> Uuid {
        Uuid::parse_str("bbbbbbbb-0000-0000-0000-000000000002").unwrap()
    }

    fn member_c() -> Uuid {
        Uuid::parse_str("cccccccc-0000-0000-0000-000000000003").unwrap()
    }

    fn build_fixture(fail_for: HashSet<Uuid>) -> Fixture {
        build_fixture_with_store(Arc::new(FakeLeaderboardStore::default()), fail_for)
    }

    /// Three members: a posts a lot, b lost weight, c is idle. Timestamps
    /// are placed relative to the current monthly window so the fixture
    /// behaves the same on any day the tests run.
    fn build_fixture_with_store(
        store: Arc<dyn LeaderboardStore>,
        fail_for: HashSet<Uuid>,
    ) -> Fixture {
        let group_id = Uuid::new_v4();
        let a = member_a();
        let b = member_b();
        let c = member_c();
        let window = crate::period::resolve(PeriodKind::Monthly, Utc::now());

        let group = Group {
            id: group_id,
            name: "Morning Runners".to_string(),
            description: None,
            status: GroupStatus::Approved,
            max_size: None,
            created_at: window.start - ChronoDuration::days(90),
        };

        let events = vec![
            event(a, group_id, ActivityKind::Post, window.start + ChronoDuration::hours(1)),
            event(a, group_id, ActivityKind::Post, window.start + ChronoDuration::hours(2)),
            event(a, group_id, ActivityKind::Comment, window.start + ChronoDuration::hours(3)),
            event(b, group_id, ActivityKind::Like, window.start + ChronoDuration::hours(4)),
        ];

        let records = vec![
            weight(b, 90.0, window.start - ChronoDuration::days(10)),
            weight(b, 87.0, window.start + ChronoDuration::hours(5)),
        ];

        let groups = Arc::new(FakeGroupStore {
            groups: HashMap::from([(group_id, group)]),
            members: HashMap::from([(group_id, vec![a, b, c])]),
        });
        let activity = Arc::new(FakeActivityStore { events, fail_for });
        let weights = Arc::new(FakeWeightStore { records });
        let cache = Arc::new(InMemoryCache::new());
        let aggregator = Arc::new(MetricAggregator::new(
            activity,
            weights,
            CompositeWeights::default(),
        ));

        let service = LeaderboardService::new(groups, store, aggregator, cache, test_config());

        Fixture {
            service,
            group_id,
            member_ids: vec![a, b, c],
        }
    }

    #[tokio::test]
    async fn rebuild_ranks_whole_group() {
        let fixture = build_fixture(HashSet::new());
        let summary = fixture
            .service
            .rebuild(fixture.group_id, PeriodKind::Monthly)
            .await
            .unwrap();

        assert_eq!(summary.scored, 3);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.ranked, 3);

        let page = fixture
            .service
            .fetch(fixture.group_id, PeriodKind::Monthly, 10, None)
            .await
            .unwrap();

        assert_eq!(page.entries.len(), 3);
        // Ranks are contiguous 1..N
        let ranks: Vec<i32> = page.entries.iter().map(|e| e.rank.unwrap()).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        // Rank order is non-increasing in total score
        for pair in page.entries.windows(2) {
            assert!(pair[0].total_score >= pair[1].total_score);
        }
        // b's weight loss (300 * 0.5) beats a's activity (25 * 0.3)
        assert_eq!(page.entries[0].user_id, fixture.member_ids[1]);
        // The idle member scores zero everywhere but is still ranked
        let idle = &page.entries[2];
        assert_eq!(idle.user_id, fixture.member_ids[2]);
        assert_eq!(idle.activity_score, 0.0);
        assert_eq!(idle.weight_loss_score, 0.0);
        assert_eq!(idle.streak_score, 0.0);
        assert_eq!(idle.total_score, 0.0);
    }

    #[tokio::test]
    async fn rebuild_is_idempotent() {
        let fixture = build_fixture(HashSet::new());
        fixture
            .service
            .rebuild(fixture.group_id, PeriodKind::Monthly)
            .await
            .unwrap();
        let first = fixture
            .service
            .fetch(fixture.group_id, PeriodKind::Monthly, 10, None)
            .await
            .unwrap();

        fixture
            .service
            .rebuild(fixture.group_id, PeriodKind::Monthly)
            .await
            .unwrap();
        let second = fixture
            .service
            .fetch(fixture.group_id, PeriodKind::Monthly, 10, None)
            .await
            .unwrap();

        assert_eq!(first.entries, second.entries);
    }

    #[tokio::test]
    async fn failed_member_is_skipped_not_fatal() {
        let fixture = build_fixture(HashSet::from([member_a()]));

        let summary = fixture
            .service
            .rebuild(fixture.group_id, PeriodKind::Monthly)
            .await
            .unwrap();

        assert_eq!(summary.scored, 2);
        assert_eq!(summary.skipped, 1);

        let page = fixture
            .service
            .fetch(fixture.group_id, PeriodKind::Monthly, 10, None)
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 2);
        let ranks: Vec<i32> = page.entries.iter().map(|e| e.rank.unwrap()).collect();
        assert_eq!(ranks, vec![1, 2]);
    }

    #[tokio::test]
    async fn fetch_returns_self_entry_outside_top_n() {
        let fixture = build_fixture(HashSet::new());
        fixture
            .service
            .rebuild(fixture.group_id, PeriodKind::Monthly)
            .await
            .unwrap();

        let idle_member = fixture.member_ids[2];
        let page = fixture
            .service
            .fetch(fixture.group_id, PeriodKind::Monthly, 1, Some(idle_member))
            .await
            .unwrap();

        assert_eq!(page.entries.len(), 1);
        assert_ne!(page.entries[0].user_id, idle_member);
        let own = page.self_entry.expect("requester has an entry");
        assert_eq!(own.user_id, idle_member);
        assert_eq!(own.rank, Some(3));
    }

    #[tokio::test]
    async fn cold_and_warm_cache_agree() {
        let fixture = build_fixture(HashSet::new());
        fixture
            .service
            .rebuild(fixture.group_id, PeriodKind::Monthly)
            .await
            .unwrap();

        let cold = fixture
            .service
            .fetch(fixture.group_id, PeriodKind::Monthly, 10, None)
            .await
            .unwrap();
        let warm = fixture
            .service
            .fetch(fixture.group_id, PeriodKind::Monthly, 10, None)
            .await
            .unwrap();

        assert_eq!(cold.entries, warm.entries);
    }

    #[tokio::test]
    async fn fetch_unknown_group_is_not_found() {
        let fixture = build_fixture(HashSet::new());
        let result = fixture
            .service
            .fetch(Uuid::new_v4(), PeriodKind::Weekly, 10, None)
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn fetch_rejects_non_positive_limit() {
        let fixture = build_fixture(HashSet::new());
        let result = fixture
            .service
            .fetch(fixture.group_id, PeriodKind::Weekly, 0, None)
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn dense_ranks_break_ties_by_user_id() {
        let group_id = Uuid::new_v4();
        let now = Utc::now();
        let low = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        let high = Uuid::parse_str("00000000-0000-0000-0000-000000000002").unwrap();

        let entry = |user_id: Uuid, total: f64| LeaderboardEntry {
            group_id,
            user_id,
            period_kind: PeriodKind::Weekly,
            period_start: now,
            period_end: now,
            activity_score: 0.0,
            weight_loss_score: 0.0,
            streak_score: 0.0,
            total_score: total,
            rank: None,
        };

        let ranks = assign_dense_ranks(&[entry(high, 50.0), entry(low, 50.0)]);
        assert_eq!(ranks, vec![(low, 1), (high, 2)]);
    }

    #[tokio::test]
    async fn rank_barrier_retries_transient_read_failures() {
        // Two failed read-backs, then the third attempt sees the partition.
        let store = Arc::new(FlakyLeaderboardStore::new(2));
        let fixture = build_fixture_with_store(store, HashSet::new());

        let summary = fixture
            .service
            .rebuild(fixture.group_id, PeriodKind::Monthly)
            .await
            .unwrap();

        assert_eq!(summary.scored, 3);
        assert_eq!(summary.ranked, 3);

        let page = fixture
            .service
            .fetch(fixture.group_id, PeriodKind::Monthly, 10, None)
            .await
            .unwrap();
        let ranks: Vec<i32> = page.entries.iter().map(|e| e.rank.unwrap()).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn rank_barrier_exhaustion_fails_without_writing_ranks() {
        // Every configured attempt fails, so the rebuild errors out.
        let store = Arc::new(FlakyLeaderboardStore::new(3));
        let fixture = build_fixture_with_store(store.clone(), HashSet::new());

        let result = fixture
            .service
            .rebuild(fixture.group_id, PeriodKind::Monthly)
            .await;
        assert!(matches!(result, Err(AppError::Internal(_))));

        // Score rows were upserted, but no rank landed for any of them.
        let window = crate::period::resolve(PeriodKind::Monthly, Utc::now());
        let rows = store
            .list_partition(fixture.group_id, PeriodKind::Monthly, window.start)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|e| e.rank.is_none()));
    }

    #[tokio::test]
    async fn fetch_sheds_single_flight_locks() {
        let fixture = build_fixture(HashSet::new());
        fixture
            .service
            .rebuild(fixture.group_id, PeriodKind::Monthly)
            .await
            .unwrap();

        // Each distinct limit is a distinct cache key; none may linger.
        for limit in 1..=20 {
            fixture
                .service
                .fetch(fixture.group_id, PeriodKind::Monthly, limit, None)
                .await
                .unwrap();
        }
        assert!(fixture.service.flight_locks.is_empty());

        // Warm hits bypass the single flight entirely.
        fixture
            .service
            .fetch(fixture.group_id, PeriodKind::Monthly, 10, None)
            .await
            .unwrap();
        assert!(fixture.service.flight_locks.is_empty());
    }

    #[tokio::test]
    async fn rebuild_sheds_partition_lock() {
        let fixture = build_fixture(HashSet::new());
        fixture
            .service
            .rebuild(fixture.group_id, PeriodKind::Monthly)
            .await
            .unwrap();
        assert!(fixture.service.rebuild_locks.is_empty());
    }
}
