//! Leaderboard result cache.
//!
//! Read-through cache in front of leaderboard fetches with:
//! - Versioned key schema
//! - SCAN-based pattern invalidation (no blocking KEYS)
//! - TTL jitter against thundering herds
//!
//! The cache is injected as a trait so services can run against the
//! in-memory implementation in tests, and so correctness never depends on
//! the backend: every failure path degrades to a miss.

mod error;
mod keys;
mod memory;

pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, CACHE_VERSION};
pub use memory::InMemoryCache;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Shared Redis connection manager
pub type SharedRedis = Arc<Mutex<ConnectionManager>>;

/// Cache operations used by the scoring services.
///
/// Values are pre-serialized JSON strings; keeping the trait non-generic
/// keeps it object-safe so services can hold `Arc<dyn ScoreCache>`.
#[async_trait]
pub trait ScoreCache: Send + Sync {
    /// Get a raw value from cache
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a raw value with TTL
    async fn set_raw(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()>;

    /// Delete every key matching a pattern; returns the number deleted
    async fn invalidate_pattern(&self, pattern: &str) -> CacheResult<usize>;
}

/// Redis-backed cache client
#[derive(Clone)]
pub struct RedisScoreCache {
    redis: SharedRedis,
}

impl RedisScoreCache {
    pub fn new(redis: SharedRedis) -> Self {
        Self { redis }
    }

    /// Add jitter to TTL to prevent thundering herd
    fn add_jitter(ttl_secs: u64) -> u64 {
        let jitter_percent = (rand::random::<u32>() % 10) as f64 / 100.0;
        let jitter = (ttl_secs as f64 * jitter_percent).round() as u64;
        ttl_secs + jitter
    }
}

#[async_trait]
impl ScoreCache for RedisScoreCache {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.redis.lock().await;
        let value: Option<String> = conn.get(key).await.map_err(CacheError::Redis)?;

        debug!(key = %key, hit = value.is_some(), "Cache get");
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        let ttl_with_jitter = Self::add_jitter(ttl_secs);

        let mut conn = self.redis.lock().await;
        conn.set_ex::<_, _, ()>(key, value, ttl_with_jitter)
            .await
            .map_err(CacheError::Redis)?;

        debug!(key = %key, ttl = ttl_with_jitter, "Cache set");
        Ok(())
    }

    async fn invalidate_pattern(&self, pattern: &str) -> CacheResult<usize> {
        let mut conn = self.redis.lock().await;
        let mut cursor: u64 = 0;
        let mut total_deleted = 0;

        loop {
            // SCAN instead of KEYS to avoid blocking the server
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await
                .map_err(CacheError::Redis)?;

            if !keys.is_empty() {
                let mut pipe = Pipeline::new();
                for key in &keys {
                    pipe.del(key);
                }
                pipe.query_async::<_, ()>(&mut *conn)
                    .await
                    .map_err(CacheError::Redis)?;

                total_deleted += keys.len();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %pattern, deleted = total_deleted, "Cache invalidate");
        Ok(total_deleted)
    }
}
