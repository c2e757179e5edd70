/// Configuration management for the scoring service.
///
/// Loads configuration from environment variables.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// Scoring engine tunables
    pub scoring: ScoringConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port
    pub http_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    pub max_connections: u32,
    /// Min connections in pool
    pub min_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
}

/// Scoring engine tunables.
///
/// These are process-level knobs, never per-request parameters. The score
/// weights and match bucket boundaries live as constants next to the code
/// that applies them (see `services::composite` and `services::matching`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Concurrency bound for per-member score computation during rebuild
    pub rebuild_concurrency: usize,
    /// Per-member aggregation timeout (ms); a timeout skips the member
    pub member_timeout_ms: u64,
    /// Maximum candidate groups scored per recommendation request
    pub candidate_cap: i64,
    /// TTL for cached leaderboard pages (seconds)
    pub leaderboard_ttl_secs: u64,
    /// Attempts for the rank-assignment read-back barrier
    pub rank_retry_attempts: u32,
    /// Base backoff between rank barrier attempts (ms, doubles each retry)
    pub rank_retry_base_ms: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            rebuild_concurrency: 8,
            member_timeout_ms: 5_000,
            candidate_cap: 50,
            leaderboard_ttl_secs: 300,
            rank_retry_attempts: 3,
            rank_retry_base_ms: 100,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: std::env::var("PORT")
                .unwrap_or_else(|_| "8014".to_string())
                .parse()
                .context("PORT must be a valid u16")?,
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?,
            min_connections: std::env::var("DATABASE_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("DATABASE_MIN_CONNECTIONS must be a valid u32")?,
        };

        let redis = RedisConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        };

        let scoring = ScoringConfig {
            rebuild_concurrency: std::env::var("REBUILD_CONCURRENCY")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .context("REBUILD_CONCURRENCY must be a valid usize")?,
            member_timeout_ms: std::env::var("MEMBER_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .context("MEMBER_TIMEOUT_MS must be a valid u64")?,
            candidate_cap: std::env::var("CANDIDATE_CAP")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("CANDIDATE_CAP must be a valid i64")?,
            leaderboard_ttl_secs: std::env::var("LEADERBOARD_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("LEADERBOARD_TTL_SECS must be a valid u64")?,
            rank_retry_attempts: std::env::var("RANK_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("RANK_RETRY_ATTEMPTS must be a valid u32")?,
            rank_retry_base_ms: std::env::var("RANK_RETRY_BASE_MS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("RANK_RETRY_BASE_MS must be a valid u64")?,
        };

        Ok(Config {
            app,
            database,
            redis,
            scoring,
        })
    }
}
