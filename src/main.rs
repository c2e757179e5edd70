use actix_web::{web, App, HttpServer};
use redis::aio::ConnectionManager;
use std::io;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scoring_service::cache::RedisScoreCache;
use scoring_service::config::Config;
use scoring_service::handlers::{
    dismiss_recommendation, get_leaderboard, get_recommendations, health, rebuild_leaderboard,
    AppState,
};
use scoring_service::repository::{
    ActivityRepository, DismissalRepository, GroupRepository, LeaderboardRepository,
    SocialRepository, WeightRepository,
};
use scoring_service::services::{
    CompositeWeights, LeaderboardService, MetricAggregator, RecommendationService,
};

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");

    tracing::info!("Starting scoring-service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    // Initialize database
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .expect("Failed to create database pool");

    // Initialize Redis
    let redis_client =
        redis::Client::open(config.redis.url.clone()).expect("Failed to parse Redis URL");
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .expect("Failed to connect to Redis");
    let cache = Arc::new(RedisScoreCache::new(Arc::new(Mutex::new(redis_conn))));

    // Wire repositories and services
    let groups = Arc::new(GroupRepository::new(db_pool.clone()));
    let activity = Arc::new(ActivityRepository::new(db_pool.clone()));
    let weights = Arc::new(WeightRepository::new(db_pool.clone()));
    let social = Arc::new(SocialRepository::new(db_pool.clone()));
    let leaderboard_store = Arc::new(LeaderboardRepository::new(db_pool.clone()));
    let dismissals = Arc::new(DismissalRepository::new(db_pool.clone()));

    let aggregator = Arc::new(MetricAggregator::new(
        activity.clone(),
        weights,
        CompositeWeights::default(),
    ));

    let leaderboard = Arc::new(LeaderboardService::new(
        groups.clone(),
        leaderboard_store,
        aggregator,
        cache,
        config.scoring.clone(),
    ));

    let recommender = Arc::new(RecommendationService::new(
        groups,
        social,
        activity,
        config.scoring.clone(),
    ));

    let state = web::Data::new(AppState {
        leaderboard,
        recommender,
        dismissals,
    });

    let bind_addr = format!("{}:{}", config.app.host, config.app.http_port);
    tracing::info!("Listening on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health))
            .service(get_leaderboard)
            .service(rebuild_leaderboard)
            .service(get_recommendations)
            .service(dismiss_recommendation)
    })
    .bind(bind_addr)?
    .run()
    .await
}
