//! HTTP surface of the scoring engine.
//!
//! Three read/write operations: fetch a leaderboard page, trigger a
//! rebuild, and fetch recommendations - plus the dismissal write that
//! feeds the recommendation exclusion rules.

use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::{GroupMatchScore, PeriodKind};
use crate::error::AppError;
use crate::repository::DismissalStore;
use crate::services::{LeaderboardPage, LeaderboardService, RebuildSummary, RecommendationService};

/// Shared handler state
pub struct AppState {
    pub leaderboard: Arc<LeaderboardService>,
    pub recommender: Arc<RecommendationService>,
    pub dismissals: Arc<dyn DismissalStore>,
}

fn default_limit() -> i64 {
    10
}

fn default_max_results() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub period: PeriodKind,
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Requesting member, for the "your position" row
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RebuildQuery {
    pub period: PeriodKind,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    #[serde(default = "default_max_results")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<GroupMatchScore>,
}

#[derive(Debug, Serialize)]
pub struct DismissResponse {
    pub dismissed: bool,
}

#[get("/groups/{group_id}/leaderboard")]
pub async fn get_leaderboard(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<LeaderboardQuery>,
) -> Result<web::Json<LeaderboardPage>, AppError> {
    let group_id = path.into_inner();
    let page = state
        .leaderboard
        .fetch(group_id, query.period, query.limit, query.user_id)
        .await?;
    Ok(web::Json(page))
}

#[post("/groups/{group_id}/leaderboard/rebuild")]
pub async fn rebuild_leaderboard(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<RebuildQuery>,
) -> Result<web::Json<RebuildSummary>, AppError> {
    let group_id = path.into_inner();
    let summary = state.leaderboard.rebuild(group_id, query.period).await?;
    Ok(web::Json(summary))
}

#[get("/users/{user_id}/recommendations")]
pub async fn get_recommendations(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<RecommendationQuery>,
) -> Result<web::Json<RecommendationsResponse>, AppError> {
    let user_id = path.into_inner();
    let recommendations = state.recommender.recommend(user_id, query.limit).await?;
    Ok(web::Json(RecommendationsResponse { recommendations }))
}

#[post("/users/{user_id}/recommendations/{group_id}/dismiss")]
pub async fn dismiss_recommendation(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<web::Json<DismissResponse>, AppError> {
    let (user_id, group_id) = path.into_inner();
    let dismissed = state
        .dismissals
        .dismiss(user_id, group_id)
        .await
        .map_err(AppError::from)?;
    Ok(web::Json(DismissResponse { dismissed }))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}
