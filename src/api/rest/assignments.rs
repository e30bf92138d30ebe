use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::{DriverResponse, MatchingAssignment, ResponseOutcome};
use crate::models::config::MatchingAlgorithmConfig;
use crate::models::matching::{MatchingResult, MatchingStatistics, TimeRange};
use crate::models::request::MatchingRequest;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/matches", post(find_matches))
        .route("/assignments/:id", get(get_assignment))
        .route("/assignments/:id/response", post(respond_to_assignment))
        .route("/statistics", get(statistics))
        .route("/config", get(current_config))
        .route("/config/refresh", post(refresh_config))
}

#[derive(Deserialize)]
pub struct ResponseRequest {
    pub driver_id: Uuid,
    pub response: DriverResponse,
    pub rejection_reason: Option<String>,
}

#[derive(Deserialize)]
pub struct StatisticsQuery {
    pub hours: Option<i64>,
}

async fn find_matches(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MatchingRequest>,
) -> Json<MatchingResult> {
    Json(state.engine.find_matches(&payload).await)
}

async fn get_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchingAssignment>, AppError> {
    let assignment = state.engine.store().get_assignment(id).await?;
    Ok(Json(assignment))
}

async fn respond_to_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResponseRequest>,
) -> Result<Json<ResponseOutcome>, AppError> {
    let outcome = state
        .engine
        .handle_driver_response(
            id,
            payload.driver_id,
            payload.response,
            payload.rejection_reason,
        )
        .await?;
    Ok(Json(outcome))
}

async fn statistics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatisticsQuery>,
) -> Result<Json<MatchingStatistics>, AppError> {
    let hours = query.hours.unwrap_or(24);
    if hours <= 0 {
        return Err(AppError::BadRequest("hours must be positive".to_string()));
    }

    let to = Utc::now();
    let range = TimeRange {
        from: to - Duration::hours(hours),
        to,
    };
    let stats = state.engine.get_matching_statistics(range).await?;
    Ok(Json(stats))
}

async fn current_config(State(state): State<Arc<AppState>>) -> Json<MatchingAlgorithmConfig> {
    Json(state.engine.current_config().await.as_ref().clone())
}

async fn refresh_config(State(state): State<Arc<AppState>>) -> Json<MatchingAlgorithmConfig> {
    Json(state.engine.refresh_config().await.as_ref().clone())
}
