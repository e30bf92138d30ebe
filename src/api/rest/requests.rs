use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::assignment::DispatchOutcome;
use crate::engine::lifecycle::CancellationOutcome;
use crate::error::AppError;
use crate::models::assignment::{DriverAssignmentHistory, MatchingAssignment};
use crate::models::driver::GeoPoint;
use crate::models::request::{
    CustomerPreferences, FulfillmentStatus, RequestType, Requirements, ServiceRequest,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/rides", post(create_ride))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/assignments", get(list_request_assignments))
        .route("/requests/:id/cancel", post(cancel_request))
        .route("/requests/:id/complete", post(complete_request))
}

#[derive(Deserialize)]
pub struct CreateRequest {
    pub pickup: GeoPoint,
    pub destination: Option<GeoPoint>,
    pub service_type: String,
    pub estimated_value: Option<f64>,
    #[serde(default)]
    pub requirements: Requirements,
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub preferences: CustomerPreferences,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Serialize)]
pub struct CreatedRequest {
    pub request: ServiceRequest,
    pub dispatch: DispatchOutcome,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRequest>,
) -> Result<Json<CreatedRequest>, AppError> {
    create(state, RequestType::Order, payload).await
}

async fn create_ride(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRequest>,
) -> Result<Json<CreatedRequest>, AppError> {
    create(state, RequestType::Ride, payload).await
}

async fn create(
    state: Arc<AppState>,
    request_type: RequestType,
    payload: CreateRequest,
) -> Result<Json<CreatedRequest>, AppError> {
    let now = Utc::now();
    let request = ServiceRequest {
        id: Uuid::new_v4(),
        request_type,
        pickup: payload.pickup,
        destination: payload.destination,
        service_type: payload.service_type,
        estimated_value: payload.estimated_value,
        requirements: payload.requirements,
        scheduled_at: payload.scheduled_at,
        preferences: payload.preferences,
        priority: payload.priority,
        status: FulfillmentStatus::Pending,
        driver_id: None,
        created_at: now,
        updated_at: now,
    };

    request
        .to_matching_request()
        .validate()
        .map_err(AppError::BadRequest)?;

    let engine = &state.engine;
    engine.store().insert_request(request.clone()).await?;
    let dispatch = engine.dispatch_request(request.id).await?;
    let request = engine.store().get_request(request.id).await?;

    Ok(Json(CreatedRequest { request, dispatch }))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, AppError> {
    let request = state.engine.store().get_request(id).await?;
    Ok(Json(request))
}

async fn list_request_assignments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MatchingAssignment>>, AppError> {
    let store = state.engine.store();
    store.get_request(id).await?;
    let assignments = store.assignments_for_request(id).await?;
    Ok(Json(assignments))
}

async fn cancel_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancellationOutcome>, AppError> {
    let outcome = state.engine.cancel_request(id).await?;
    Ok(Json(outcome))
}

async fn complete_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DriverAssignmentHistory>, AppError> {
    let row = state.engine.record_completion(id).await?;
    Ok(Json(row))
}
