use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{patch, post};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{
    AvailabilityStatus, BatterySnapshot, ConnectionType, ConnectivitySnapshot, Driver,
    DriverPreferences, GeoPoint, VehicleType, VerificationStatus,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/location", patch(update_driver_location))
        .route("/drivers/:id/status", patch(update_driver_status))
        .route("/drivers/:id/telemetry", patch(update_driver_telemetry))
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub location: Option<GeoPoint>,
    pub vehicle_type: VehicleType,
    pub service_types: Vec<String>,
    pub rating: f64,
    pub verification_status: VerificationStatus,
    #[serde(default = "default_true")]
    pub is_available: bool,
    pub status: Option<AvailabilityStatus>,
    pub preferences: Option<DriverPreferences>,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AvailabilityStatus,
}

#[derive(Deserialize)]
pub struct BatteryReport {
    pub level: f64,
    #[serde(default)]
    pub is_low: bool,
    #[serde(default)]
    pub is_critical: bool,
}

#[derive(Deserialize)]
pub struct ConnectivityReport {
    pub is_connected: bool,
    pub signal_strength: f64,
    pub connection_type: ConnectionType,
}

#[derive(Deserialize)]
pub struct UpdateTelemetryRequest {
    pub battery: Option<BatteryReport>,
    pub connectivity: Option<ConnectivityReport>,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if payload.service_types.is_empty() {
        return Err(AppError::BadRequest(
            "at least one service type is required".to_string(),
        ));
    }
    if payload.location.is_some_and(|location| !location.is_valid()) {
        return Err(AppError::BadRequest("location is out of range".to_string()));
    }

    let now = Utc::now();
    let mut driver = Driver {
        id: Uuid::new_v4(),
        name: payload.name,
        location: payload.location,
        vehicle_type: payload.vehicle_type,
        service_types: payload.service_types,
        is_available: payload.is_available,
        verification_status: payload.verification_status,
        rating: payload.rating.clamp(1.0, 5.0),
        completed_deliveries: 0,
        completed_rides: 0,
        current_status: None,
        battery: None,
        connectivity: None,
        latest_metrics: None,
        preferences: payload.preferences,
        updated_at: now,
    };
    driver.set_availability(payload.status.unwrap_or(AvailabilityStatus::Available), now);

    state.engine.store().upsert_driver(driver.clone()).await?;
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Driver>>, AppError> {
    let drivers = state.engine.store().list_drivers().await?;
    Ok(Json(drivers))
}

async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    if !payload.location.is_valid() {
        return Err(AppError::BadRequest("location is out of range".to_string()));
    }

    let store = state.engine.store();
    let mut driver = store.get_driver(id).await?;
    driver.location = Some(payload.location);
    driver.updated_at = Utc::now();
    store.upsert_driver(driver.clone()).await?;

    Ok(Json(driver))
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    let store = state.engine.store();
    let mut driver = store.get_driver(id).await?;
    driver.set_availability(payload.status, Utc::now());
    store.upsert_driver(driver.clone()).await?;

    Ok(Json(driver))
}

async fn update_driver_telemetry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTelemetryRequest>,
) -> Result<Json<Driver>, AppError> {
    let store = state.engine.store();
    let mut driver = store.get_driver(id).await?;
    let now = Utc::now();

    if let Some(battery) = payload.battery {
        driver.battery = Some(BatterySnapshot {
            level: battery.level.clamp(0.0, 100.0),
            is_low: battery.is_low,
            is_critical: battery.is_critical,
            recorded_at: now,
        });
    }
    if let Some(connectivity) = payload.connectivity {
        driver.connectivity = Some(ConnectivitySnapshot {
            is_connected: connectivity.is_connected,
            signal_strength: connectivity.signal_strength.clamp(0.0, 100.0),
            connection_type: connectivity.connection_type,
            recorded_at: now,
        });
    }
    driver.updated_at = now;
    store.upsert_driver(driver.clone()).await?;

    Ok(Json(driver))
}
