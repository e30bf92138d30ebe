use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::metrics::DriverPerformanceMetrics;

/// Service-type marker that makes a driver eligible for every service type.
pub const ANY_SERVICE_TYPE: &str = "both";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Bicycle,
    Motorcycle,
    Car,
    Van,
    Truck,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityStatus {
    Available,
    Busy,
    Break,
    Offline,
}

/// The open availability period of a driver. Replaced, not appended, when the
/// status changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub status: AvailabilityStatus,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatterySnapshot {
    pub level: f64,
    #[serde(default)]
    pub is_low: bool,
    #[serde(default)]
    pub is_critical: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Wifi,
    Cellular5g,
    Cellular4g,
    Cellular3g,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivitySnapshot {
    pub is_connected: bool,
    pub signal_strength: f64,
    pub connection_type: ConnectionType,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverPreferences {
    pub max_distance_km: Option<f64>,
    pub min_order_value: Option<f64>,
    pub max_order_value: Option<f64>,
}

/// A driver row together with its current-state projection. The status,
/// battery, connectivity and metrics fields are updated in place so the
/// locator never scans history to find "the latest" record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub location: Option<GeoPoint>,
    pub vehicle_type: VehicleType,
    pub service_types: Vec<String>,
    pub is_available: bool,
    pub verification_status: VerificationStatus,
    pub rating: f64,
    pub completed_deliveries: u32,
    pub completed_rides: u32,
    pub current_status: Option<AvailabilityRecord>,
    pub battery: Option<BatterySnapshot>,
    pub connectivity: Option<ConnectivitySnapshot>,
    pub latest_metrics: Option<DriverPerformanceMetrics>,
    pub preferences: Option<DriverPreferences>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn supports_service(&self, service_type: &str) -> bool {
        self.service_types.iter().any(|supported| {
            supported.eq_ignore_ascii_case(service_type)
                || supported.eq_ignore_ascii_case(ANY_SERVICE_TYPE)
        })
    }

    pub fn availability(&self) -> Option<AvailabilityStatus> {
        self.current_status.as_ref().map(|record| record.status)
    }

    pub fn set_availability(&mut self, status: AvailabilityStatus, at: DateTime<Utc>) {
        self.current_status = Some(AvailabilityRecord {
            status,
            started_at: at,
        });
        self.updated_at = at;
    }
}

/// Read-only projection of an eligible driver handed to the scorer.
#[derive(Debug, Clone, Serialize)]
pub struct DriverCandidate {
    pub driver_id: Uuid,
    pub location: GeoPoint,
    pub vehicle_type: VehicleType,
    pub rating: f64,
    pub completed_deliveries: u32,
    pub completed_rides: u32,
    pub distance_km: f64,
    pub battery: Option<BatterySnapshot>,
    pub connectivity: Option<ConnectivitySnapshot>,
    pub metrics: Option<DriverPerformanceMetrics>,
}
