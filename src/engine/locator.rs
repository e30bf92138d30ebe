use std::fmt;

use tracing::debug;

use crate::geo::haversine_km;
use crate::models::config::MatchingAlgorithmConfig;
use crate::models::driver::{
    AvailabilityStatus, Driver, DriverCandidate, GeoPoint, VerificationStatus,
};
use crate::models::request::MatchingRequest;
use crate::store::{DriverQuery, MatchingStore, StoreError};

/// Why a driver was excluded. Any of these removes the driver outright; none
/// of them lowers a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    Unavailable,
    Unverified,
    RatingBelowFloor,
    ServiceTypeMismatch,
    VehicleTypeMismatch,
    Excluded,
    NoPosition,
    StatusNotAvailable,
    TooFar,
    BatteryCritical,
    Disconnected,
    OrderValueOutOfBounds,
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Ineligibility::Unavailable => "not accepting work",
            Ineligibility::Unverified => "not verified",
            Ineligibility::RatingBelowFloor => "rating below floor",
            Ineligibility::ServiceTypeMismatch => "service type not supported",
            Ineligibility::VehicleTypeMismatch => "vehicle type not accepted",
            Ineligibility::Excluded => "already declined this request",
            Ineligibility::NoPosition => "no known position",
            Ineligibility::StatusNotAvailable => "current status is not available",
            Ineligibility::TooFar => "outside search radius",
            Ineligibility::BatteryCritical => "battery critical",
            Ineligibility::Disconnected => "disconnected",
            Ineligibility::OrderValueOutOfBounds => "order value outside driver preferences",
        };
        f.write_str(reason)
    }
}

pub fn effective_min_rating(request: &MatchingRequest, config: &MatchingAlgorithmConfig) -> f64 {
    request.requirements.min_rating.unwrap_or(config.min_rating)
}

pub fn effective_max_distance(request: &MatchingRequest, config: &MatchingAlgorithmConfig) -> f64 {
    request
        .requirements
        .max_distance_km
        .unwrap_or(config.max_distance_km)
}

/// Applies every hard constraint to one driver, in order, and projects the
/// driver into a candidate when all of them pass.
pub fn check_eligibility(
    driver: &Driver,
    request: &MatchingRequest,
    pickup: &GeoPoint,
    config: &MatchingAlgorithmConfig,
) -> Result<DriverCandidate, Ineligibility> {
    if !driver.is_available {
        return Err(Ineligibility::Unavailable);
    }
    if driver.verification_status != VerificationStatus::Verified {
        return Err(Ineligibility::Unverified);
    }
    if driver.rating < effective_min_rating(request, config) {
        return Err(Ineligibility::RatingBelowFloor);
    }
    if !driver.supports_service(&request.service_type) {
        return Err(Ineligibility::ServiceTypeMismatch);
    }
    if let Some(required) = request.requirements.vehicle_type {
        if driver.vehicle_type != required {
            return Err(Ineligibility::VehicleTypeMismatch);
        }
    }
    if request.excluded_drivers.contains(&driver.id) {
        return Err(Ineligibility::Excluded);
    }

    let location = driver.location.ok_or(Ineligibility::NoPosition)?;

    if driver.availability() != Some(AvailabilityStatus::Available) {
        return Err(Ineligibility::StatusNotAvailable);
    }

    let distance_km = haversine_km(&location, pickup);
    let mut max_distance = effective_max_distance(request, config);
    if request.requirements.max_distance_km.is_none() {
        if let Some(preferred) = driver
            .preferences
            .as_ref()
            .and_then(|prefs| prefs.max_distance_km)
        {
            max_distance = max_distance.min(preferred);
        }
    }
    if distance_km > max_distance {
        return Err(Ineligibility::TooFar);
    }

    if driver.battery.as_ref().is_some_and(|battery| battery.is_critical) {
        return Err(Ineligibility::BatteryCritical);
    }
    if driver
        .connectivity
        .as_ref()
        .is_some_and(|connectivity| !connectivity.is_connected)
    {
        return Err(Ineligibility::Disconnected);
    }

    if let (Some(value), Some(prefs)) = (request.estimated_value, driver.preferences.as_ref()) {
        let below_min = prefs.min_order_value.is_some_and(|min| value < min);
        let above_max = prefs.max_order_value.is_some_and(|max| value > max);
        if below_min || above_max {
            return Err(Ineligibility::OrderValueOutOfBounds);
        }
    }

    Ok(DriverCandidate {
        driver_id: driver.id,
        location,
        vehicle_type: driver.vehicle_type,
        rating: driver.rating,
        completed_deliveries: driver.completed_deliveries,
        completed_rides: driver.completed_rides,
        distance_km,
        battery: driver.battery.clone(),
        connectivity: driver.connectivity.clone(),
        metrics: driver.latest_metrics.clone(),
    })
}

/// Eligible candidates for `request`, in the store's order. An empty result is
/// a normal outcome.
pub async fn locate_candidates(
    store: &dyn MatchingStore,
    request: &MatchingRequest,
    pickup: &GeoPoint,
    config: &MatchingAlgorithmConfig,
) -> Result<Vec<DriverCandidate>, StoreError> {
    let query = DriverQuery {
        service_type: request.service_type.clone(),
        min_rating: effective_min_rating(request, config),
    };
    let drivers = store.query_drivers(&query).await?;

    let candidates = drivers
        .iter()
        .filter_map(|driver| match check_eligibility(driver, request, pickup, config) {
            Ok(candidate) => Some(candidate),
            Err(reason) => {
                debug!(request_id = %request.id, driver_id = %driver.id, %reason, "driver excluded");
                None
            }
        })
        .collect();

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::driver::{
        AvailabilityRecord, BatterySnapshot, ConnectionType, ConnectivitySnapshot,
        DriverPreferences, VehicleType,
    };
    use crate::models::request::RequestType;

    const PICKUP: GeoPoint = GeoPoint { lat: 0.0, lng: 0.0 };

    fn driver() -> Driver {
        let now = Utc::now();
        Driver {
            id: Uuid::from_u128(7),
            name: "test-driver".to_string(),
            location: Some(GeoPoint { lat: 0.0, lng: 0.01 }),
            vehicle_type: VehicleType::Car,
            service_types: vec!["delivery".to_string()],
            is_available: true,
            verification_status: VerificationStatus::Verified,
            rating: 4.5,
            completed_deliveries: 120,
            completed_rides: 0,
            current_status: Some(AvailabilityRecord {
                status: AvailabilityStatus::Available,
                started_at: now,
            }),
            battery: None,
            connectivity: None,
            latest_metrics: None,
            preferences: None,
            updated_at: now,
        }
    }

    fn request() -> MatchingRequest {
        MatchingRequest {
            id: Uuid::new_v4(),
            request_type: RequestType::Order,
            pickup: Some(PICKUP),
            destination: None,
            service_type: "delivery".to_string(),
            estimated_value: Some(40.0),
            requirements: Default::default(),
            scheduled_at: None,
            preferences: Default::default(),
            excluded_drivers: Vec::new(),
        }
    }

    fn check(driver: &Driver, request: &MatchingRequest) -> Result<DriverCandidate, Ineligibility> {
        check_eligibility(driver, request, &PICKUP, &MatchingAlgorithmConfig::default())
    }

    #[test]
    fn eligible_driver_is_projected_with_distance() {
        let candidate = check(&driver(), &request()).unwrap();
        assert!((candidate.distance_km - 1.11).abs() < 0.01);
    }

    #[test]
    fn each_hard_filter_excludes_on_its_own() {
        let req = request();
        let now = Utc::now();

        let mut d = driver();
        d.is_available = false;
        assert_eq!(check(&d, &req).unwrap_err(), Ineligibility::Unavailable);

        let mut d = driver();
        d.verification_status = VerificationStatus::Pending;
        assert_eq!(check(&d, &req).unwrap_err(), Ineligibility::Unverified);

        let mut d = driver();
        d.rating = 2.9;
        assert_eq!(check(&d, &req).unwrap_err(), Ineligibility::RatingBelowFloor);

        let mut d = driver();
        d.service_types = vec!["ride".to_string()];
        assert_eq!(check(&d, &req).unwrap_err(), Ineligibility::ServiceTypeMismatch);

        let mut d = driver();
        d.location = None;
        assert_eq!(check(&d, &req).unwrap_err(), Ineligibility::NoPosition);

        let mut d = driver();
        d.set_availability(AvailabilityStatus::Busy, now);
        assert_eq!(check(&d, &req).unwrap_err(), Ineligibility::StatusNotAvailable);

        let mut d = driver();
        d.location = Some(GeoPoint { lat: 0.0, lng: 0.2 });
        assert_eq!(check(&d, &req).unwrap_err(), Ineligibility::TooFar);

        let mut d = driver();
        d.battery = Some(BatterySnapshot {
            level: 3.0,
            is_low: true,
            is_critical: true,
            recorded_at: now,
        });
        assert_eq!(check(&d, &req).unwrap_err(), Ineligibility::BatteryCritical);

        let mut d = driver();
        d.connectivity = Some(ConnectivitySnapshot {
            is_connected: false,
            signal_strength: 0.0,
            connection_type: ConnectionType::Cellular4g,
            recorded_at: now,
        });
        assert_eq!(check(&d, &req).unwrap_err(), Ineligibility::Disconnected);

        let mut d = driver();
        d.preferences = Some(DriverPreferences {
            max_distance_km: None,
            min_order_value: Some(50.0),
            max_order_value: None,
        });
        assert_eq!(check(&d, &req).unwrap_err(), Ineligibility::OrderValueOutOfBounds);
    }

    #[test]
    fn both_marker_matches_any_service_type() {
        let mut d = driver();
        d.service_types = vec!["both".to_string()];
        assert!(check(&d, &request()).is_ok());
    }

    #[test]
    fn driver_preference_tightens_radius_unless_request_overrides() {
        let mut d = driver();
        d.location = Some(GeoPoint { lat: 0.0, lng: 0.05 });
        d.preferences = Some(DriverPreferences {
            max_distance_km: Some(3.0),
            ..Default::default()
        });

        assert_eq!(check(&d, &request()).unwrap_err(), Ineligibility::TooFar);

        let mut widened = request();
        widened.requirements.max_distance_km = Some(30.0);
        assert!(check(&d, &widened).is_ok());
    }

    #[test]
    fn request_rating_override_replaces_config_floor() {
        let mut d = driver();
        d.rating = 4.2;
        let mut req = request();
        req.requirements.min_rating = Some(4.5);
        assert_eq!(check(&d, &req).unwrap_err(), Ineligibility::RatingBelowFloor);
    }

    #[test]
    fn excluded_driver_is_skipped() {
        let d = driver();
        let mut req = request();
        req.excluded_drivers.push(d.id);
        assert_eq!(check(&d, &req).unwrap_err(), Ineligibility::Excluded);
    }
}
