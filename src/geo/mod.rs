use crate::models::driver::{GeoPoint, VehicleType};

const EARTH_RADIUS_KM: f64 = 6_371.0;
const ETA_BUFFER_MINUTES: u32 = 5;
const MIN_ETA_MINUTES: u32 = 5;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.min(1.0).sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Average urban speed in km/h.
pub fn vehicle_speed_kmh(vehicle: VehicleType) -> f64 {
    match vehicle {
        VehicleType::Bicycle => 15.0,
        VehicleType::Motorcycle => 35.0,
        VehicleType::Car => 30.0,
        VehicleType::Van => 25.0,
        VehicleType::Truck => 20.0,
        VehicleType::Other => 30.0,
    }
}

/// Travel time rounded up to whole minutes plus a fixed pickup buffer.
pub fn estimate_eta_minutes(distance_km: f64, vehicle: VehicleType) -> u32 {
    let travel_minutes = (distance_km.max(0.0) / vehicle_speed_kmh(vehicle) * 60.0).ceil() as u32;
    (travel_minutes + ETA_BUFFER_MINUTES).max(MIN_ETA_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::{estimate_eta_minutes, haversine_km};
    use crate::models::driver::{GeoPoint, VehicleType};

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 53.5511,
            lng: 9.9937,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoPoint { lat: -33.86, lng: 151.2 };
        let b = GeoPoint { lat: 35.68, lng: 139.69 };
        assert!((haversine_km(&a, &b) - haversine_km(&b, &a)).abs() < 1e-9);
    }

    #[test]
    fn eta_adds_buffer_to_rounded_travel_time() {
        // 1.1 km by car is 2.2 minutes, rounded up to 3, plus the buffer.
        assert_eq!(estimate_eta_minutes(1.1, VehicleType::Car), 8);
        assert_eq!(estimate_eta_minutes(0.0, VehicleType::Car), 5);
        assert_eq!(estimate_eta_minutes(15.0, VehicleType::Bicycle), 65);
        assert_eq!(
            estimate_eta_minutes(3.0, VehicleType::Other),
            estimate_eta_minutes(3.0, VehicleType::Car)
        );
    }
}
