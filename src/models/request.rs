use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::{GeoPoint, VehicleType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Order,
    Ride,
}

/// The order or ride an assignment targets. Exactly one of the two.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum MatchTarget {
    Order(Uuid),
    Ride(Uuid),
}

impl MatchTarget {
    pub fn new(request_type: RequestType, id: Uuid) -> Self {
        match request_type {
            RequestType::Order => MatchTarget::Order(id),
            RequestType::Ride => MatchTarget::Ride(id),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            MatchTarget::Order(id) | MatchTarget::Ride(id) => *id,
        }
    }

    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            MatchTarget::Order(id) => Some(*id),
            MatchTarget::Ride(_) => None,
        }
    }

    pub fn ride_id(&self) -> Option<Uuid> {
        match self {
            MatchTarget::Ride(id) => Some(*id),
            MatchTarget::Order(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Requirements {
    pub vehicle_type: Option<VehicleType>,
    pub min_rating: Option<f64>,
    pub max_distance_km: Option<f64>,
    #[serde(default)]
    pub special_needs: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerPreferences {
    #[serde(default)]
    pub preferred_drivers: Vec<Uuid>,
    pub notes: Option<String>,
}

/// Transient input to one matching attempt. Rebuilt from the persisted
/// [`ServiceRequest`] on every reassignment cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingRequest {
    pub id: Uuid,
    pub request_type: RequestType,
    pub pickup: Option<GeoPoint>,
    pub destination: Option<GeoPoint>,
    pub service_type: String,
    pub estimated_value: Option<f64>,
    #[serde(default)]
    pub requirements: Requirements,
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub preferences: CustomerPreferences,
    #[serde(default)]
    pub excluded_drivers: Vec<Uuid>,
}

impl MatchingRequest {
    pub fn target(&self) -> MatchTarget {
        MatchTarget::new(self.request_type, self.id)
    }

    /// Checks the fields matching cannot run without. Returns the first
    /// problem found.
    pub fn validate(&self) -> Result<GeoPoint, String> {
        if self.id.is_nil() {
            return Err("request id is required".to_string());
        }
        if self.service_type.trim().is_empty() {
            return Err("service type is required".to_string());
        }

        let pickup = match self.pickup {
            Some(point) if point.is_valid() => point,
            Some(_) => return Err("pickup coordinates are out of range".to_string()),
            None => return Err("pickup location is required".to_string()),
        };

        if self.request_type == RequestType::Ride {
            match self.destination {
                Some(point) if point.is_valid() => {}
                Some(_) => return Err("destination coordinates are out of range".to_string()),
                None => return Err("destination is required for rides".to_string()),
            }
        }

        Ok(pickup)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentStatus {
    Pending,
    Offered,
    Assigned,
    Completed,
    Unmatched,
    Cancelled,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "pending",
            FulfillmentStatus::Offered => "offered",
            FulfillmentStatus::Assigned => "assigned",
            FulfillmentStatus::Completed => "completed",
            FulfillmentStatus::Unmatched => "unmatched",
            FulfillmentStatus::Cancelled => "cancelled",
        }
    }
}

/// Persisted order or ride as seen by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub request_type: RequestType,
    pub pickup: GeoPoint,
    pub destination: Option<GeoPoint>,
    pub service_type: String,
    pub estimated_value: Option<f64>,
    pub requirements: Requirements,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub preferences: CustomerPreferences,
    pub priority: i32,
    pub status: FulfillmentStatus,
    pub driver_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRequest {
    pub fn target(&self) -> MatchTarget {
        MatchTarget::new(self.request_type, self.id)
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            FulfillmentStatus::Pending | FulfillmentStatus::Offered
        )
    }

    pub fn to_matching_request(&self) -> MatchingRequest {
        MatchingRequest {
            id: self.id,
            request_type: self.request_type,
            pickup: Some(self.pickup),
            destination: self.destination,
            service_type: self.service_type.clone(),
            estimated_value: self.estimated_value,
            requirements: self.requirements.clone(),
            scheduled_at: self.scheduled_at,
            preferences: self.preferences.clone(),
            excluded_drivers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{MatchingRequest, RequestType};
    use crate::models::driver::GeoPoint;

    fn ride() -> MatchingRequest {
        MatchingRequest {
            id: Uuid::new_v4(),
            request_type: RequestType::Ride,
            pickup: Some(GeoPoint { lat: 0.0, lng: 0.0 }),
            destination: Some(GeoPoint { lat: 0.1, lng: 0.1 }),
            service_type: "ride".to_string(),
            estimated_value: None,
            requirements: Default::default(),
            scheduled_at: None,
            preferences: Default::default(),
            excluded_drivers: Vec::new(),
        }
    }

    #[test]
    fn ride_without_destination_is_invalid() {
        let mut request = ride();
        request.destination = None;
        assert!(request.validate().unwrap_err().contains("destination"));
    }

    #[test]
    fn order_without_destination_is_valid() {
        let mut request = ride();
        request.request_type = RequestType::Order;
        request.destination = None;
        assert!(request.validate().is_ok());
    }

    #[test]
    fn nil_id_and_blank_service_type_are_rejected() {
        let mut request = ride();
        request.id = Uuid::nil();
        assert!(request.validate().is_err());

        let mut request = ride();
        request.service_type = "  ".to_string();
        assert!(request.validate().is_err());
    }

    #[test]
    fn out_of_range_pickup_is_rejected() {
        let mut request = ride();
        request.pickup = Some(GeoPoint { lat: 91.0, lng: 0.0 });
        assert!(request.validate().is_err());
    }
}
