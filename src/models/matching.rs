use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::assignment::{MatchingAssignment, ScoreBreakdown};
use crate::models::driver::VehicleType;

pub const ALGORITHM_TYPE: &str = "weighted_multi_factor";

#[derive(Debug, Clone, Serialize)]
pub struct DriverMatch {
    pub driver_id: Uuid,
    pub vehicle_type: VehicleType,
    pub distance_km: f64,
    pub eta_minutes: u32,
    pub scores: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmInfo {
    pub algorithm_type: &'static str,
    pub version: u32,
    pub processing_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum MatchFailure {
    InvalidRequest(String),
    NoDriversAvailable,
    Internal(String),
}

impl MatchFailure {
    pub fn message(&self) -> String {
        match self {
            MatchFailure::InvalidRequest(reason) => format!("invalid request: {reason}"),
            MatchFailure::NoDriversAvailable => "no drivers available in the area".to_string(),
            MatchFailure::Internal(reason) => format!("internal error: {reason}"),
        }
    }

    pub fn outcome_label(&self) -> &'static str {
        match self {
            MatchFailure::InvalidRequest(_) => "invalid",
            MatchFailure::NoDriversAvailable => "no_drivers",
            MatchFailure::Internal(_) => "error",
        }
    }
}

/// Outcome of one `find_matches` call. Callers branch on `success`; the
/// `algorithm` block is filled in on every path.
#[derive(Debug, Clone, Serialize)]
pub struct MatchingResult {
    pub success: bool,
    pub matches: Vec<DriverMatch>,
    pub estimated_wait_minutes: Option<u32>,
    pub error: Option<MatchFailure>,
    pub algorithm: AlgorithmInfo,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at < self.to
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchingStatistics {
    pub range: TimeRange,
    pub total_assignments: usize,
    pub successful_assignments: usize,
    pub failed_assignments: usize,
    pub pending_assignments: usize,
    pub total_requests: usize,
    pub matched_requests: usize,
    pub success_rate: f64,
    pub acceptance_rate: f64,
    pub avg_response_time_secs: Option<f64>,
    pub recent_assignments: Vec<MatchingAssignment>,
}
