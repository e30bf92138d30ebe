use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Weekly per-driver rollup. One row per driver and `period_start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverPerformanceMetrics {
    pub driver_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_assignments: u32,
    pub accepted_assignments: u32,
    pub rejected_assignments: u32,
    pub expired_assignments: u32,
    pub completed_assignments: u32,
    pub acceptance_rate: f64,
    pub completion_rate: f64,
    pub avg_response_time_secs: Option<f64>,
    pub updated_at: DateTime<Utc>,
}
