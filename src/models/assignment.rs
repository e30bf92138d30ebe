use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::request::{MatchTarget, RequestType};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub total: f64,
    pub distance: f64,
    pub rating: f64,
    pub completion_rate: f64,
    pub response_time: f64,
    pub availability: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
    Cancelled,
}

impl AssignmentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AssignmentStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Accepted => "accepted",
            AssignmentStatus::Rejected => "rejected",
            AssignmentStatus::Expired => "expired",
            AssignmentStatus::Cancelled => "cancelled",
        }
    }
}

/// A time-boxed offer of one request to one driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingAssignment {
    pub id: Uuid,
    pub config_version: u32,
    pub driver_id: Uuid,
    pub target: MatchTarget,
    pub assignment_type: RequestType,
    pub scores: ScoreBreakdown,
    pub distance_km: f64,
    pub eta_minutes: u32,
    pub priority: i32,
    pub status: AssignmentStatus,
    pub offered_at: DateTime<Utc>,
    pub response_timeout: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub expired_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub response_time_secs: Option<f64>,
}

impl MatchingAssignment {
    pub fn request_id(&self) -> Uuid {
        self.target.id()
    }

    /// Moves a pending offer into `status`. Terminal offers are left untouched
    /// and `false` is returned.
    pub fn transition(
        &mut self,
        status: AssignmentStatus,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> bool {
        if self.status.is_terminal() || status == AssignmentStatus::Pending {
            return false;
        }

        self.status = status;
        match status {
            AssignmentStatus::Accepted => {
                self.accepted_at = Some(at);
                self.response_time_secs = Some(seconds_between(self.offered_at, at));
            }
            AssignmentStatus::Rejected => {
                self.rejected_at = Some(at);
                self.rejection_reason = reason;
                self.response_time_secs = Some(seconds_between(self.offered_at, at));
            }
            AssignmentStatus::Expired => self.expired_at = Some(at),
            AssignmentStatus::Cancelled => self.cancelled_at = Some(at),
            AssignmentStatus::Pending => {}
        }
        true
    }
}

/// Audit row mirroring one assignment. Written at offer time; the terminal
/// outcome is appended once and never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverAssignmentHistory {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub driver_id: Uuid,
    pub target: MatchTarget,
    pub config_version: u32,
    pub scores: ScoreBreakdown,
    pub distance_km: f64,
    pub eta_minutes: u32,
    pub status: AssignmentStatus,
    pub offered_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub response_time_secs: Option<f64>,
    pub rejection_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DriverAssignmentHistory {
    pub fn for_assignment(assignment: &MatchingAssignment) -> Self {
        Self {
            id: Uuid::new_v4(),
            assignment_id: assignment.id,
            driver_id: assignment.driver_id,
            target: assignment.target,
            config_version: assignment.config_version,
            scores: assignment.scores,
            distance_km: assignment.distance_km,
            eta_minutes: assignment.eta_minutes,
            status: assignment.status,
            offered_at: assignment.offered_at,
            resolved_at: None,
            response_time_secs: None,
            rejection_reason: None,
            completed_at: None,
        }
    }

    /// Appends the terminal outcome of `assignment`. No-op once recorded.
    pub fn record_outcome(&mut self, assignment: &MatchingAssignment, at: DateTime<Utc>) {
        if self.status.is_terminal() || !assignment.status.is_terminal() {
            return;
        }
        self.status = assignment.status;
        self.resolved_at = Some(at);
        self.response_time_secs = assignment.response_time_secs;
        self.rejection_reason = assignment.rejection_reason.clone();
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverResponse {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseOutcome {
    pub assignment: MatchingAssignment,
    pub requires_reassignment: bool,
    pub cancelled_siblings: Vec<Uuid>,
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_milliseconds() as f64 / 1000.0).max(0.0)
}
