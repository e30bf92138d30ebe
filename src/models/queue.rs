use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::request::MatchTarget;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl QueueStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, QueueStatus::Pending | QueueStatus::Processing)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignmentQueueItem {
    pub id: Uuid,
    pub target: MatchTarget,
    pub original_driver_id: Option<Uuid>,
    pub reason: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub priority: i32,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ReassignmentQueueItem {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Pending && self.available_at <= now
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Search radius override for this attempt. The first attempt uses the
    /// regular radius.
    pub fn widened_radius_km(&self) -> Option<f64> {
        if self.attempt <= 1 {
            None
        } else {
            Some(20.0 + self.attempt as f64 * 5.0)
        }
    }

    /// Puts the item back for a later sweep with the next attempt number.
    /// Priority rises with the attempt.
    pub fn schedule_retry(&mut self, now: DateTime<Utc>, delay: Duration, error: String) {
        self.attempt += 1;
        self.priority += 1;
        self.requeue(now, delay, error);
    }

    /// Puts the item back without using up an attempt.
    pub fn requeue(&mut self, now: DateTime<Utc>, delay: Duration, error: String) {
        self.status = QueueStatus::Pending;
        self.processing_started_at = None;
        self.completed_at = None;
        self.available_at = now + delay;
        self.last_error = Some(error);
    }

    pub fn finish(&mut self, status: QueueStatus, now: DateTime<Utc>) {
        self.status = status;
        self.completed_at = Some(now);
    }
}
