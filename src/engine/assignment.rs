use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::{MatchingEngine, OfferEventKind};
use crate::error::AppError;
use crate::models::assignment::{
    AssignmentStatus, DriverAssignmentHistory, MatchingAssignment,
};
use crate::models::matching::{DriverMatch, MatchFailure, MatchingResult};
use crate::models::request::{MatchingRequest, ServiceRequest};

/// Priority given to the best-ranked offer; each lower rank gets one less.
const TOP_PRIORITY: i32 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub matching: MatchingResult,
    pub assignments: Vec<MatchingAssignment>,
    pub queued_for_reassignment: bool,
}

impl MatchingEngine {
    /// Turns a ranked match list into pending offers, one per match, all
    /// persisted together with their history rows. Fails with a conflict when
    /// the request was closed in the meantime.
    pub async fn create_assignments(
        &self,
        request: &MatchingRequest,
        matches: &[DriverMatch],
    ) -> Result<Vec<MatchingAssignment>, AppError> {
        if matches.is_empty() {
            return Ok(Vec::new());
        }

        let config = self.current_config().await;
        let now = Utc::now();
        let response_timeout = now + Duration::seconds(config.assignment_timeout_secs);
        let target = request.target();

        let offers: Vec<(MatchingAssignment, DriverAssignmentHistory)> = matches
            .iter()
            .enumerate()
            .map(|(rank, matched)| {
                let assignment = MatchingAssignment {
                    id: Uuid::new_v4(),
                    config_version: config.version,
                    driver_id: matched.driver_id,
                    target,
                    assignment_type: request.request_type,
                    scores: matched.scores,
                    distance_km: matched.distance_km,
                    eta_minutes: matched.eta_minutes,
                    priority: TOP_PRIORITY - rank as i32,
                    status: AssignmentStatus::Pending,
                    offered_at: now,
                    response_timeout,
                    accepted_at: None,
                    rejected_at: None,
                    rejection_reason: None,
                    expired_at: None,
                    cancelled_at: None,
                    response_time_secs: None,
                };
                let history = DriverAssignmentHistory::for_assignment(&assignment);
                (assignment, history)
            })
            .collect();

        let assignments: Vec<MatchingAssignment> =
            offers.iter().map(|(assignment, _)| assignment.clone()).collect();

        self.store.insert_offers(offers).await?;

        self.metrics
            .offers_created_total
            .inc_by(assignments.len() as u64);
        for assignment in &assignments {
            self.publish(OfferEventKind::Offered, assignment);
        }

        info!(
            request_id = %request.id,
            offers = assignments.len(),
            timeout_secs = config.assignment_timeout_secs,
            "offers created"
        );

        Ok(assignments)
    }

    /// Rebuilds the matching input for a stored request, leaving out drivers
    /// that already declined or ignored an offer for it.
    pub async fn build_matching_request(
        &self,
        request: &ServiceRequest,
    ) -> Result<MatchingRequest, AppError> {
        let mut matching = request.to_matching_request();
        matching.excluded_drivers = self
            .store
            .assignments_for_request(request.id)
            .await?
            .into_iter()
            .filter(|assignment| {
                matches!(
                    assignment.status,
                    AssignmentStatus::Rejected | AssignmentStatus::Expired
                )
            })
            .map(|assignment| assignment.driver_id)
            .collect();
        Ok(matching)
    }

    /// Matches a stored request and offers it to the ranked drivers. An empty
    /// driver pool queues the request for reassignment.
    pub async fn dispatch_request(&self, request_id: Uuid) -> Result<DispatchOutcome, AppError> {
        let request = self.store.get_request(request_id).await?;
        if !request.is_open() {
            return Err(AppError::Conflict(format!(
                "request {request_id} is not awaiting a driver"
            )));
        }

        let matching = self.build_matching_request(&request).await?;
        let result = self.find_matches(&matching).await;

        if result.success {
            let assignments = self.create_assignments(&matching, &result.matches).await?;
            return Ok(DispatchOutcome {
                matching: result,
                assignments,
                queued_for_reassignment: false,
            });
        }

        match &result.error {
            Some(MatchFailure::NoDriversAvailable) => {
                self.enqueue_reassignment(request.target(), None, "no_drivers_available")
                    .await?;
                Ok(DispatchOutcome {
                    matching: result,
                    assignments: Vec::new(),
                    queued_for_reassignment: true,
                })
            }
            Some(MatchFailure::InvalidRequest(reason)) => {
                Err(AppError::BadRequest(reason.clone()))
            }
            Some(MatchFailure::Internal(reason)) => Err(AppError::Internal(reason.clone())),
            None => Err(AppError::Internal("matching failed without a reason".to_string())),
        }
    }
}
