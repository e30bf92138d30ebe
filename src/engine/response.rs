use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{MatchingEngine, OfferEventKind};
use crate::error::AppError;
use crate::models::assignment::{DriverResponse, MatchingAssignment, ResponseOutcome};
use crate::store::StoreError;

fn unavailable(err: StoreError) -> AppError {
    match err {
        StoreError::Conflict(msg) => {
            AppError::Conflict(format!("assignment no longer available: {msg}"))
        }
        other => other.into(),
    }
}

impl MatchingEngine {
    /// Applies a driver's answer to one offer. Accepting cancels every other
    /// pending offer for the same request; rejecting the last pending offer
    /// queues the request for reassignment.
    pub async fn handle_driver_response(
        &self,
        assignment_id: Uuid,
        driver_id: Uuid,
        response: DriverResponse,
        rejection_reason: Option<String>,
    ) -> Result<ResponseOutcome, AppError> {
        let assignment = self.store.get_assignment(assignment_id).await?;

        if assignment.driver_id != driver_id {
            warn!(
                %assignment_id,
                %driver_id,
                "driver responded to an offer made to someone else"
            );
            return Err(AppError::Forbidden(format!(
                "driver {driver_id} is not the recipient of assignment {assignment_id}"
            )));
        }

        if assignment.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "assignment no longer available: already {}",
                assignment.status.as_str()
            )));
        }

        let now = Utc::now();
        if now > assignment.response_timeout {
            match self.expire_offer(assignment_id, now).await {
                Ok(_) | Err(AppError::Conflict(_)) => {}
                Err(err) => warn!(%assignment_id, error = %err, "failed to expire late offer"),
            }
            return Err(AppError::Conflict(
                "assignment no longer available: offer expired".to_string(),
            ));
        }

        let outcome = match response {
            DriverResponse::Accepted => self.accept_offer(assignment_id, now).await?,
            DriverResponse::Rejected => {
                self.reject_offer(assignment_id, rejection_reason, now)
                    .await?
            }
        };

        if let Err(err) = self.update_driver_performance_metrics(driver_id).await {
            warn!(%driver_id, error = %err, "failed to refresh driver performance metrics");
        }

        Ok(outcome)
    }

    async fn accept_offer(
        &self,
        assignment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ResponseOutcome, AppError> {
        let accepted = self
            .store
            .accept_offer(assignment_id, now)
            .await
            .map_err(unavailable)?;

        self.metrics.record_transition("accepted");
        self.publish(OfferEventKind::Accepted, &accepted.assignment);
        for sibling in &accepted.cancelled {
            self.metrics.record_transition("cancelled");
            self.publish(OfferEventKind::Cancelled, sibling);
        }

        info!(
            %assignment_id,
            request_id = %accepted.assignment.request_id(),
            driver_id = %accepted.assignment.driver_id,
            cancelled = accepted.cancelled.len(),
            "offer accepted"
        );

        Ok(ResponseOutcome {
            cancelled_siblings: accepted.cancelled.iter().map(|sibling| sibling.id).collect(),
            assignment: accepted.assignment,
            requires_reassignment: false,
        })
    }

    async fn reject_offer(
        &self,
        assignment_id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ResponseOutcome, AppError> {
        let rejected = self
            .store
            .reject_offer(assignment_id, reason, now)
            .await
            .map_err(unavailable)?;

        self.metrics.record_transition("rejected");
        self.publish(OfferEventKind::Rejected, &rejected.assignment);

        info!(
            %assignment_id,
            request_id = %rejected.assignment.request_id(),
            driver_id = %rejected.assignment.driver_id,
            pending_siblings = rejected.pending_siblings,
            "offer rejected"
        );

        let requires_reassignment = if rejected.pending_siblings == 0 {
            self.on_offers_exhausted(&rejected.assignment, "rejected")
                .await?
        } else {
            false
        };

        Ok(ResponseOutcome {
            assignment: rejected.assignment,
            requires_reassignment,
            cancelled_siblings: Vec::new(),
        })
    }

    /// Called once the last pending offer of a request resolved without an
    /// acceptance. Queues the request unless it was closed in the meantime.
    pub(crate) async fn on_offers_exhausted(
        &self,
        last: &MatchingAssignment,
        reason: &str,
    ) -> Result<bool, AppError> {
        let request = self.store.get_request(last.request_id()).await?;
        if !request.is_open() {
            return Ok(false);
        }

        match self
            .enqueue_reassignment(last.target, Some(last.driver_id), reason)
            .await
        {
            Ok(_) => Ok(true),
            Err(AppError::Conflict(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
