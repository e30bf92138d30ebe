use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{MatchingEngine, OfferEventKind};
use crate::error::AppError;
use crate::models::assignment::DriverAssignmentHistory;
use crate::models::driver::AvailabilityStatus;
use crate::models::request::FulfillmentStatus;

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub request_id: Uuid,
    pub cancelled_offers: Vec<Uuid>,
    pub cancelled_reassignment: Option<Uuid>,
}

impl MatchingEngine {
    /// Upstream cancellation of an order or ride: pending offers become
    /// cancelled and any queued reassignment is withdrawn. A request that
    /// already has a driver cannot be cancelled here. Cancelling twice is a
    /// no-op.
    pub async fn cancel_request(&self, request_id: Uuid) -> Result<CancellationOutcome, AppError> {
        let now = Utc::now();
        let cancelled = self.store.cancel_request(request_id, now).await?;
        for assignment in &cancelled {
            self.metrics.record_transition("cancelled");
            self.publish(OfferEventKind::Cancelled, assignment);
        }

        let withdrawn = self.store.cancel_reassignment(request_id, now).await?;
        self.refresh_queue_depth().await;

        info!(
            %request_id,
            cancelled_offers = cancelled.len(),
            withdrew_reassignment = withdrawn.is_some(),
            "request cancelled"
        );

        Ok(CancellationOutcome {
            request_id,
            cancelled_offers: cancelled.iter().map(|assignment| assignment.id).collect(),
            cancelled_reassignment: withdrawn.map(|item| item.id),
        })
    }

    /// Records that the accepted driver finished the request and frees the
    /// driver for new offers.
    pub async fn record_completion(
        &self,
        request_id: Uuid,
    ) -> Result<DriverAssignmentHistory, AppError> {
        let request = self.store.get_request(request_id).await?;
        if request.status != FulfillmentStatus::Assigned {
            return Err(AppError::Conflict(format!(
                "request {request_id} is {}, not assigned",
                request.status.as_str()
            )));
        }

        let now = Utc::now();
        let row = self.store.mark_completed(request_id, now).await?;
        self.store
            .set_request_status(request_id, FulfillmentStatus::Completed)
            .await?;

        let mut driver = self.store.get_driver(row.driver_id).await?;
        driver.set_availability(AvailabilityStatus::Available, now);
        self.store.upsert_driver(driver).await?;

        if let Err(err) = self.update_driver_performance_metrics(row.driver_id).await {
            warn!(driver_id = %row.driver_id, error = %err, "failed to refresh driver performance metrics");
        }

        info!(%request_id, driver_id = %row.driver_id, "request completed");
        Ok(row)
    }
}
