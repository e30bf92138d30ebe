use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::MatchingEngine;
use crate::error::AppError;
use crate::models::queue::{QueueStatus, ReassignmentQueueItem};
use crate::models::request::{FulfillmentStatus, MatchTarget};

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

enum ItemOutcome {
    Completed,
    Retried,
    Failed,
    Skipped,
}

impl MatchingEngine {
    /// Queues the request for another matching round. The attempt counter
    /// continues from the request's previous queue item; going past the
    /// attempt ceiling records the item as failed straight away.
    pub async fn enqueue_reassignment(
        &self,
        target: MatchTarget,
        original_driver_id: Option<Uuid>,
        reason: &str,
    ) -> Result<ReassignmentQueueItem, AppError> {
        let request = self.store.get_request(target.id()).await?;
        let previous = self.store.latest_reassignment(target.id()).await?;

        if let Some(active) = previous.as_ref().filter(|item| item.status.is_active()) {
            return Ok(active.clone());
        }

        let config = self.current_config().await;
        let now = Utc::now();
        let attempt = previous.map(|item| item.attempt + 1).unwrap_or(1);
        let max_attempts = self.settings.max_reassignment_attempts;

        let mut item = ReassignmentQueueItem {
            id: Uuid::new_v4(),
            target,
            original_driver_id,
            reason: reason.to_string(),
            attempt,
            max_attempts,
            priority: request.priority + attempt as i32,
            status: QueueStatus::Pending,
            created_at: now,
            available_at: now + Duration::seconds(config.reassignment_delay_secs),
            processing_started_at: None,
            completed_at: None,
            last_error: None,
        };

        if attempt > max_attempts {
            item.last_error = Some("reassignment attempts exhausted".to_string());
            item.finish(QueueStatus::Failed, now);
            self.store.enqueue_reassignment(item.clone()).await?;
            self.store
                .set_request_status(target.id(), FulfillmentStatus::Unmatched)
                .await?;
            self.metrics
                .reassignments_total
                .with_label_values(&["failed"])
                .inc();
            warn!(request_id = %target.id(), attempt, "request could not be matched");
            return Ok(item);
        }

        if !self.store.enqueue_reassignment(item.clone()).await? {
            return self
                .store
                .latest_reassignment(target.id())
                .await?
                .ok_or_else(|| AppError::Internal("queued item disappeared".to_string()));
        }
        if let Err(err) = self
            .store
            .set_request_status(target.id(), FulfillmentStatus::Pending)
            .await
        {
            if let Err(withdraw_err) = self.store.cancel_reassignment(target.id(), now).await {
                warn!(request_id = %target.id(), error = %withdraw_err, "failed to withdraw queued item");
            }
            self.refresh_queue_depth().await;
            return Err(err.into());
        }
        self.refresh_queue_depth().await;

        info!(
            request_id = %target.id(),
            attempt,
            reason,
            "request queued for reassignment"
        );
        Ok(item)
    }

    /// One pass over the reassignment queue. A failing item is logged and
    /// counted; it never stops the rest of the batch.
    pub async fn process_reassignment_queue(&self) -> Result<SweepReport, AppError> {
        let now = Utc::now();
        let items = self
            .store
            .claim_reassignments(self.settings.reassignment_batch_size, now)
            .await?;

        let mut report = SweepReport {
            claimed: items.len(),
            ..SweepReport::default()
        };

        for item in items {
            let item_id = item.id;
            let request_id = item.target.id();
            match self.process_item(item.clone()).await {
                Ok(ItemOutcome::Completed) => report.completed += 1,
                Ok(ItemOutcome::Retried) => report.retried += 1,
                Ok(ItemOutcome::Failed) => report.failed += 1,
                Ok(ItemOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    report.errors += 1;
                    error!(%item_id, %request_id, error = %err, "reassignment item failed");
                    self.release_after_error(item, err.to_string()).await;
                }
            }
        }

        self.refresh_queue_depth().await;
        if report.claimed > 0 {
            info!(
                claimed = report.claimed,
                completed = report.completed,
                retried = report.retried,
                failed = report.failed,
                "reassignment sweep finished"
            );
        }
        Ok(report)
    }

    async fn process_item(&self, mut item: ReassignmentQueueItem) -> Result<ItemOutcome, AppError> {
        let now = Utc::now();
        let request = self.store.get_request(item.target.id()).await?;

        if !request.is_open() {
            let status = if request.status == FulfillmentStatus::Cancelled {
                QueueStatus::Cancelled
            } else {
                QueueStatus::Completed
            };
            item.finish(status, now);
            self.store.update_reassignment(item).await?;
            self.count_outcome("skipped");
            return Ok(ItemOutcome::Skipped);
        }

        let mut matching = self.build_matching_request(&request).await?;
        if let Some(radius_km) = item.widened_radius_km() {
            matching.requirements.max_distance_km = Some(radius_km);
        }

        let result = self.find_matches(&matching).await;

        if result.success {
            // Marked completed before the offers exist so that a rejection of
            // the new offers can queue the request again.
            item.finish(QueueStatus::Completed, now);
            self.store.update_reassignment(item.clone()).await?;

            return match self.create_assignments(&matching, &result.matches).await {
                Ok(_) => {
                    self.count_outcome("completed");
                    Ok(ItemOutcome::Completed)
                }
                Err(AppError::Conflict(reason)) => {
                    info!(request_id = %request.id, %reason, "request closed before rematch offers");
                    self.count_outcome("skipped");
                    Ok(ItemOutcome::Skipped)
                }
                Err(err) => {
                    warn!(
                        request_id = %request.id,
                        error = %err,
                        "offer creation failed after a successful rematch"
                    );
                    let delay = self.current_config().await.reassignment_delay_secs;
                    item.requeue(Utc::now(), Duration::seconds(delay), err.to_string());
                    self.store.update_reassignment(item).await?;
                    self.count_outcome("retried");
                    Ok(ItemOutcome::Retried)
                }
            };
        }

        let reason = result
            .error
            .as_ref()
            .map(|failure| failure.message())
            .unwrap_or_else(|| "matching failed".to_string());

        if item.is_exhausted() {
            self.fail_item(item, reason).await?;
            return Ok(ItemOutcome::Failed);
        }

        let config = self.current_config().await;
        item.schedule_retry(now, Duration::seconds(config.reassignment_delay_secs), reason);
        info!(
            request_id = %request.id,
            next_attempt = item.attempt,
            "no match on reassignment; retrying later"
        );
        self.store.update_reassignment(item).await?;
        self.count_outcome("retried");
        Ok(ItemOutcome::Retried)
    }

    async fn fail_item(
        &self,
        mut item: ReassignmentQueueItem,
        reason: String,
    ) -> Result<(), AppError> {
        let request_id = item.target.id();
        let attempt = item.attempt;
        item.last_error = Some(reason);
        item.finish(QueueStatus::Failed, Utc::now());
        self.store.update_reassignment(item).await?;
        self.store
            .set_request_status(request_id, FulfillmentStatus::Unmatched)
            .await?;
        self.count_outcome("failed");
        warn!(%request_id, attempt, "reassignment attempts exhausted");
        Ok(())
    }

    /// Puts an item that errored mid-flight back into the queue, or fails it
    /// when no attempts are left.
    async fn release_after_error(&self, mut item: ReassignmentQueueItem, reason: String) {
        let result = if item.is_exhausted() {
            self.fail_item(item, reason).await
        } else {
            let delay = self.current_config().await.reassignment_delay_secs;
            item.schedule_retry(Utc::now(), Duration::seconds(delay), reason);
            self.store
                .update_reassignment(item)
                .await
                .map_err(AppError::from)
        };

        if let Err(err) = result {
            error!(error = %err, "failed to release reassignment item");
        }
    }

    fn count_outcome(&self, outcome: &str) {
        self.metrics
            .reassignments_total
            .with_label_values(&[outcome])
            .inc();
    }
}

pub async fn run_reassignment_worker(engine: Arc<MatchingEngine>, interval: StdDuration) {
    info!(interval_secs = interval.as_secs(), "reassignment worker started");
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        if let Err(err) = engine.process_reassignment_queue().await {
            error!(error = %err, "reassignment sweep failed");
        }
    }
}
