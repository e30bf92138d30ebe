use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::{MatchingEngine, OfferEventKind};
use crate::error::AppError;

impl MatchingEngine {
    pub async fn expire_overdue_offers(&self) -> Result<usize, AppError> {
        self.expire_overdue_offers_at(Utc::now()).await
    }

    /// Expires every pending offer whose response timeout is at or before
    /// `now`. Offers answered concurrently are skipped.
    pub async fn expire_overdue_offers_at(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let overdue = self.store.overdue_offers(now).await?;
        let mut expired = 0;

        for assignment_id in overdue {
            match self.expire_offer(assignment_id, now).await {
                Ok(_) => expired += 1,
                Err(AppError::Conflict(_)) => {}
                Err(err) => {
                    error!(%assignment_id, error = %err, "failed to expire offer");
                }
            }
        }

        if expired > 0 {
            info!(expired, "expired overdue offers");
        }
        Ok(expired)
    }

    /// Returns whether the request was queued for reassignment.
    pub(crate) async fn expire_offer(
        &self,
        assignment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let expired = self.store.expire_offer(assignment_id, now).await?;

        self.metrics.record_transition("expired");
        self.publish(OfferEventKind::Expired, &expired.assignment);

        if expired.pending_siblings == 0 {
            self.on_offers_exhausted(&expired.assignment, "expired")
                .await
        } else {
            Ok(false)
        }
    }
}

/// Runs the expiry sweep forever. The period never exceeds the active
/// assignment timeout.
pub async fn run_expiry_sweeper(engine: Arc<MatchingEngine>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "expiry sweeper started");

    loop {
        let timeout_secs = engine.current_config().await.assignment_timeout_secs.max(1) as u64;
        tokio::time::sleep(interval.min(Duration::from_secs(timeout_secs))).await;

        if let Err(err) = engine.expire_overdue_offers().await {
            error!(error = %err, "expiry sweep failed");
        }
    }
}
