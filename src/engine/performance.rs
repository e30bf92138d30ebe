use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::MatchingEngine;
use crate::error::AppError;
use crate::models::assignment::{AssignmentStatus, DriverAssignmentHistory};
use crate::models::metrics::DriverPerformanceMetrics;

/// Monday 00:00 UTC of the week containing `now`, and the Monday after it.
pub fn week_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let days_since_monday = i64::from(now.weekday().num_days_from_monday());
    let monday = now.date_naive() - Duration::days(days_since_monday);
    let start = monday.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(7))
}

fn ratio(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        f64::from(numerator) / f64::from(denominator)
    }
}

pub fn summarize(
    driver_id: Uuid,
    rows: &[DriverAssignmentHistory],
    window: (DateTime<Utc>, DateTime<Utc>),
    now: DateTime<Utc>,
) -> DriverPerformanceMetrics {
    let count = |status: AssignmentStatus| rows.iter().filter(|row| row.status == status).count() as u32;

    let total = rows.len() as u32;
    let accepted = count(AssignmentStatus::Accepted);
    let completed = rows.iter().filter(|row| row.completed_at.is_some()).count() as u32;

    let response_times: Vec<f64> = rows.iter().filter_map(|row| row.response_time_secs).collect();
    let avg_response_time_secs = if response_times.is_empty() {
        None
    } else {
        Some(response_times.iter().sum::<f64>() / response_times.len() as f64)
    };

    DriverPerformanceMetrics {
        driver_id,
        period_start: window.0,
        period_end: window.1,
        total_assignments: total,
        accepted_assignments: accepted,
        rejected_assignments: count(AssignmentStatus::Rejected),
        expired_assignments: count(AssignmentStatus::Expired),
        completed_assignments: completed,
        acceptance_rate: ratio(accepted, total),
        completion_rate: ratio(completed, accepted),
        avg_response_time_secs,
        updated_at: now,
    }
}

impl MatchingEngine {
    /// Recomputes the current week's rollup for one driver. Repeated calls in
    /// the same week overwrite the same row.
    pub async fn update_driver_performance_metrics(
        &self,
        driver_id: Uuid,
    ) -> Result<DriverPerformanceMetrics, AppError> {
        let now = Utc::now();
        let window = week_window(now);
        let rows = self
            .store
            .history_for_driver(driver_id, window.0, window.1)
            .await?;

        let metrics = summarize(driver_id, &rows, window, now);
        self.store.upsert_performance(metrics.clone()).await?;
        self.metrics
            .driver_acceptance_rate
            .with_label_values(&[&driver_id.to_string()])
            .set(metrics.acceptance_rate);

        Ok(metrics)
    }

    /// Refreshes the rollup of every driver with activity this week.
    pub async fn update_all_performance_metrics(&self) -> Result<usize, AppError> {
        let (from, to) = week_window(Utc::now());
        let drivers = self.store.drivers_with_history(from, to).await?;

        let mut updated = 0;
        for driver_id in drivers {
            match self.update_driver_performance_metrics(driver_id).await {
                Ok(_) => updated += 1,
                Err(err) => warn!(%driver_id, error = %err, "performance rollup failed"),
            }
        }
        Ok(updated)
    }
}

pub async fn run_performance_rollup(engine: Arc<MatchingEngine>, interval: StdDuration) {
    info!(interval_secs = interval.as_secs(), "performance rollup started");
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        match engine.update_all_performance_metrics().await {
            Ok(updated) => info!(drivers = updated, "performance metrics updated"),
            Err(err) => error!(error = %err, "performance rollup failed"),
        }
    }
}
