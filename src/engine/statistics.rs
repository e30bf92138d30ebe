use std::collections::HashSet;

use crate::engine::MatchingEngine;
use crate::error::AppError;
use crate::models::assignment::AssignmentStatus;
use crate::models::matching::{MatchingStatistics, TimeRange};

impl MatchingEngine {
    /// Aggregate offer outcomes for offers made within `range`, plus the most
    /// recent offers as a sample.
    pub async fn get_matching_statistics(
        &self,
        range: TimeRange,
    ) -> Result<MatchingStatistics, AppError> {
        if range.to <= range.from {
            return Err(AppError::BadRequest(
                "time range end must be after its start".to_string(),
            ));
        }

        let assignments = self
            .store
            .assignments_between(range.from, range.to)
            .await?;

        let count = |status: AssignmentStatus| {
            assignments
                .iter()
                .filter(|assignment| assignment.status == status)
                .count()
        };
        let accepted = count(AssignmentStatus::Accepted);
        let rejected = count(AssignmentStatus::Rejected);
        let expired = count(AssignmentStatus::Expired);
        let pending = count(AssignmentStatus::Pending);

        let requests: HashSet<_> = assignments.iter().map(|a| a.request_id()).collect();
        let matched: HashSet<_> = assignments
            .iter()
            .filter(|a| a.status == AssignmentStatus::Accepted)
            .map(|a| a.request_id())
            .collect();

        let response_times: Vec<f64> = assignments
            .iter()
            .filter_map(|a| a.response_time_secs)
            .collect();

        let rate = |numerator: usize, denominator: usize| {
            if denominator == 0 {
                0.0
            } else {
                numerator as f64 / denominator as f64
            }
        };

        Ok(MatchingStatistics {
            range,
            total_assignments: assignments.len(),
            successful_assignments: accepted,
            failed_assignments: rejected + expired,
            pending_assignments: pending,
            total_requests: requests.len(),
            matched_requests: matched.len(),
            success_rate: rate(matched.len(), requests.len()),
            acceptance_rate: rate(accepted, accepted + rejected + expired),
            avg_response_time_secs: (!response_times.is_empty())
                .then(|| response_times.iter().sum::<f64>() / response_times.len() as f64),
            recent_assignments: assignments
                .into_iter()
                .take(self.settings.recent_sample_size)
                .collect(),
        })
    }
}
