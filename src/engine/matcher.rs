use std::time::Instant;

use tracing::{info, warn};

use crate::engine::MatchingEngine;
use crate::engine::locator::{effective_max_distance, locate_candidates};
use crate::engine::scoring::compute_score;
use crate::geo::estimate_eta_minutes;
use crate::models::config::MatchingAlgorithmConfig;
use crate::models::matching::{
    ALGORITHM_TYPE, AlgorithmInfo, DriverMatch, MatchFailure, MatchingResult,
};
use crate::models::request::MatchingRequest;

impl MatchingEngine {
    /// Validates, locates, scores and ranks candidates for one request.
    /// Never fails: every problem is reported inside the result.
    pub async fn find_matches(&self, request: &MatchingRequest) -> MatchingResult {
        let started = Instant::now();
        let config = self.current_config().await;
        let outcome = self.rank_candidates(request, &config).await;
        let elapsed = started.elapsed().as_secs_f64();

        let algorithm = AlgorithmInfo {
            algorithm_type: ALGORITHM_TYPE,
            version: config.version,
            processing_time_ms: elapsed * 1000.0,
        };

        match outcome {
            Ok(matches) => {
                self.metrics.record_match("success", elapsed);
                let estimated_wait_minutes = matches.first().map(|best| best.eta_minutes);
                info!(
                    request_id = %request.id,
                    matches = matches.len(),
                    best_score = matches.first().map(|best| best.scores.total),
                    "matches found"
                );

                MatchingResult {
                    success: true,
                    matches,
                    estimated_wait_minutes,
                    error: None,
                    algorithm,
                }
            }
            Err(failure) => {
                self.metrics.record_match(failure.outcome_label(), elapsed);
                warn!(request_id = %request.id, reason = %failure.message(), "matching failed");

                MatchingResult {
                    success: false,
                    matches: Vec::new(),
                    estimated_wait_minutes: None,
                    error: Some(failure),
                    algorithm,
                }
            }
        }
    }

    async fn rank_candidates(
        &self,
        request: &MatchingRequest,
        config: &MatchingAlgorithmConfig,
    ) -> Result<Vec<DriverMatch>, MatchFailure> {
        let pickup = request.validate().map_err(MatchFailure::InvalidRequest)?;

        let candidates = self
            .bounded(locate_candidates(
                self.store.as_ref(),
                request,
                &pickup,
                config,
            ))
            .await
            .map_err(|err| MatchFailure::Internal(err.to_string()))?;

        if candidates.is_empty() {
            return Err(MatchFailure::NoDriversAvailable);
        }

        let max_distance = effective_max_distance(request, config);
        let mut matches: Vec<DriverMatch> = candidates
            .iter()
            .map(|candidate| DriverMatch {
                driver_id: candidate.driver_id,
                vehicle_type: candidate.vehicle_type,
                distance_km: candidate.distance_km,
                eta_minutes: estimate_eta_minutes(candidate.distance_km, candidate.vehicle_type),
                scores: compute_score(candidate, max_distance, config),
            })
            .collect();

        // Stable sort: equal totals keep the locator's order.
        matches.sort_by(|a, b| b.scores.total.total_cmp(&a.scores.total));
        matches.truncate(config.max_assignments);

        Ok(matches)
    }
}
