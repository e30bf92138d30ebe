use crate::models::assignment::ScoreBreakdown;
use crate::models::config::{MatchingAlgorithmConfig, ScoringWeights};
use crate::models::driver::{BatterySnapshot, ConnectionType, ConnectivitySnapshot, DriverCandidate};

/// Component score used when a driver has no performance rollup yet.
const NEUTRAL_SCORE: f64 = 0.5;

/// Scores one eligible candidate. `max_distance_km` is the radius the
/// candidate was located with, so widened searches keep far drivers above zero.
pub fn compute_score(
    candidate: &DriverCandidate,
    max_distance_km: f64,
    config: &MatchingAlgorithmConfig,
) -> ScoreBreakdown {
    let metrics = candidate.metrics.as_ref();

    let mut breakdown = ScoreBreakdown {
        total: 0.0,
        distance: distance_score(candidate.distance_km, max_distance_km),
        rating: rating_score(candidate.rating),
        completion_rate: metrics
            .map(|m| completion_rate_score(m.completion_rate, config.min_completion_rate))
            .unwrap_or(NEUTRAL_SCORE),
        response_time: metrics
            .and_then(|m| m.avg_response_time_secs)
            .map(|avg| response_time_score(avg, config.max_response_time_secs))
            .unwrap_or(NEUTRAL_SCORE),
        availability: availability_score(
            candidate.battery.as_ref(),
            candidate.connectivity.as_ref(),
        ),
    };

    breakdown.total = weighted_score(&breakdown, &config.weights);
    breakdown
}

/// Plain weighted sum. Weights are relative multipliers and are not
/// normalized, so the total is only bounded by `weights.sum()`.
pub fn weighted_score(breakdown: &ScoreBreakdown, weights: &ScoringWeights) -> f64 {
    (breakdown.distance * weights.distance)
        + (breakdown.rating * weights.rating)
        + (breakdown.completion_rate * weights.completion_rate)
        + (breakdown.response_time * weights.response_time)
        + (breakdown.availability * weights.availability)
}

/// Total scaled into [0, 1] by the weight sum, for consumers that need a
/// bounded value.
pub fn normalized_total(breakdown: &ScoreBreakdown, weights: &ScoringWeights) -> f64 {
    let sum = weights.sum();
    if sum <= 0.0 {
        return 0.0;
    }
    (breakdown.total / sum).clamp(0.0, 1.0)
}

fn distance_score(distance_km: f64, max_distance_km: f64) -> f64 {
    if max_distance_km <= 0.0 {
        return 0.0;
    }
    (1.0 - distance_km.max(0.0) / max_distance_km).clamp(0.0, 1.0)
}

fn rating_score(rating: f64) -> f64 {
    ((rating - 1.0) / 4.0).clamp(0.0, 1.0)
}

// Capped at the configured floor: any driver meeting the minimum scores 1.0.
fn completion_rate_score(completion_rate: f64, min_completion_rate: f64) -> f64 {
    if min_completion_rate <= 0.0 {
        return 1.0;
    }
    (completion_rate.max(0.0) / min_completion_rate).min(1.0)
}

fn response_time_score(avg_response_secs: f64, max_response_secs: f64) -> f64 {
    if max_response_secs <= 0.0 {
        return 0.0;
    }
    (1.0 - avg_response_secs.max(0.0) / max_response_secs).clamp(0.0, 1.0)
}

fn availability_score(
    battery: Option<&BatterySnapshot>,
    connectivity: Option<&ConnectivitySnapshot>,
) -> f64 {
    let mut score: f64 = 0.5;

    if let Some(battery) = battery {
        if battery.level >= 50.0 {
            score += 0.2;
        }
        if battery.level >= 80.0 {
            score += 0.1;
        }
        if battery.is_low {
            score -= 0.2;
        }
    }

    if let Some(connectivity) = connectivity {
        if connectivity.signal_strength >= 70.0 {
            score += 0.1;
        }
        if connectivity.connection_type == ConnectionType::Wifi {
            score += 0.1;
        }
    }

    score.clamp(0.0, 1.0)
}
