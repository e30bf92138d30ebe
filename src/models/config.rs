use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relative multipliers for the five score components. They are not
/// normalized: the total score is the plain weighted sum, so a weight set
/// summing to more than 1.0 produces totals above 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoringWeights {
    pub distance: f64,
    pub rating: f64,
    pub completion_rate: f64,
    pub response_time: f64,
    pub availability: f64,
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.distance + self.rating + self.completion_rate + self.response_time + self.availability
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            distance: 0.40,
            rating: 0.25,
            completion_rate: 0.20,
            response_time: 0.10,
            availability: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchingAlgorithmConfig {
    pub version: u32,
    pub name: String,
    pub weights: ScoringWeights,
    pub max_distance_km: f64,
    pub min_rating: f64,
    pub min_completion_rate: f64,
    pub max_response_time_secs: f64,
    pub max_assignments: usize,
    pub assignment_timeout_secs: i64,
    pub reassignment_delay_secs: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Default for MatchingAlgorithmConfig {
    fn default() -> Self {
        Self {
            version: 1,
            name: "default".to_string(),
            weights: ScoringWeights::default(),
            max_distance_km: 15.0,
            min_rating: 3.0,
            min_completion_rate: 0.8,
            max_response_time_secs: 120.0,
            max_assignments: 3,
            assignment_timeout_secs: 60,
            reassignment_delay_secs: 30,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MatchingAlgorithmConfig;

    #[test]
    fn default_config_matches_documented_values() {
        let config = MatchingAlgorithmConfig::default();
        assert_eq!(config.max_distance_km, 15.0);
        assert_eq!(config.max_assignments, 3);
        assert_eq!(config.assignment_timeout_secs, 60);
        assert_eq!(config.reassignment_delay_secs, 30);
        assert_eq!(config.min_rating, 3.0);
        assert_eq!(config.min_completion_rate, 0.8);
        assert_eq!(config.max_response_time_secs, 120.0);
        assert!((config.weights.sum() - 1.0).abs() < 1e-9);
    }
}
