use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub engine: EngineSettings,
    pub expiry_sweep_interval: Duration,
    pub reassignment_sweep_interval: Duration,
    pub performance_rollup_interval: Duration,
}

/// Knobs the engine itself reads. Algorithm tuning lives in the versioned
/// `MatchingAlgorithmConfig` instead.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub reassignment_batch_size: usize,
    pub max_reassignment_attempts: u32,
    pub store_timeout: Duration,
    pub recent_sample_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            reassignment_batch_size: 10,
            max_reassignment_attempts: 3,
            store_timeout: Duration::from_millis(2_000),
            recent_sample_size: 20,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT") {
            Ok(raw) if raw.eq_ignore_ascii_case("json") => LogFormat::Json,
            Ok(raw) if raw.eq_ignore_ascii_case("compact") => LogFormat::Compact,
            Ok(raw) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {raw} (expected compact or json)"
                )));
            }
            Err(_) => LogFormat::Compact,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            engine: EngineSettings {
                reassignment_batch_size: parse_or_default("REASSIGNMENT_BATCH_SIZE", 10)?,
                max_reassignment_attempts: parse_or_default("MAX_REASSIGNMENT_ATTEMPTS", 3)?,
                store_timeout: Duration::from_millis(parse_or_default("STORE_TIMEOUT_MS", 2_000)?),
                recent_sample_size: 20,
            },
            expiry_sweep_interval: Duration::from_secs(parse_or_default(
                "EXPIRY_SWEEP_INTERVAL_SECS",
                10,
            )?),
            reassignment_sweep_interval: Duration::from_secs(parse_or_default(
                "REASSIGNMENT_SWEEP_INTERVAL_SECS",
                15,
            )?),
            performance_rollup_interval: Duration::from_secs(parse_or_default(
                "PERFORMANCE_ROLLUP_INTERVAL_SECS",
                3_600,
            )?),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
