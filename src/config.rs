use std::env;

use chrono::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub dispatch: DispatchPolicy,
    pub sweep_interval_secs: u64,
    pub search_radius_km: f64,
}

/// Knobs for how many contractors a request is offered to and for how long.
#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    pub batch_size: usize,
    pub assignment_ttl: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: 5,
            assignment_ttl: Duration::hours(24),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let batch_size: usize = parse_or_default("DISPATCH_BATCH_SIZE", 5)?;
        if batch_size == 0 {
            return Err(AppError::Internal(
                "invalid DISPATCH_BATCH_SIZE: must be > 0".to_string(),
            ));
        }
        let ttl_hours: i64 = parse_or_default("ASSIGNMENT_TTL_HOURS", 24)?;
        if ttl_hours <= 0 {
            return Err(AppError::Internal(
                "invalid ASSIGNMENT_TTL_HOURS: must be > 0".to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            dispatch: DispatchPolicy {
                batch_size,
                assignment_ttl: Duration::hours(ttl_hours),
            },
            sweep_interval_secs: parse_or_default("SWEEP_INTERVAL_SECS", 60)?,
            search_radius_km: parse_or_default("SEARCH_RADIUS_KM", 15.0)?,
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
