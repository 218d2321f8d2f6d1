//! Service configuration

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Tunables for cache maintenance
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayConfig {
    /// Devices resolved concurrently per refresh batch
    pub batch_size: usize,
    /// Location change (degrees, either axis) that triggers re-resolution
    pub move_tolerance_deg: f64,
    /// How far back to look for a device's latest location
    pub location_lookback_days: i64,
    /// Interval between scheduled refresh passes
    pub refresh_interval: Duration,
    /// Interval between scheduled corruption scans
    pub corruption_check_interval: Duration,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            move_tolerance_deg: 0.001,
            location_lookback_days: 30,
            refresh_interval: Duration::from_secs(300),
            corruption_check_interval: Duration::from_secs(3600),
        }
    }
}

impl OverlayConfig {
    /// Defaults overridden by `REGION_CACHE_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_or("REGION_CACHE_BATCH_SIZE", defaults.batch_size).max(1),
            move_tolerance_deg: env_or(
                "REGION_CACHE_MOVE_TOLERANCE_DEG",
                defaults.move_tolerance_deg,
            ),
            location_lookback_days: env_or(
                "REGION_CACHE_LOOKBACK_DAYS",
                defaults.location_lookback_days,
            ),
            refresh_interval: Duration::from_secs(env_or(
                "REGION_CACHE_REFRESH_SECS",
                defaults.refresh_interval.as_secs(),
            )),
            corruption_check_interval: Duration::from_secs(env_or(
                "REGION_CACHE_CORRUPTION_CHECK_SECS",
                defaults.corruption_check_interval.as_secs(),
            )),
        }
    }
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T: FromStr + Copy>(key: &str, raw: &str, default: T) -> T {
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!("Ignoring unparseable {}={:?}, using default", key, raw);
            default
        }
    }
}
