//! Query time windows
//!
//! Named durations resolve through a fixed table. Unrecognized names fall
//! back per window kind: rolling windows to 30 minutes (live map view),
//! centered windows to 1 hour (historical scrubber).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamedDuration {
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl NamedDuration {
    pub const ALL: [NamedDuration; 8] = [
        NamedDuration::ThirtyMinutes,
        NamedDuration::OneHour,
        NamedDuration::TwoHours,
        NamedDuration::FourHours,
        NamedDuration::EightHours,
        NamedDuration::OneDay,
        NamedDuration::SevenDays,
        NamedDuration::ThirtyDays,
    ];

    /// Fallback for unrecognized names on rolling windows
    pub const ROLLING_DEFAULT: NamedDuration = NamedDuration::ThirtyMinutes;

    /// Fallback for unrecognized names on centered windows
    pub const CENTERED_DEFAULT: NamedDuration = NamedDuration::OneHour;

    pub fn as_str(&self) -> &'static str {
        match self {
            NamedDuration::ThirtyMinutes => "30m",
            NamedDuration::OneHour => "1h",
            NamedDuration::TwoHours => "2h",
            NamedDuration::FourHours => "4h",
            NamedDuration::EightHours => "8h",
            NamedDuration::OneDay => "24h",
            NamedDuration::SevenDays => "7d",
            NamedDuration::ThirtyDays => "30d",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(name))
    }

    pub fn duration(&self) -> Duration {
        match self {
            NamedDuration::ThirtyMinutes => Duration::minutes(30),
            NamedDuration::OneHour => Duration::hours(1),
            NamedDuration::TwoHours => Duration::hours(2),
            NamedDuration::FourHours => Duration::hours(4),
            NamedDuration::EightHours => Duration::hours(8),
            NamedDuration::OneDay => Duration::hours(24),
            NamedDuration::SevenDays => Duration::days(7),
            NamedDuration::ThirtyDays => Duration::days(30),
        }
    }
}

/// Time range a query aggregates over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    /// `[now - duration, now]`
    Rolling { duration: Duration },
    /// `[center - duration/2, center + duration/2]`
    Centered {
        center: DateTime<Utc>,
        duration: Duration,
    },
}

impl TimeWindow {
    /// Rolling window from a range name (unknown names -> 30m)
    pub fn rolling(name: &str) -> Self {
        let named = NamedDuration::parse(name).unwrap_or(NamedDuration::ROLLING_DEFAULT);
        TimeWindow::Rolling {
            duration: named.duration(),
        }
    }

    /// Centered historical window from a range name (unknown names -> 1h)
    pub fn centered(center: DateTime<Utc>, name: &str) -> Self {
        let named = NamedDuration::parse(name).unwrap_or(NamedDuration::CENTERED_DEFAULT);
        TimeWindow::Centered {
            center,
            duration: named.duration(),
        }
    }

    /// Rolling window of an arbitrary length (leaderboards use 30d / 365d)
    pub fn last(duration: Duration) -> Self {
        TimeWindow::Rolling { duration }
    }

    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Rolling { duration } | TimeWindow::Centered { duration, .. } => *duration,
        }
    }

    /// Inclusive `(from, to)` bounds relative to `now`
    pub fn range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match *self {
            TimeWindow::Rolling { duration } => (now - duration, now),
            TimeWindow::Centered { center, duration } => {
                let half = duration / 2;
                (center - half, center + half)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    #[test]
    fn test_named_durations() {
        assert_eq!(NamedDuration::parse("24h"), Some(NamedDuration::OneDay));
        assert_eq!(NamedDuration::parse("7D"), Some(NamedDuration::SevenDays));
        assert_eq!(NamedDuration::parse("3h"), None);
        assert_eq!(NamedDuration::OneDay.duration(), Duration::hours(24));
    }

    #[test]
    fn test_rolling_window_range() {
        let (from, to) = TimeWindow::rolling("2h").range(fixed_now());
        assert_eq!(to, fixed_now());
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn test_centered_window_range() {
        let center = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let (from, to) = TimeWindow::centered(center, "4h").range(fixed_now());
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2024, 3, 10, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_unknown_names_use_asymmetric_defaults() {
        assert_eq!(TimeWindow::rolling("fortnight").duration(), Duration::minutes(30));
        assert_eq!(
            TimeWindow::centered(fixed_now(), "fortnight").duration(),
            Duration::hours(1)
        );
    }
}
