//! Cache row shape checks
//!
//! A column-order mismatch in the backing table shows up as region ids
//! shifted one level down and timestamps landing in region columns.

use super::DeviceRegionCacheEntry;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static TIMESTAMP_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}([ T]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?$")
        .expect("invalid timestamp pattern")
});

static LEVELED_REGION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}_ADM([0-4])_").expect("invalid region id pattern"));

/// Why a row failed the shape check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorruptionKind {
    /// A region column holds a timestamp
    TimestampInRegionColumn { level: u8 },
    /// A level-N column holds a level-(N+1) id
    ShiftedRegionId { level: u8, found_level: u8 },
}

impl fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorruptionKind::TimestampInRegionColumn { level } => {
                write!(f, "timestamp in level {} column", level)
            }
            CorruptionKind::ShiftedRegionId { level, found_level } => {
                write!(f, "level {} id in level {} column", found_level, level)
            }
        }
    }
}

pub fn is_timestamp_like(value: &str) -> bool {
    TIMESTAMP_LIKE.is_match(value.trim())
}

/// Level encoded in a `<ISO3>_ADM<n>_<suffix>` value
fn leveled_id_level(value: &str) -> Option<u8> {
    LEVELED_REGION_ID
        .captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// First shape violation found in a row
pub fn detect(entry: &DeviceRegionCacheEntry) -> Option<CorruptionKind> {
    for (level, value) in entry.region_ids.iter().enumerate() {
        let level = level as u8;
        if value.is_empty() {
            continue;
        }
        if is_timestamp_like(value) {
            return Some(CorruptionKind::TimestampInRegionColumn { level });
        }
        if (1..=3).contains(&level) {
            if let Some(found_level) = leveled_id_level(value) {
                if found_level == level + 1 {
                    return Some(CorruptionKind::ShiftedRegionId { level, found_level });
                }
            }
        }
    }
    None
}

pub fn is_corrupted_row(entry: &DeviceRegionCacheEntry) -> bool {
    detect(entry).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(ids: [&str; 5]) -> DeviceRegionCacheEntry {
        DeviceRegionCacheEntry {
            device_id: "dev".to_string(),
            latitude: 1.0,
            longitude: 1.0,
            region_ids: ids.map(str::to_string),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_timestamp_patterns() {
        assert!(is_timestamp_like("2024-05-01 12:00:00"));
        assert!(is_timestamp_like("2024-05-01T12:00:00.123Z"));
        assert!(is_timestamp_like("2024-05-01"));
        assert!(!is_timestamp_like("USA_ADM4_123456789012"));
        assert!(!is_timestamp_like("USA"));
    }

    #[test]
    fn test_healthy_row() {
        let row = entry([
            "USA",
            "USA_ADM1_12345678",
            "USA_ADM2_12345678",
            "USA_ADM3_123456789012",
            "",
        ]);
        assert_eq!(detect(&row), None);
    }

    #[test]
    fn test_timestamp_in_level_four() {
        let row = entry(["USA", "", "", "", "2024-05-01 12:00:00"]);
        assert_eq!(
            detect(&row),
            Some(CorruptionKind::TimestampInRegionColumn { level: 4 })
        );
    }

    #[test]
    fn test_shifted_ids() {
        let row = entry(["USA", "USA_ADM2_12345678", "", "", ""]);
        assert_eq!(
            detect(&row),
            Some(CorruptionKind::ShiftedRegionId {
                level: 1,
                found_level: 2
            })
        );

        // Level 0 column is not checked for shifts
        let row = entry(["USA_ADM1_12345678", "", "", "", ""]);
        assert!(!is_corrupted_row(&row));
    }
}
