//! Region id grammar
//!
//! `<ISO3>` for countries, `<ISO3>_ADM<level>_<suffix>` below that.
//! Older boundary files used `<ISO3>_ADM0` for countries; both parse as level 0.

/// Shape-id suffix length for levels 1-2
const SHORT_SUFFIX_LEN: usize = 8;

/// Shape-id suffix length for levels 3-4 (denser, needs more uniqueness)
const LONG_SUFFIX_LEN: usize = 12;

/// Build a region id from country, level and a source shape identifier
pub fn format_region_id(iso3: &str, admin_level: u8, shape_id: &str) -> String {
    let iso3 = iso3.trim().to_ascii_uppercase();
    if admin_level == 0 {
        return iso3;
    }

    let keep = if admin_level <= 2 {
        SHORT_SUFFIX_LEN
    } else {
        LONG_SUFFIX_LEN
    };
    let chars: Vec<char> = shape_id.trim().chars().collect();
    let suffix: String = chars[chars.len().saturating_sub(keep)..].iter().collect();

    format!("{}_ADM{}_{}", iso3, admin_level, suffix)
}

/// Admin level encoded in a region id, if the id is well formed
pub fn admin_level_of(region_id: &str) -> Option<u8> {
    let mut parts = region_id.splitn(3, '_');
    let country = parts.next()?;
    if !is_iso3(country) {
        return None;
    }

    match (parts.next(), parts.next()) {
        (None, None) => Some(0),
        (Some(adm), rest) => {
            let level: u8 = adm.strip_prefix("ADM")?.parse().ok()?;
            match (level, rest) {
                (0, None) => Some(0),
                (1..=4, Some(suffix)) if !suffix.is_empty() => Some(level),
                _ => None,
            }
        }
        (None, Some(_)) => None,
    }
}

fn is_iso3(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_region_id() {
        assert_eq!(format_region_id("nzl", 0, "ignored"), "NZL");
        assert_eq!(
            format_region_id("NZL", 2, "NZL-ADM2-3_0_0-B12345678"),
            "NZL_ADM2_12345678"
        );
        assert_eq!(
            format_region_id("USA", 4, "USA-ADM4-3_0_0-B1234567890ab"),
            "USA_ADM4_1234567890ab"
        );
        assert_eq!(format_region_id("USA", 1, "42"), "USA_ADM1_42");
    }

    #[test]
    fn test_admin_level_of() {
        assert_eq!(admin_level_of("USA"), Some(0));
        assert_eq!(admin_level_of("USA_ADM0"), Some(0));
        assert_eq!(admin_level_of("USA_ADM1_00000042"), Some(1));
        assert_eq!(admin_level_of("NZL_ADM4_1234567890ab"), Some(4));
        assert_eq!(admin_level_of("USA_ADM5_1"), None);
        assert_eq!(admin_level_of("USA_ADM2_"), None);
        assert_eq!(admin_level_of("usa"), None);
        assert_eq!(admin_level_of("2024-01-01 00:00:00"), None);
        assert_eq!(admin_level_of(""), None);
    }

    #[test]
    fn test_round_trip_levels() {
        for level in 0..=4u8 {
            let id = format_region_id("AUS", level, "AUS-ADM-abcdef1234567890");
            assert_eq!(admin_level_of(&id), Some(level), "id {}", id);
        }
    }
}
