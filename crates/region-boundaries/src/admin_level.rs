//! Zoom-to-admin-level resolution and ISO country code translation

/// Map a display zoom level to the admin granularity shown at that zoom.
///
/// ```text
/// zoom <= 1  -> 0 (country)
/// zoom <= 4  -> 1 (state)
/// zoom <= 7  -> 2 (county)
/// otherwise  -> 3 (district)
/// ```
pub fn level_for_zoom(zoom: f64) -> u8 {
    if zoom <= 1.0 {
        0
    } else if zoom <= 4.0 {
        1
    } else if zoom <= 7.0 {
        2
    } else {
        3
    }
}

/// ISO 3166-1 alpha-2 to alpha-3 for the supported country set.
///
/// Readings whose `geo_country` falls outside this table are dropped from
/// country-level aggregation.
static ISO2_TO_ISO3: &[(&str, &str)] = &[
    ("AE", "ARE"),
    ("AR", "ARG"),
    ("AT", "AUT"),
    ("AU", "AUS"),
    ("BD", "BGD"),
    ("BE", "BEL"),
    ("BG", "BGR"),
    ("BO", "BOL"),
    ("BR", "BRA"),
    ("CA", "CAN"),
    ("CH", "CHE"),
    ("CL", "CHL"),
    ("CN", "CHN"),
    ("CO", "COL"),
    ("CR", "CRI"),
    ("CY", "CYP"),
    ("CZ", "CZE"),
    ("DE", "DEU"),
    ("DK", "DNK"),
    ("DO", "DOM"),
    ("EC", "ECU"),
    ("EE", "EST"),
    ("EG", "EGY"),
    ("ES", "ESP"),
    ("FI", "FIN"),
    ("FJ", "FJI"),
    ("FR", "FRA"),
    ("GB", "GBR"),
    ("GH", "GHA"),
    ("GR", "GRC"),
    ("GT", "GTM"),
    ("HK", "HKG"),
    ("HR", "HRV"),
    ("HU", "HUN"),
    ("ID", "IDN"),
    ("IE", "IRL"),
    ("IL", "ISR"),
    ("IN", "IND"),
    ("IS", "ISL"),
    ("IT", "ITA"),
    ("JP", "JPN"),
    ("KE", "KEN"),
    ("KR", "KOR"),
    ("LK", "LKA"),
    ("LT", "LTU"),
    ("LU", "LUX"),
    ("LV", "LVA"),
    ("MA", "MAR"),
    ("MX", "MEX"),
    ("MY", "MYS"),
    ("NG", "NGA"),
    ("NL", "NLD"),
    ("NO", "NOR"),
    ("NP", "NPL"),
    ("NZ", "NZL"),
    ("PA", "PAN"),
    ("PE", "PER"),
    ("PG", "PNG"),
    ("PH", "PHL"),
    ("PK", "PAK"),
    ("PL", "POL"),
    ("PR", "PRI"),
    ("PT", "PRT"),
    ("PY", "PRY"),
    ("QA", "QAT"),
    ("RO", "ROU"),
    ("RS", "SRB"),
    ("RU", "RUS"),
    ("SA", "SAU"),
    ("SE", "SWE"),
    ("SG", "SGP"),
    ("SI", "SVN"),
    ("SK", "SVK"),
    ("TH", "THA"),
    ("TR", "TUR"),
    ("TW", "TWN"),
    ("TZ", "TZA"),
    ("UA", "UKR"),
    ("UG", "UGA"),
    ("US", "USA"),
    ("UY", "URY"),
    ("VE", "VEN"),
    ("VN", "VNM"),
    ("WS", "WSM"),
    ("ZA", "ZAF"),
    ("ZW", "ZWE"),
];

/// Translate a two-letter country code (any case) to its three-letter form
pub fn iso2_to_iso3(code: &str) -> Option<&'static str> {
    let code = code.trim();
    ISO2_TO_ISO3
        .iter()
        .find(|(iso2, _)| iso2.eq_ignore_ascii_case(code))
        .map(|(_, iso3)| *iso3)
}

/// Translate a three-letter country code (any case) to its two-letter form
pub fn iso3_to_iso2(code: &str) -> Option<&'static str> {
    let code = code.trim();
    ISO2_TO_ISO3
        .iter()
        .find(|(_, iso3)| iso3.eq_ignore_ascii_case(code))
        .map(|(iso2, _)| *iso2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_level_for_zoom_boundaries() {
        assert_eq!(level_for_zoom(0.0), 0);
        assert_eq!(level_for_zoom(1.0), 0);
        assert_eq!(level_for_zoom(1.5), 1);
        assert_eq!(level_for_zoom(4.0), 1);
        assert_eq!(level_for_zoom(5.0), 2);
        assert_eq!(level_for_zoom(7.0), 2);
        assert_eq!(level_for_zoom(7.1), 3);
        assert_eq!(level_for_zoom(18.0), 3);
    }

    #[test]
    fn test_iso_translation_case_insensitive() {
        assert_eq!(iso2_to_iso3("us"), Some("USA"));
        assert_eq!(iso2_to_iso3("NZ"), Some("NZL"));
        assert_eq!(iso2_to_iso3(" gb "), Some("GBR"));
        assert_eq!(iso3_to_iso2("nzl"), Some("NZ"));
        assert_eq!(iso2_to_iso3("XX"), None);
        assert_eq!(iso2_to_iso3(""), None);
    }

    #[test]
    fn test_iso_table_is_bijection() {
        let iso2: HashSet<_> = ISO2_TO_ISO3.iter().map(|(a, _)| *a).collect();
        let iso3: HashSet<_> = ISO2_TO_ISO3.iter().map(|(_, b)| *b).collect();
        assert_eq!(iso2.len(), ISO2_TO_ISO3.len());
        assert_eq!(iso3.len(), ISO2_TO_ISO3.len());

        for (a, b) in ISO2_TO_ISO3 {
            assert_eq!(iso3_to_iso2(b), Some(*a));
        }
    }

    proptest! {
        #[test]
        fn prop_level_is_monotonic_and_never_four(a in 0.0f64..24.0, b in 0.0f64..24.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(level_for_zoom(lo) <= level_for_zoom(hi));
            prop_assert!(level_for_zoom(hi) <= 3);
        }
    }
}
