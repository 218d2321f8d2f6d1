//! Display-name cleanup for raw geoBoundaries exports

use once_cell::sync::Lazy;
use regex::Regex;

static PARENTHESIZED_LATIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(([A-Za-z][A-Za-z\s\-']+)\)").expect("invalid parenthesized name pattern")
});

static TRAILING_LATIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\x00-\x7F]+\s+([A-Za-z][A-Za-z\s\-']+)$").expect("invalid trailing name pattern")
});

/// Undo UTF-8 text that was decoded as Latin-1 and re-encoded ("MÄori" style
/// mojibake). Text that does not round-trip is returned unchanged.
pub fn fix_double_encoding(text: &str) -> String {
    let bytes: Option<Vec<u8>> = text.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect();
    bytes
        .and_then(|b| String::from_utf8(b).ok())
        .unwrap_or_else(|| text.to_string())
}

fn is_cjk(c: char) -> bool {
    matches!(u32::from(c), 0x4E00..=0x9FFF | 0x3400..=0x4DBF)
}

/// Latin name for a CJK label, e.g. "大埤鄉 (Dapi)" -> "Dapi" or
/// "北區 North" -> "North". Labels without CJK or without a Latin part
/// are kept.
pub fn english_name(text: &str) -> String {
    if !text.chars().any(is_cjk) {
        return text.to_string();
    }

    PARENTHESIZED_LATIN
        .captures(text)
        .or_else(|| TRAILING_LATIN.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| text.to_string())
}

/// Both cleanups, in the order raw CGAZ names need them
pub fn normalize_cgaz_name(raw: &str) -> String {
    english_name(&fix_double_encoding(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_double_encoding() {
        // "Māori" whose UTF-8 bytes were read as Latin-1
        assert_eq!(fix_double_encoding("M\u{c4}\u{81}ori"), "Māori");
        assert_eq!(fix_double_encoding("Auckland"), "Auckland");
        // Valid Latin-1 that is not UTF-8 underneath stays put
        assert_eq!(fix_double_encoding("Zürich"), "Zürich");
        // Already-correct text outside Latin-1
        assert_eq!(fix_double_encoding("Māori"), "Māori");
        assert_eq!(fix_double_encoding("北區"), "北區");
    }

    #[test]
    fn test_english_name() {
        assert_eq!(english_name("大埤鄉 (Dapi)"), "Dapi");
        assert_eq!(english_name("北區 North"), "North");
        assert_eq!(english_name("北區"), "北區");
        assert_eq!(english_name("Dayuan District"), "Dayuan District");
        assert_eq!(english_name("Saint-Denis (Réunion)"), "Saint-Denis (Réunion)");
    }

    #[test]
    fn test_normalize_mojibake_cjk() {
        // "大埤鄉 (Dapi)" double-encoded
        let mangled: String = "大埤鄉 (Dapi)"
            .as_bytes()
            .iter()
            .map(|&b| char::from(b))
            .collect();
        assert_ne!(mangled, "大埤鄉 (Dapi)");
        assert_eq!(normalize_cgaz_name(&mangled), "Dapi");
    }
}
