use std::collections::BTreeSet;

use crate::language::normalize_language;

/// Round seconds to two decimals, the precision stored in artifacts
pub fn round_centis(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

/// Parse a comma-separated language cell (`"zh,en"`) into language groups
pub fn parse_language_list(cell: &str) -> BTreeSet<String> {
    cell.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| normalize_language(code).unwrap_or(code).to_string())
        .collect()
}

pub fn format_language_list(languages: &BTreeSet<String>) -> String {
    languages
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
