use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Runs of characters that are not safe inside an object key
    /// - "quarterly report (v2).pdf" -> "quarterly_report_v2_.pdf"
    pub static ref UNSAFE_NAME_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._-]+").unwrap();

    /// Regex for validating metadata keys
    /// - Valid: "title", "camera.model", "page-count", "iso_8601"
    /// - Invalid: "", "with space", "emoji😀", "slash/key"
    pub static ref METADATA_KEY_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").unwrap();
}

/// Lenient boolean parsing for query strings and form fields
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
