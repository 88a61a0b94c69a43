use std::sync::OnceLock;

use common::normalize_caption;
use regex::Regex;

const PART_MARKER_PATTERN: &str = r"(?i)\((?:part|часть)\s+(\d+)(?:,\s*(?:chapter|глава)\s+\d+)?\)|\((?:chapter|глава)\s+(\d+)(?:-\d+)?\)";

fn marker_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(PART_MARKER_PATTERN).expect("part marker pattern compiles"))
}

/// True when the caption carries a "(Part N)" style marker.
pub fn is_part(caption: &str) -> bool {
    marker_regex().is_match(caption)
}

/// Caption with every part marker removed.
pub fn strip_part_marker(caption: &str) -> String {
    normalize_caption(&marker_regex().replace_all(caption, " "))
}

/// Number carried by the first marker, if any.
pub fn part_number(caption: &str) -> Option<u32> {
    let captures = marker_regex().captures(caption)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn part_suffix(label: &str, number: u32) -> String {
    format!("({} {})", label, number)
}
