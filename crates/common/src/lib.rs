use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const TRACK_HASH_LEN: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub caption: String,
    pub path: PathBuf,
    pub author: String,
    pub title: String,
    #[serde(default)]
    pub album: Option<String>,
    pub filename: String,
    /// Whole seconds.
    pub length: u64,
    pub hash: String,
}

/// Collapses runs of whitespace into single spaces and trims both ends.
pub fn normalize_caption(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Short stable identifier of a caption: the first ten hex characters of
/// its blake3 digest.
pub fn caption_hash(caption: &str) -> String {
    let normalized = normalize_caption(caption);
    let hex = blake3::hash(normalized.as_bytes()).to_hex();
    hex.as_str()[..TRACK_HASH_LEN].to_string()
}

pub fn is_track_hash(value: &str) -> bool {
    value.len() == TRACK_HASH_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Turns a caption into something usable as a file stem.
pub fn file_stem_for_caption(caption: &str) -> String {
    let replaced: String = caption
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();
    let stem = normalize_caption(&replaced);
    let stem = stem.trim_matches('.').to_string();
    if stem.is_empty() {
        "untitled".to_string()
    } else {
        stem
    }
}
