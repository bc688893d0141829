//! Title and channel normalization for catalog entries
//!
//! Catalog titles carry a lot of noise ("03. Theme - Artist",
//! "Game OST (Remastered) - Theme"). The rules below run in order and each
//! sees the output of the previous one.

use regex::Regex;
use std::sync::LazyLock;

static TRACK_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s*").expect("valid regex"));

static ANNOTATION_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^.*?(?:OST|Soundtrack|Remaster|Acoustic)\s*(?:\([^)]*\))?\s*-\s*")
        .expect("valid regex")
});

static ANNOTATION_PARENTHETICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\([^)]*(?:Soundtrack|OST|Chapter)[^)]*\)").expect("valid regex")
});

static TRAILING_ARTIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*-\s*[^-]*$").expect("valid regex"));

const ALBUM_PREFIX: &str = "Album - ";
const TOPIC_SUFFIX: &str = " - Topic";
const UNKNOWN_CHANNEL: &str = "unknown";

/// Clean up an entry title
pub fn normalize_title(raw: &str) -> String {
    let title = TRACK_NUMBER.replace(raw, "");
    let title = ANNOTATION_PREFIX.replace(&title, "");
    let title = ANNOTATION_PARENTHETICAL.replace_all(&title, "");
    let title = TRAILING_ARTIST.replace(&title, "");
    title.trim().to_string()
}

/// Clean up a playlist title
pub fn normalize_playlist_title(raw: &str) -> String {
    raw.strip_prefix(ALBUM_PREFIX).unwrap_or(raw).to_string()
}

/// Strip auto-generated " - Topic" channel suffixes
pub fn normalize_channel(raw: Option<&str>) -> String {
    match raw {
        Some(channel) if !channel.is_empty() => channel
            .strip_suffix(TOPIC_SUFFIX)
            .unwrap_or(channel)
            .to_string(),
        _ => UNKNOWN_CHANNEL.to_string(),
    }
}
