//! Persisted library records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where a media item comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Fetched from the remote catalog by the external downloader
    Remote,
    /// A file referenced in place (manifest entry or description override)
    Local,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown source kind: {}", other)),
        }
    }
}

/// A subscribed playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub title: String,
    /// Dense zero-based rank across all playlists
    pub position: i64,
    /// Reference the playlist was last synced from
    pub source: String,
    pub synced_at: Option<DateTime<Utc>>,
}

/// A cached media item, shared by every playlist that references it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    pub local_path: PathBuf,
    pub channel: String,
    pub source_kind: SourceKind,
}

/// A media item as seen through one playlist's membership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    #[serde(flatten)]
    pub item: MediaItem,
    pub position: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_round_trips_through_str() {
        for kind in [SourceKind::Remote, SourceKind::Local] {
            assert_eq!(kind.as_str().parse::<SourceKind>(), Ok(kind));
        }
        assert!("file".parse::<SourceKind>().is_err());
    }
}
