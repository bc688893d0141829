//! Playlist descriptors and resolver output models

use serde::Deserialize;
use std::path::PathBuf;

use crate::library::SourceKind;

/// Channel recorded for items that come from local files
pub const LOCAL_CHANNEL: &str = "file";

/// Desired state of a playlist, produced fresh on every sync
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistDescriptor {
    pub id: String,
    pub title: String,
    /// Reference this descriptor was resolved from
    pub source: String,
    /// Items in playback order; ids may repeat
    pub items: Vec<MediaStub>,
}

#[cfg(test)]
impl PlaylistDescriptor {
    /// Item ids in desired order
    pub fn item_ids(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.id.as_str()).collect()
    }
}

/// A media item that has been referenced but not necessarily acquired
#[derive(Debug, Clone, PartialEq)]
pub struct MediaStub {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub source_kind: SourceKind,
    /// Known path for local items; remote items get one from the downloader
    pub local_path: Option<PathBuf>,
}

impl MediaStub {
    pub fn remote(id: impl Into<String>, title: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            channel: channel.into(),
            source_kind: SourceKind::Remote,
            local_path: None,
        }
    }

    pub fn local(id: impl Into<String>, title: impl Into<String>, path: PathBuf) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            channel: LOCAL_CHANNEL.to_string(),
            source_kind: SourceKind::Local,
            local_path: Some(path),
        }
    }
}

/// Single-document resolver output (`-J --flat-playlist`)
#[derive(Debug, Clone, Deserialize)]
pub struct ResolvedPlaylist {
    pub id: Option<String>,
    pub title: Option<String>,
    pub entries: Option<Vec<ResolvedEntry>>,
    pub description: Option<String>,
}

/// One playlist entry as emitted by the resolver
#[derive(Debug, Clone, Deserialize)]
pub struct ResolvedEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub channel: Option<String>,
}

/// One line of JSON-lines resolver output: an entry with playlist-level
/// fields replicated
#[derive(Debug, Clone, Deserialize)]
pub struct ResolvedLine {
    #[serde(flatten)]
    pub entry: ResolvedEntry,
    pub playlist_id: Option<String>,
    pub playlist_title: Option<String>,
    pub playlist_description: Option<String>,
}

/// A locally-sourced item embedded in a remote playlist's description
#[derive(Debug, Clone, Deserialize)]
pub struct LocalOverride {
    /// 1-based slot the item is inserted at
    pub position: Option<i64>,
    pub path: Option<String>,
    pub title: Option<String>,
}
