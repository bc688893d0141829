//! Playlist sources: local M3U manifests and the remote catalog

pub mod models;
pub mod resolver;
pub mod titles;

use std::path::{Path, PathBuf};

pub use models::*;
pub use resolver::{CatalogResolver, YtDlpResolver};

const MANIFEST_EXTENSIONS: &[&str] = &["m3u", "m3u8"];

/// Where a sync reference points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistSource {
    /// A local manifest file
    Manifest(PathBuf),
    /// A remote playlist URL or bare id
    Remote(String),
}

impl PlaylistSource {
    /// Decide whether `reference` names a local manifest
    ///
    /// A manifest needs a manifest extension and must either exist or be
    /// written as an explicit path (`/`, `./`, `../`).
    pub fn classify(reference: &str) -> Self {
        let reference = reference.trim();
        let path = Path::new(reference);

        let has_manifest_extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext.as_str()));

        let explicit_path = reference.starts_with('/')
            || reference.starts_with("./")
            || reference.starts_with("../");

        if has_manifest_extension && (explicit_path || path.exists()) {
            let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
            Self::Manifest(crate::utils::normalize_path(&absolute))
        } else {
            Self::Remote(reference.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_manifest_paths() {
        assert_eq!(
            PlaylistSource::classify("/music/mix.m3u"),
            PlaylistSource::Manifest(PathBuf::from("/music/mix.m3u"))
        );
        assert!(matches!(
            PlaylistSource::classify("./lists/Road.M3U8"),
            PlaylistSource::Manifest(_)
        ));
    }

    #[test]
    fn test_existing_bare_manifest_name() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("here.m3u");
        std::fs::write(&manifest, "song.mp3\n").unwrap();

        let reference = manifest.to_string_lossy().to_string();
        assert_eq!(
            PlaylistSource::classify(&reference),
            PlaylistSource::Manifest(manifest)
        );
    }

    #[test]
    fn test_remote_references() {
        assert_eq!(
            PlaylistSource::classify("PLabc"),
            PlaylistSource::Remote("PLabc".to_string())
        );
        assert!(matches!(
            PlaylistSource::classify("https://www.youtube.com/playlist?list=PLabc"),
            PlaylistSource::Remote(_)
        ));
        // Manifest extension but neither on disk nor an explicit path
        assert!(matches!(
            PlaylistSource::classify("missing-here.m3u"),
            PlaylistSource::Remote(_)
        ));
    }
}
