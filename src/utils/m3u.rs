//! M3U manifest parsing

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::source::{MediaStub, PlaylistDescriptor};

static EXTINF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#EXTINF:(-?\d+),(.+)").expect("valid regex"));

/// Read a manifest from disk and parse it into a descriptor
pub async fn parse_manifest(path: &Path) -> Result<PlaylistDescriptor> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SyncError::parse(path, format!("failed to read manifest: {}", e)))?;

    parse_manifest_str(path, &content)
}

/// Parse manifest text; references are resolved against `path`'s directory
///
/// An `#EXTINF` title applies to the next reference line only. References
/// without one are titled after their file name.
pub fn parse_manifest_str(path: &Path, content: &str) -> Result<PlaylistDescriptor> {
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    let id = file_name(path);
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.clone());

    let mut items = Vec::new();
    let mut pending_title: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("#EXTM3U") {
            continue;
        }

        if line.starts_with("#EXTINF:") {
            if let Some(caps) = EXTINF.captures(line) {
                pending_title = Some(caps[2].trim().to_string());
            }
        } else if !line.starts_with('#') {
            let resolved = normalize_path(&base_dir.join(line));
            let item_id = file_name(&resolved);
            let item_title = pending_title.take().unwrap_or_else(|| item_id.clone());
            items.push(MediaStub::local(item_id, item_title, resolved));
        }
    }

    if items.is_empty() {
        return Err(SyncError::parse(path, "no valid references found"));
    }

    debug!("Parsed manifest {}: {} items", path.display(), items.len());

    Ok(PlaylistDescriptor {
        id,
        title,
        source: path.display().to_string(),
        items,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Normalize `.` and `..` components without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::SourceKind;

    #[test]
    fn test_extinf_title_applies_to_next_reference() {
        let path = Path::new("/music/lists/road trip.m3u");
        let content = "#EXTM3U\n#EXTINF:-1,My Song\n./song.mp3\n";

        let descriptor = parse_manifest_str(path, content).unwrap();

        assert_eq!(descriptor.id, "road trip.m3u");
        assert_eq!(descriptor.title, "road trip");
        assert_eq!(descriptor.items.len(), 1);
        let item = &descriptor.items[0];
        assert_eq!(item.id, "song.mp3");
        assert_eq!(item.title, "My Song");
        assert_eq!(item.source_kind, SourceKind::Local);
        assert_eq!(
            item.local_path,
            Some(PathBuf::from("/music/lists/song.mp3"))
        );
    }

    #[test]
    fn test_reference_without_extinf_uses_file_name() {
        let path = Path::new("/music/mix.m3u");
        let content = "#EXTM3U\n\nsub/a.flac\r\n#EXTINF:120,Second\r\nb.ogg\r\nc.mp3\n";

        let descriptor = parse_manifest_str(path, content).unwrap();
        let titles: Vec<_> = descriptor.items.iter().map(|i| i.title.as_str()).collect();

        assert_eq!(titles, ["a.flac", "Second", "c.mp3"]);
        assert_eq!(
            descriptor.items[0].local_path,
            Some(PathBuf::from("/music/sub/a.flac"))
        );
    }

    #[test]
    fn test_comments_do_not_consume_pending_title() {
        let path = Path::new("/m/list.m3u");
        let content = "#EXTINF:-1,Kept\n# a comment\nsong.mp3\n";

        let descriptor = parse_manifest_str(path, content).unwrap();

        assert_eq!(descriptor.items[0].title, "Kept");
    }

    #[test]
    fn test_manifest_without_references_fails() {
        let path = Path::new("/m/empty.m3u");
        let content = "#EXTM3U\n#EXTINF:-1,Dangling\n\n";

        let err = parse_manifest_str(path, content).unwrap_err();

        assert!(matches!(err, SyncError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_missing_manifest_file_fails_with_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_manifest(&dir.path().join("absent.m3u")).await.unwrap_err();

        assert!(matches!(err, SyncError::Parse { .. }));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/./c/../d.mp3")),
            PathBuf::from("/a/b/d.mp3")
        );
    }
}
