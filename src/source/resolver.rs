//! Catalog resolver adapter
//!
//! Runs the external resolver (yt-dlp by default) against a playlist URL and
//! turns its JSON output into a [`PlaylistDescriptor`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};
use url::Url;

use super::models::*;
use super::titles::{normalize_channel, normalize_playlist_title, normalize_title};
use crate::error::{Result, SyncError};

const PLAYLIST_URL_PREFIX: &str = "https://www.youtube.com/playlist?list=";

/// Resolves a remote playlist reference into its current membership
#[async_trait]
pub trait CatalogResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<PlaylistDescriptor>;
}

/// Rewrite a bare playlist id into the canonical playlist URL
pub fn canonical_reference(input: &str) -> String {
    let input = input.trim();
    match Url::parse(input) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => input.to_string(),
        _ => format!("{}{}", PLAYLIST_URL_PREFIX, urlencoding::encode(input)),
    }
}

/// Resolver backed by a yt-dlp compatible executable
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    program: String,
    local_root: PathBuf,
}

impl YtDlpResolver {
    /// `local_root` is where description overrides' relative paths live
    pub fn new(program: impl Into<String>, local_root: PathBuf) -> Self {
        Self {
            program: program.into(),
            local_root,
        }
    }
}

#[async_trait]
impl CatalogResolver for YtDlpResolver {
    async fn resolve(&self, reference: &str) -> Result<PlaylistDescriptor> {
        let url = canonical_reference(reference);
        debug!("Resolving playlist: {}", url);

        let output = Command::new(&self.program)
            .args(["-J", "--flat-playlist", "--no-warnings", url.as_str()])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                SyncError::resolution(&url, format!("failed to start {}: {}", self.program, e))
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("{} stderr: {}", self.program, stderr.trim());
        }

        if !output.status.success() {
            return Err(SyncError::resolution(
                &url,
                format!("{} exited with {}", self.program, output.status),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_resolver_output(&stdout, &url, &self.local_root)
    }
}

/// Parse resolver stdout in either supported shape
///
/// A single JSON document with an `entries` list is tried first; otherwise
/// every non-empty line must be one entry carrying `playlist_id` and
/// `playlist_title`.
pub fn parse_resolver_output(
    stdout: &str,
    reference: &str,
    local_root: &Path,
) -> Result<PlaylistDescriptor> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(SyncError::resolution(reference, "no output from resolver"));
    }

    // A lone JSON line also parses as a document, just without entries
    let raw = match serde_json::from_str::<ResolvedPlaylist>(trimmed) {
        Ok(doc) if doc.entries.is_some() => doc,
        Ok(doc) => parse_json_lines(trimmed)
            .ok()
            .filter(|lines| lines.id.is_some())
            .unwrap_or(doc),
        Err(doc_err) => parse_json_lines(trimmed).map_err(|lines_err| {
            SyncError::resolution(
                reference,
                format!("unparseable output ({}; {})", doc_err, lines_err),
            )
        })?,
    };

    build_descriptor(raw, reference, local_root)
}

/// Fold JSON-lines output into the single-document shape
fn parse_json_lines(output: &str) -> std::result::Result<ResolvedPlaylist, serde_json::Error> {
    let mut playlist = ResolvedPlaylist {
        id: None,
        title: None,
        entries: Some(Vec::new()),
        description: None,
    };

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let parsed: ResolvedLine = serde_json::from_str(line)?;
        playlist.id = playlist.id.or(parsed.playlist_id);
        playlist.title = playlist.title.or(parsed.playlist_title);
        playlist.description = playlist.description.or(parsed.playlist_description);
        if let Some(entries) = playlist.entries.as_mut() {
            entries.push(parsed.entry);
        }
    }

    Ok(playlist)
}

fn build_descriptor(
    raw: ResolvedPlaylist,
    reference: &str,
    local_root: &Path,
) -> Result<PlaylistDescriptor> {
    let id = raw
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SyncError::resolution(reference, "missing playlist id"))?;
    let title = raw
        .title
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SyncError::resolution(reference, "missing playlist title"))?;
    let entries = raw
        .entries
        .filter(|e| !e.is_empty())
        .ok_or_else(|| SyncError::resolution(reference, "playlist has no entries"))?;

    let mut items: Vec<MediaStub> = entries
        .into_iter()
        .filter_map(|entry| {
            let Some(entry_id) = entry.id.filter(|id| !id.is_empty()) else {
                warn!("Skipping resolver entry without an id in {}", reference);
                return None;
            };
            let raw_title = entry.title.unwrap_or_else(|| entry_id.clone());
            Some(MediaStub::remote(
                entry_id,
                normalize_title(&raw_title),
                normalize_channel(entry.channel.as_deref()),
            ))
        })
        .collect();
    if items.is_empty() {
        return Err(SyncError::resolution(reference, "playlist has no entries with an id"));
    }

    if let Some(description) = raw.description.as_deref() {
        splice_overrides(&mut items, description, local_root);
    }

    debug!("Resolved playlist {} with {} items", id, items.len());

    Ok(PlaylistDescriptor {
        id,
        title: normalize_playlist_title(&title),
        source: reference.to_string(),
        items,
    })
}

/// Insert local overrides embedded in the playlist description
///
/// The description is itself JSON: a list of `{position, path, title}` where
/// `position` is 1-based. Anything malformed is logged and skipped.
fn splice_overrides(items: &mut Vec<MediaStub>, description: &str, local_root: &Path) {
    if description.trim().is_empty() {
        return;
    }

    let value: serde_json::Value = match serde_json::from_str(description) {
        Ok(v) => v,
        Err(e) => {
            warn!("Error parsing description JSON: {}", e);
            return;
        }
    };

    let serde_json::Value::Array(entries) = value else {
        return;
    };

    for entry in entries {
        let parsed = match serde_json::from_value::<LocalOverride>(entry) {
            Ok(o) => o,
            Err(e) => {
                warn!("Ignoring malformed local override: {}", e);
                continue;
            }
        };

        let (Some(position), Some(path), Some(title)) = (parsed.position, parsed.path, parsed.title)
        else {
            continue;
        };
        if position < 1 || path.is_empty() || title.is_empty() {
            continue;
        }

        let index = usize::try_from(position - 1)
            .unwrap_or(usize::MAX)
            .min(items.len());
        let full_path = local_root.join(&path);
        items.insert(index, MediaStub::local(path, title, full_path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::SourceKind;

    const REF: &str = "https://www.youtube.com/playlist?list=PL1";

    #[test]
    fn test_canonical_reference() {
        assert_eq!(
            canonical_reference("PLabc123"),
            "https://www.youtube.com/playlist?list=PLabc123"
        );
        assert_eq!(canonical_reference(REF), REF);
    }

    #[test]
    fn test_parse_single_document() {
        let stdout = r#"{
            "id": "PL1",
            "title": "Album - Road Songs",
            "entries": [
                {"id": "aaa", "title": "01. First - Band", "channel": "Band - Topic"},
                {"id": "bbb", "title": "Second"}
            ]
        }"#;

        let descriptor = parse_resolver_output(stdout, REF, Path::new("/files")).unwrap();

        assert_eq!(descriptor.id, "PL1");
        assert_eq!(descriptor.title, "Road Songs");
        assert_eq!(descriptor.source, REF);
        assert_eq!(descriptor.item_ids(), ["aaa", "bbb"]);
        assert_eq!(descriptor.items[0].title, "First");
        assert_eq!(descriptor.items[0].channel, "Band");
        assert_eq!(descriptor.items[1].channel, "unknown");
        assert!(descriptor.items.iter().all(|i| i.source_kind == SourceKind::Remote));
    }

    #[test]
    fn test_parse_json_lines() {
        let stdout = concat!(
            r#"{"id": "x1", "title": "One", "playlist_id": "PL2", "playlist_title": "Lines"}"#,
            "\n",
            r#"{"id": "x2", "title": "Two", "playlist_id": "PL2", "playlist_title": "Lines"}"#,
            "\n"
        );

        let descriptor = parse_resolver_output(stdout, REF, Path::new("/files")).unwrap();

        assert_eq!(descriptor.id, "PL2");
        assert_eq!(descriptor.title, "Lines");
        assert_eq!(descriptor.item_ids(), ["x1", "x2"]);
    }

    #[test]
    fn test_parse_single_json_line() {
        let stdout = r#"{"id": "only", "title": "Only", "playlist_id": "PL5", "playlist_title": "Solo"}"#;

        let descriptor = parse_resolver_output(stdout, REF, Path::new("/files")).unwrap();

        assert_eq!(descriptor.id, "PL5");
        assert_eq!(descriptor.item_ids(), ["only"]);
    }

    #[test]
    fn test_empty_output_is_resolution_error() {
        let err = parse_resolver_output("  \n", REF, Path::new("/files")).unwrap_err();
        assert!(matches!(err, SyncError::Resolution { .. }));
    }

    #[test]
    fn test_garbage_output_is_resolution_error() {
        let err = parse_resolver_output("ERROR: not json", REF, Path::new("/files")).unwrap_err();
        assert!(matches!(err, SyncError::Resolution { .. }));
    }

    #[test]
    fn test_missing_fields_are_resolution_errors() {
        for stdout in [
            r#"{"title": "t", "entries": [{"id": "a"}]}"#,
            r#"{"id": "p", "entries": [{"id": "a"}]}"#,
            r#"{"id": "p", "title": "t", "entries": []}"#,
            r#"{"id": "p", "title": "t"}"#,
        ] {
            let err = parse_resolver_output(stdout, REF, Path::new("/files")).unwrap_err();
            assert!(matches!(err, SyncError::Resolution { .. }), "{}", stdout);
        }
    }

    #[test]
    fn test_entries_without_ids_are_resolution_error() {
        for stdout in [
            r#"{"id": "PL", "title": "T", "entries": [{"title": "x"}]}"#,
            r#"{"id": "PL", "title": "T", "entries": [{"id": ""}, {"title": "y"}]}"#,
        ] {
            let err = parse_resolver_output(stdout, REF, Path::new("/files")).unwrap_err();
            assert!(matches!(err, SyncError::Resolution { .. }), "{}", stdout);
        }
    }

    #[test]
    fn test_description_overrides_are_spliced() {
        let description = serde_json::json!([
            {"position": 1, "path": "intro.mp3", "title": "Intro"},
            {"position": 3, "path": "mid.mp3", "title": "Middle"},
            {"position": 99, "path": "end.mp3", "title": "End"},
            {"position": 0, "path": "bad.mp3", "title": "Zero"},
            {"path": "nopos.mp3", "title": "No position"}
        ])
        .to_string();
        let stdout = serde_json::json!({
            "id": "PL3",
            "title": "Mixed",
            "description": description,
            "entries": [{"id": "r1", "title": "R1"}, {"id": "r2", "title": "R2"}]
        })
        .to_string();

        let descriptor = parse_resolver_output(&stdout, REF, Path::new("/files")).unwrap();

        assert_eq!(
            descriptor.item_ids(),
            ["intro.mp3", "r1", "mid.mp3", "r2", "end.mp3"]
        );
        let intro = &descriptor.items[0];
        assert_eq!(intro.source_kind, SourceKind::Local);
        assert_eq!(intro.local_path, Some(PathBuf::from("/files/intro.mp3")));
        assert_eq!(intro.channel, LOCAL_CHANNEL);
    }

    #[test]
    fn test_malformed_description_is_ignored() {
        let stdout = serde_json::json!({
            "id": "PL4",
            "title": "Plain",
            "description": "just a regular description, not JSON",
            "entries": [{"id": "r1", "title": "R1"}]
        })
        .to_string();

        let descriptor = parse_resolver_output(&stdout, REF, Path::new("/files")).unwrap();

        assert_eq!(descriptor.item_ids(), ["r1"]);
    }

    #[tokio::test]
    async fn test_missing_resolver_program_is_resolution_error() {
        let resolver = YtDlpResolver::new("mossync-no-such-resolver", PathBuf::from("/files"));
        let err = resolver.resolve("PL1").await.unwrap_err();
        assert!(matches!(err, SyncError::Resolution { .. }));
    }
}
