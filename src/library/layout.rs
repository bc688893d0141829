//! On-disk media layout

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Bucket for ids whose first character is not ASCII alphanumeric
pub const CATCH_ALL_BUCKET: char = '_';

/// Directory layout of the managed media cache and the local files root
#[derive(Debug, Clone)]
pub struct MediaLayout {
    media_root: PathBuf,
    local_root: PathBuf,
}

impl MediaLayout {
    pub fn new(media_root: PathBuf, local_root: PathBuf) -> Self {
        Self {
            media_root,
            local_root,
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// Create every bucket directory and the local files root
    pub async fn init(&self) -> io::Result<()> {
        for bucket in ('a'..='z').chain('0'..='9').chain([CATCH_ALL_BUCKET]) {
            fs::create_dir_all(self.media_root.join(bucket.to_string())).await?;
        }
        fs::create_dir_all(&self.local_root).await?;

        debug!("Initialized media layout at {}", self.media_root.display());
        Ok(())
    }

    /// Directory a remote item with this id is downloaded into
    pub fn bucket_for(&self, item_id: &str) -> PathBuf {
        self.media_root.join(bucket_name(item_id).to_string())
    }

    /// Whether a stored path lives inside the managed cache
    pub fn is_managed(&self, path: &Path) -> bool {
        is_under(path, &self.media_root)
    }
}

/// First character of the id, lowercased, or the catch-all bucket
pub fn bucket_name(item_id: &str) -> char {
    match item_id.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some(c) if c.is_ascii_alphanumeric() => c,
        _ => CATCH_ALL_BUCKET,
    }
}

/// Component-wise prefix check; `root` itself does not count
pub fn is_under(path: &Path, root: &Path) -> bool {
    path != root && path.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_name() {
        assert_eq!(bucket_name("dQw4w9WgXcQ"), 'd');
        assert_eq!(bucket_name("Xyz"), 'x');
        assert_eq!(bucket_name("7abc"), '7');
        assert_eq!(bucket_name("-abc"), '_');
        assert_eq!(bucket_name("_abc"), '_');
        assert_eq!(bucket_name("éclair"), '_');
        assert_eq!(bucket_name(""), '_');
    }

    #[test]
    fn test_is_managed() {
        let layout = MediaLayout::new(PathBuf::from("/data/songs"), PathBuf::from("/data/files"));

        assert!(layout.is_managed(Path::new("/data/songs/a/song.opus")));
        assert!(!layout.is_managed(Path::new("/data/files/song.mp3")));
        assert!(!layout.is_managed(Path::new("/data/songs-other/song.mp3")));
        assert!(!layout.is_managed(Path::new("/data/songs")));
    }

    #[tokio::test]
    async fn test_init_creates_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MediaLayout::new(dir.path().join("songs"), dir.path().join("files"));

        layout.init().await.unwrap();

        assert!(dir.path().join("songs").join("a").is_dir());
        assert!(dir.path().join("songs").join("9").is_dir());
        assert!(dir.path().join("songs").join("_").is_dir());
        assert!(dir.path().join("files").is_dir());
        assert_eq!(layout.bucket_for("Zed"), dir.path().join("songs").join("z"));
    }
}
