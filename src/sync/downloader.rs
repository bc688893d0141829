//! External media downloader

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::source::MediaStub;

const DESTINATION_PREFIX: &str = "[ExtractAudio] Destination: ";
const NOT_CONVERTING_PREFIX: &str = "[ExtractAudio] Not converting audio ";
const WATCH_URL: &str = "https://youtube.com/watch?v=";

/// Fetches one remote item into a directory
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Path of the fetched file, or `None` when nothing was produced
    async fn download(&self, stub: &MediaStub, dest_dir: &Path) -> Result<Option<PathBuf>>;
}

/// Downloader backed by a yt-dlp compatible executable
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    program: String,
}

impl YtDlpDownloader {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn download(&self, stub: &MediaStub, dest_dir: &Path) -> Result<Option<PathBuf>> {
        let url = format!("{}{}", WATCH_URL, stub.id);
        debug!("Downloading {} into {}", url, dest_dir.display());

        let mut child = Command::new(&self.program)
            .args(["-x", "--restrict-filenames", "--windows-filenames", "-P"])
            .arg(dest_dir)
            .arg(&url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to run {}", self.program))?;

        let stdout = child.stdout.take().context("Downloader stdout not captured")?;
        let stderr = child.stderr.take().context("Downloader stderr not captured")?;

        let (destination, ()) = tokio::join!(read_destination(stdout), log_stderr(stderr, &stub.id));
        let destination = match destination {
            Ok(destination) => destination,
            Err(e) => {
                // Reap the child before reporting the broken output
                if let Err(kill_err) = child.kill().await {
                    warn!("Failed to stop {} for {}: {}", self.program, stub.id, kill_err);
                }
                return Err(e);
            }
        };

        let status = child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for {}", self.program))?;

        if !status.success() {
            match &destination {
                Some(path) => warn!(
                    "{} exited with {} for {} after writing {}",
                    self.program,
                    status,
                    stub.id,
                    path.display()
                ),
                None => debug!("{} exited with {} for {}", self.program, status, stub.id),
            }
        }

        Ok(destination)
    }
}

async fn read_destination(stdout: impl AsyncRead + Unpin) -> Result<Option<PathBuf>> {
    let mut lines = BufReader::new(stdout).lines();
    let mut destination = None;

    while let Some(line) = lines.next_line().await.context("Failed to read downloader output")? {
        if let Some(path) = parse_destination(&line) {
            destination = Some(path);
        }
    }

    Ok(destination)
}

async fn log_stderr(stderr: impl AsyncRead + Unpin, id: &str) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("[{}] {}", id, line);
    }
}

/// Extract the output path announced on a downloader stdout line
///
/// Two shapes are recognized:
/// `[ExtractAudio] Destination: <path>` and
/// `[ExtractAudio] Not converting audio <path>; <annotation>`.
pub fn parse_destination(line: &str) -> Option<PathBuf> {
    let line = line.trim_end();

    let path = if let Some(rest) = line.strip_prefix(DESTINATION_PREFIX) {
        rest
    } else if let Some(rest) = line.strip_prefix(NOT_CONVERTING_PREFIX) {
        rest.split_once("; ").map_or(rest, |(path, _)| path)
    } else {
        return None;
    };

    let path = path.trim();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_destination_line() {
        assert_eq!(
            parse_destination("[ExtractAudio] Destination: /m/d/Song-dQw4w9WgXcQ.opus"),
            Some(PathBuf::from("/m/d/Song-dQw4w9WgXcQ.opus"))
        );
    }

    #[test]
    fn test_parse_not_converting_line() {
        assert_eq!(
            parse_destination(
                "[ExtractAudio] Not converting audio /m/a/Track_abc.m4a; file is already in target format m4a\r"
            ),
            Some(PathBuf::from("/m/a/Track_abc.m4a"))
        );
        assert_eq!(
            parse_destination("[ExtractAudio] Not converting audio /m/a/plain.opus"),
            Some(PathBuf::from("/m/a/plain.opus"))
        );
    }

    #[test]
    fn test_parse_other_lines() {
        assert_eq!(parse_destination("[download] 100% of 3.2MiB"), None);
        assert_eq!(parse_destination("[ExtractAudio] Destination: "), None);
        assert_eq!(parse_destination(""), None);
    }

    #[tokio::test]
    async fn test_last_destination_wins() {
        let output: &[u8] = b"[youtube] abc: Downloading webpage\n\
            [ExtractAudio] Destination: /m/a/first.webm\n\
            [ExtractAudio] Destination: /m/a/final.opus\n\
            Deleting original file /m/a/first.webm\n";

        let destination = read_destination(output).await.unwrap();

        assert_eq!(destination, Some(PathBuf::from("/m/a/final.opus")));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let downloader = YtDlpDownloader::new("mossync-no-such-downloader");
        let stub = MediaStub::remote("abc", "Song", "chan");

        let result = downloader.download(&stub, Path::new("/tmp")).await;

        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_output_stops_the_child() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = dir.path().join("fake-dl");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nexec 2>/dev/null\necho $$ > '{}'\nprintf '\\377\\376\\n'\nexec sleep 30\n",
                pid_file.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let downloader = YtDlpDownloader::new(script.to_string_lossy());
        let stub = MediaStub::remote("abc", "Song", "chan");

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            downloader.download(&stub, dir.path()),
        )
        .await
        .unwrap();
        assert!(result.is_err());

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let alive = std::process::Command::new("kill")
            .args(["-0", pid.trim()])
            .stderr(Stdio::null())
            .status()
            .unwrap()
            .success();
        assert!(!alive);
    }
}
