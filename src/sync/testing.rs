//! In-process stand-ins for the resolver and downloader subprocesses

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::downloader::Downloader;
use crate::error::{self, SyncError};
use crate::source::{CatalogResolver, MediaStub, PlaylistDescriptor};

/// Writes a small file per item, failing for a fixed set of ids
#[derive(Debug, Default)]
pub struct FakeDownloader {
    fail: HashSet<String>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeDownloader {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            fail: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, stub: &MediaStub, dest_dir: &Path) -> Result<Option<PathBuf>> {
        self.calls.lock().unwrap().push(stub.id.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.contains(&stub.id) {
            return Ok(None);
        }

        let path = dest_dir.join(format!("{}.opus", stub.id));
        tokio::fs::write(&path, b"audio").await?;
        Ok(Some(path))
    }
}

/// Serves descriptors from a table keyed by reference
#[derive(Debug, Default)]
pub struct FakeResolver {
    playlists: Mutex<HashMap<String, PlaylistDescriptor>>,
    calls: Mutex<Vec<String>>,
}

impl FakeResolver {
    /// Register (or replace) the descriptor served for `reference`
    pub fn set(&self, reference: &str, id: &str, title: &str, items: Vec<MediaStub>) {
        let descriptor = PlaylistDescriptor {
            id: id.to_string(),
            title: title.to_string(),
            source: reference.to_string(),
            items,
        };
        self.playlists
            .lock()
            .unwrap()
            .insert(reference.to_string(), descriptor);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogResolver for FakeResolver {
    async fn resolve(&self, reference: &str) -> error::Result<PlaylistDescriptor> {
        self.calls.lock().unwrap().push(reference.to_string());
        self.playlists
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| SyncError::resolution(reference, "unknown playlist"))
    }
}

/// Remote stubs with predictable titles
pub fn remote(ids: &[&str]) -> Vec<MediaStub> {
    ids.iter()
        .map(|id| MediaStub::remote(*id, format!("{} title", id), "chan"))
        .collect()
}
