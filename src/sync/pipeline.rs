//! Batched acquisition of missing media items
//!
//! Items are split into batches of `batch_size`. Batches run strictly one
//! after another with `batch_delay` between them; the items of a batch are
//! in flight together on the calling task. An item that cannot be fetched is
//! logged and skipped, never aborting the rest of the run. Store errors are
//! not per-item failures and propagate to the caller.

use anyhow::{Context, bail};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::downloader::Downloader;
use super::progress::ProgressSink;
use crate::error::Result;
use crate::library::{MediaItem, MediaLayout, SourceKind, Store};
use crate::source::MediaStub;

/// Batching parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Items acquired concurrently
    pub batch_size: usize,
    /// Pause between consecutive batches
    pub batch_delay: Duration,
}

impl PipelineConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 5;
    pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: Self::DEFAULT_BATCH_SIZE,
            batch_delay: Self::DEFAULT_BATCH_DELAY,
        }
    }
}

/// Ids that ended up in the store and ids that did not
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionOutcome {
    pub acquired: Vec<String>,
    pub failed: Vec<String>,
}

/// Fetches missing items and records them in the store
pub struct AcquisitionPipeline {
    store: Store,
    downloader: Arc<dyn Downloader>,
    progress: Arc<dyn ProgressSink>,
    layout: MediaLayout,
    config: PipelineConfig,
}

impl AcquisitionPipeline {
    pub fn new(
        store: Store,
        downloader: Arc<dyn Downloader>,
        progress: Arc<dyn ProgressSink>,
        layout: MediaLayout,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            downloader,
            progress,
            layout,
            config,
        }
    }

    /// Acquire every stub, reporting progress against `playlist_id`
    ///
    /// Progress starts at 0.0 and the last emission is exactly 1.0. A failed
    /// fetch only marks its item as failed; a store error fails the call once
    /// the batch it happened in has settled.
    pub async fn acquire(&self, playlist_id: &str, missing: Vec<MediaStub>) -> Result<AcquisitionOutcome> {
        let total = missing.len();
        let mut outcome = AcquisitionOutcome::default();

        self.progress.on_progress(playlist_id, 0.0);
        if total == 0 {
            self.progress.on_progress(playlist_id, 1.0);
            return Ok(outcome);
        }

        debug!("Acquiring {} items for {}", total, playlist_id);
        let completed = AtomicUsize::new(0);
        let batch_size = self.config.batch_size.max(1);

        for (index, batch) in missing.chunks(batch_size).enumerate() {
            if index > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let results = join_all(batch.iter().map(|stub| {
                let completed = &completed;
                async move {
                    let result = self.acquire_one(stub).await;

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    self.progress
                        .on_progress(playlist_id, done as f64 / total as f64);

                    (stub.id.clone(), result)
                }
            }))
            .await;

            for (id, result) in results {
                if result? {
                    outcome.acquired.push(id);
                } else {
                    outcome.failed.push(id);
                }
            }
        }

        debug!(
            "Acquisition for {} finished: {} acquired, {} failed",
            playlist_id,
            outcome.acquired.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    /// Returns whether the item is in the store afterwards
    async fn acquire_one(&self, stub: &MediaStub) -> Result<bool> {
        // Another playlist's sync may have fetched it since the diff
        if self.store.has_media_item(&stub.id).await? {
            debug!("Already present: {}", stub.id);
            return Ok(true);
        }

        let path = match self.fetch(stub).await {
            Ok(path) => path,
            Err(e) => {
                warn!("Failed to acquire {} ({}): {:#}", stub.title, stub.id, e);
                return Ok(false);
            }
        };

        let item = MediaItem {
            id: stub.id.clone(),
            title: stub.title.clone(),
            local_path: path,
            channel: stub.channel.clone(),
            source_kind: stub.source_kind,
        };
        self.store.upsert_media_item(&item).await?;

        debug!("Acquired: {} -> {}", item.id, item.local_path.display());
        Ok(true)
    }

    /// Locate or download the file backing a stub
    async fn fetch(&self, stub: &MediaStub) -> anyhow::Result<PathBuf> {
        match stub.source_kind {
            SourceKind::Local => {
                let path = stub
                    .local_path
                    .clone()
                    .context("local item has no path")?;
                let exists = tokio::fs::try_exists(&path)
                    .await
                    .with_context(|| format!("Failed to check {}", path.display()))?;
                if !exists {
                    bail!("local file {} does not exist", path.display());
                }
                Ok(path)
            }
            SourceKind::Remote => {
                let dest_dir = self.layout.bucket_for(&stub.id);
                match self.downloader.download(stub, &dest_dir).await? {
                    Some(path) => Ok(path),
                    None => bail!("downloader produced no file"),
                }
            }
        }
    }
}
