//! Sync engine orchestration
//!
//! One call to [`SyncEngine::sync_playlist`] walks the phases
//! resolving → diffing → acquiring → committing → done. Only resolution can
//! reject the whole call before anything is written; store failures later on
//! propagate without undoing what was already committed.

use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::downloader::Downloader;
use super::pipeline::{AcquisitionPipeline, PipelineConfig};
use super::progress::ProgressSink;
use crate::error::{Result, SyncError};
use crate::library::{MediaLayout, Playlist, PlaylistItem, Store, SweepReport};
use crate::source::{CatalogResolver, PlaylistDescriptor, PlaylistSource};
use crate::utils::parse_manifest;

/// Phases of a single playlist sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Resolving,
    Diffing,
    Acquiring,
    Committing,
    Done,
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::Diffing => "diffing",
            Self::Acquiring => "acquiring",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What happened to the playlist row itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistChange {
    Inserted,
    Renamed,
    Unchanged,
}

/// Result of a playlist sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub playlist_id: String,
    pub title: String,
    pub change: PlaylistChange,
    /// Entries in the desired list, duplicates included
    pub desired: usize,
    /// Distinct items that were already stored before this sync
    pub already_present: usize,
    /// Items acquired by this sync
    pub acquired: Vec<String>,
    /// Items whose acquisition failed; they have no membership row
    pub failed: Vec<String>,
    /// Memberships dropped because the item left the playlist
    pub removed: usize,
}

/// Outcome of re-syncing one stored playlist
#[derive(Debug)]
pub struct RefreshOutcome {
    pub playlist_id: String,
    pub result: Result<SyncReport>,
}

/// Reconciles playlists against the store and the media cache
pub struct SyncEngine {
    store: Store,
    resolver: Arc<dyn CatalogResolver>,
    layout: MediaLayout,
    pipeline: AcquisitionPipeline,
}

impl SyncEngine {
    pub fn new(
        store: Store,
        resolver: Arc<dyn CatalogResolver>,
        downloader: Arc<dyn Downloader>,
        progress: Arc<dyn ProgressSink>,
        layout: MediaLayout,
        config: PipelineConfig,
    ) -> Self {
        let pipeline =
            AcquisitionPipeline::new(store.clone(), downloader, progress, layout.clone(), config);

        Self {
            store,
            resolver,
            layout,
            pipeline,
        }
    }

    /// Bring one playlist's stored membership in line with its source
    ///
    /// `reference` is a manifest path, a playlist URL or a bare playlist id.
    pub async fn sync_playlist(&self, reference: &str) -> Result<SyncReport> {
        info!("Syncing playlist: {}", reference);

        enter(reference, SyncPhase::Resolving);
        let descriptor = match self.resolve(reference).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                enter(reference, SyncPhase::Failed);
                warn!("Could not resolve {}: {}", reference, e);
                return Err(e);
            }
        };
        let playlist_id = descriptor.id.as_str();

        self.layout.init().await?;

        enter(playlist_id, SyncPhase::Diffing);
        let desired: HashSet<&str> = descriptor.items.iter().map(|i| i.id.as_str()).collect();
        let to_remove: Vec<String> = self
            .store
            .membership_ids(playlist_id)
            .await?
            .into_iter()
            .filter(|id| !desired.contains(id.as_str()))
            .collect();
        let change = self.upsert_playlist(&descriptor).await?;

        enter(playlist_id, SyncPhase::Acquiring);
        let mut seen = HashSet::new();
        let mut missing = Vec::new();
        let mut already_present = 0;
        for stub in &descriptor.items {
            if !seen.insert(stub.id.as_str()) {
                continue;
            }
            if self.store.has_media_item(&stub.id).await? {
                already_present += 1;
            } else {
                missing.push(stub.clone());
            }
        }
        let outcome = self.pipeline.acquire(playlist_id, missing).await?;

        enter(playlist_id, SyncPhase::Committing);
        for id in &to_remove {
            self.store.delete_membership(playlist_id, id).await?;
        }
        // Desired order; a repeated id ends up at its last index. Items that
        // could not be acquired leave a hole in the positions.
        for (index, stub) in descriptor.items.iter().enumerate() {
            if self.store.has_media_item(&stub.id).await? {
                self.store
                    .upsert_membership(playlist_id, &stub.id, index as i64)
                    .await?;
            }
        }

        self.store.mark_synced(playlist_id, Utc::now()).await?;
        enter(playlist_id, SyncPhase::Done);

        let report = SyncReport {
            playlist_id: descriptor.id.clone(),
            title: descriptor.title.clone(),
            change,
            desired: descriptor.items.len(),
            already_present,
            acquired: outcome.acquired,
            failed: outcome.failed,
            removed: to_remove.len(),
        };

        info!(
            "Playlist synced: {} ({} acquired, {} failed, {} removed)",
            report.title,
            report.acquired.len(),
            report.failed.len(),
            report.removed
        );
        Ok(report)
    }

    /// Delete a playlist, then drop media no other playlist references
    pub async fn remove_playlist(&self, playlist_id: &str) -> Result<SweepReport> {
        let report = self
            .store
            .remove_playlist(playlist_id, &self.layout)
            .await?;

        info!(
            "Removed playlist {} ({} orphaned items, {} files deleted)",
            playlist_id,
            report.rows_deleted,
            report.files_deleted.len()
        );
        Ok(report)
    }

    pub async fn list_playlists(&self) -> Result<Vec<Playlist>> {
        self.store.list_playlists().await
    }

    pub async fn list_items(&self, playlist_id: &str) -> Result<Vec<PlaylistItem>> {
        self.store.list_items(playlist_id).await
    }

    pub async fn item_count(&self, playlist_id: &str) -> Result<i64> {
        self.store.count_items(playlist_id).await
    }

    /// Distinct media items held by the library
    pub async fn media_count(&self) -> Result<i64> {
        self.store.count_media_items().await
    }

    /// Swap the positions of two playlists
    pub async fn reorder_playlists(&self, first: &str, second: &str) -> Result<()> {
        self.store.swap_positions(first, second).await
    }

    /// Re-sync stored playlists one after another from their stored source
    ///
    /// With `stale_after`, only playlists never synced or last synced at
    /// least that long ago are refreshed. A failing playlist does not stop
    /// the others.
    pub async fn refresh_all(&self, stale_after: Option<Duration>) -> Result<Vec<RefreshOutcome>> {
        let now = Utc::now();
        let mut outcomes = Vec::new();

        for playlist in self.store.list_playlists().await? {
            let due = match (stale_after, playlist.synced_at) {
                (Some(max_age), Some(synced_at)) => (now - synced_at)
                    .to_std()
                    .is_ok_and(|age| age >= max_age),
                _ => true,
            };
            if !due {
                debug!("Playlist is fresh, skipping: {}", playlist.id);
                continue;
            }

            let reference = if playlist.source.is_empty() {
                playlist.id.as_str()
            } else {
                playlist.source.as_str()
            };

            let result = self.sync_playlist(reference).await;
            outcomes.push(RefreshOutcome {
                playlist_id: playlist.id,
                result,
            });
        }

        Ok(outcomes)
    }

    async fn resolve(&self, reference: &str) -> Result<PlaylistDescriptor> {
        match PlaylistSource::classify(reference) {
            PlaylistSource::Manifest(path) => parse_manifest(&path).await,
            PlaylistSource::Remote(reference) => self.resolver.resolve(&reference).await,
        }
    }

    async fn upsert_playlist(&self, descriptor: &PlaylistDescriptor) -> Result<PlaylistChange> {
        let existing = match self.store.get_playlist(&descriptor.id).await? {
            Some(playlist) => playlist,
            None => {
                let inserted = self
                    .store
                    .insert_playlist(&descriptor.id, &descriptor.title, &descriptor.source)
                    .await?;
                if let Some(position) = inserted {
                    debug!("Playlist {} inserted at position {}", descriptor.id, position);
                    return Ok(PlaylistChange::Inserted);
                }
                // A concurrent sync of the same playlist inserted it first
                self.store
                    .get_playlist(&descriptor.id)
                    .await?
                    .ok_or_else(|| SyncError::PlaylistNotFound(descriptor.id.clone()))?
            }
        };

        let renamed = existing.title != descriptor.title;
        if renamed || existing.source != descriptor.source {
            self.store
                .upsert_playlist(&Playlist {
                    id: descriptor.id.clone(),
                    title: descriptor.title.clone(),
                    position: existing.position,
                    source: descriptor.source.clone(),
                    synced_at: existing.synced_at,
                })
                .await?;
        }

        let change = if renamed {
            PlaylistChange::Renamed
        } else {
            PlaylistChange::Unchanged
        };
        debug!("Playlist {} {:?} at position {}", descriptor.id, change, existing.position);
        Ok(change)
    }
}

fn enter(playlist: &str, phase: SyncPhase) {
    debug!("[{}] {}", playlist, phase);
}
