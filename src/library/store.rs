//! SQLite-backed playlist and media store

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::layout::MediaLayout;
use super::models::{MediaItem, Playlist, PlaylistItem, SourceKind};
use crate::error::{Result, SyncError};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS playlists (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        position INTEGER NOT NULL,
        source TEXT NOT NULL DEFAULT '',
        synced_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS media_items (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        path TEXT NOT NULL,
        channel TEXT NOT NULL,
        source_kind TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS memberships (
        playlist_id TEXT NOT NULL,
        media_item_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (playlist_id, media_item_id),
        FOREIGN KEY (playlist_id) REFERENCES playlists (id) ON DELETE CASCADE,
        FOREIGN KEY (media_item_id) REFERENCES media_items (id) ON DELETE CASCADE
    )",
    "CREATE INDEX IF NOT EXISTS idx_memberships_media_item ON memberships (media_item_id)",
];

const ORPHANS: &str = "SELECT id, path FROM media_items
     WHERE id NOT IN (SELECT media_item_id FROM memberships)";

/// What an orphan sweep removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Media item rows deleted
    pub rows_deleted: u64,
    /// Backing files deleted from the managed cache
    pub files_deleted: Vec<PathBuf>,
}

/// Durable state for playlists, media items and membership
///
/// Wraps one shared connection handle; every method is an independent
/// statement unless noted otherwise.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let store = Self::connect(options).await?;
        info!("Opened database: {}", path.display());
        Ok(store)
    }

    /// Private in-memory database
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        Self::connect(options).await
    }

    /// Wrap an existing pool; the schema is assumed to be in place
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // One long-lived connection: keeps an in-memory database alive and
        // serializes statements the way a single handle would
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool);
        store.create_schema().await?;
        Ok(store)
    }

    /// Run a raw statement against the database
    #[cfg(test)]
    pub async fn execute_raw(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn create_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    // Playlists

    /// All playlists ordered by position
    pub async fn list_playlists(&self) -> Result<Vec<Playlist>> {
        let rows = sqlx::query(
            "SELECT id, title, position, source, synced_at FROM playlists ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(playlist_from_row).collect()
    }

    pub async fn get_playlist(&self, id: &str) -> Result<Option<Playlist>> {
        let row = sqlx::query(
            "SELECT id, title, position, source, synced_at FROM playlists WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(playlist_from_row).transpose()
    }

    /// Append a new playlist after the last one
    ///
    /// The position (`MAX(position) + 1`, or 0 for an empty table) is taken
    /// in the same statement as the insert, so concurrent appends never share
    /// a slot. Returns `None` when a playlist with this id already exists.
    pub async fn insert_playlist(&self, id: &str, title: &str, source: &str) -> Result<Option<i64>> {
        let position: Option<i64> = sqlx::query_scalar(
            "INSERT INTO playlists (id, title, position, source)
             SELECT ?, ?, COALESCE(MAX(position), -1) + 1, ? FROM playlists WHERE true
             ON CONFLICT(id) DO NOTHING
             RETURNING position",
        )
        .bind(id)
        .bind(title)
        .bind(source)
        .fetch_optional(&self.pool)
        .await?;

        Ok(position)
    }

    /// Insert a playlist, or update title and source of an existing one
    ///
    /// The stored position of an existing playlist is never changed here.
    pub async fn upsert_playlist(&self, playlist: &Playlist) -> Result<()> {
        sqlx::query(
            "INSERT INTO playlists (id, title, position, source, synced_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET title = excluded.title, source = excluded.source",
        )
        .bind(&playlist.id)
        .bind(&playlist.title)
        .bind(playlist.position)
        .bind(&playlist.source)
        .bind(playlist.synced_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_synced(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE playlists SET synced_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Swap two playlists' positions in one transaction
    pub async fn swap_positions(&self, first: &str, second: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let first_position = position_in(&mut tx, first).await?;
        let second_position = position_in(&mut tx, second).await?;

        sqlx::query("UPDATE playlists SET position = ? WHERE id = ?")
            .bind(second_position)
            .bind(first)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE playlists SET position = ? WHERE id = ?")
            .bind(first_position)
            .bind(second)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!("Swapped playlist positions: {} <-> {}", first, second);
        Ok(())
    }

    /// Delete a playlist, close the gap it leaves in the ordering, then
    /// sweep media items no playlist references any more
    pub async fn remove_playlist(&self, id: &str, layout: &MediaLayout) -> Result<SweepReport> {
        let mut tx = self.pool.begin().await?;

        let position = position_in(&mut tx, id).await?;

        // Memberships go with the playlist via ON DELETE CASCADE
        sqlx::query("DELETE FROM playlists WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE playlists SET position = position - 1 WHERE position > ?")
            .bind(position)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Playlist deleted: {}", id);

        self.sweep_orphans(layout).await
    }

    // Media items

    #[cfg(test)]
    pub async fn get_media_item(&self, id: &str) -> Result<Option<MediaItem>> {
        let row = sqlx::query(
            "SELECT id, title, path, channel, source_kind FROM media_items WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(media_item_from_row).transpose()
    }

    pub async fn has_media_item(&self, id: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM media_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    pub async fn count_media_items(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media_items")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Insert or update a media item in place
    ///
    /// An update never deletes the row, so existing memberships survive.
    pub async fn upsert_media_item(&self, item: &MediaItem) -> Result<()> {
        sqlx::query(
            "INSERT INTO media_items (id, title, path, channel, source_kind)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                path = excluded.path,
                channel = excluded.channel,
                source_kind = excluded.source_kind",
        )
        .bind(&item.id)
        .bind(&item.title)
        .bind(item.local_path.to_string_lossy().into_owned())
        .bind(&item.channel)
        .bind(item.source_kind.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // Membership

    /// Item ids in a playlist, in playback order
    pub async fn membership_ids(&self, playlist_id: &str) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar(
            "SELECT media_item_id FROM memberships WHERE playlist_id = ? ORDER BY position",
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// A playlist's items joined with their membership position
    pub async fn list_items(&self, playlist_id: &str) -> Result<Vec<PlaylistItem>> {
        let rows = sqlx::query(
            "SELECT m.id, m.title, m.path, m.channel, m.source_kind, ms.position
             FROM media_items m
             JOIN memberships ms ON m.id = ms.media_item_id
             WHERE ms.playlist_id = ?
             ORDER BY ms.position",
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<PlaylistItem> {
                Ok(PlaylistItem {
                    item: media_item_from_row(row)?,
                    position: row.try_get("position")?,
                })
            })
            .collect()
    }

    pub async fn count_items(&self, playlist_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM memberships WHERE playlist_id = ?")
                .bind(playlist_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    pub async fn upsert_membership(
        &self,
        playlist_id: &str,
        media_item_id: &str,
        position: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO memberships (playlist_id, media_item_id, position)
             VALUES (?, ?, ?)
             ON CONFLICT(playlist_id, media_item_id) DO UPDATE SET position = excluded.position",
        )
        .bind(playlist_id)
        .bind(media_item_id)
        .bind(position)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_membership(&self, playlist_id: &str, media_item_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM memberships WHERE playlist_id = ? AND media_item_id = ?")
            .bind(playlist_id)
            .bind(media_item_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Delete media items with no memberships
    ///
    /// Orphans are collected and deleted in one transaction; afterwards their
    /// backing files are removed, but only when they live in the managed cache.
    pub async fn sweep_orphans(&self, layout: &MediaLayout) -> Result<SweepReport> {
        let mut tx = self.pool.begin().await?;

        let orphans: Vec<(String, String)> = sqlx::query_as(ORPHANS)
            .fetch_all(&mut *tx)
            .await?;

        if orphans.is_empty() {
            return Ok(SweepReport::default());
        }

        let rows_deleted = sqlx::query(
            "DELETE FROM media_items WHERE id NOT IN (SELECT media_item_id FROM memberships)",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        debug!("Deleted {} unreferenced media items", rows_deleted);

        let mut files_deleted = Vec::new();
        for (id, path) in orphans {
            let path = PathBuf::from(path);
            if !layout.is_managed(&path) {
                debug!("Keeping unmanaged file for {}: {}", id, path.display());
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Deleted media file: {}", path.display());
                    files_deleted.push(path);
                }
                Err(e) => warn!("Error deleting media file {}: {}", path.display(), e),
            }
        }

        Ok(SweepReport {
            rows_deleted,
            files_deleted,
        })
    }
}

async fn position_in(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<i64> {
    sqlx::query_scalar("SELECT position FROM playlists WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| SyncError::PlaylistNotFound(id.to_string()))
}

fn playlist_from_row(row: &SqliteRow) -> Result<Playlist> {
    let synced_at: Option<String> = row.try_get("synced_at")?;

    Ok(Playlist {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        position: row.try_get("position")?,
        source: row.try_get("source")?,
        synced_at: synced_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc)),
    })
}

fn media_item_from_row(row: &SqliteRow) -> Result<MediaItem> {
    let path: String = row.try_get("path")?;
    let kind: String = row.try_get("source_kind")?;

    Ok(MediaItem {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        local_path: PathBuf::from(path),
        channel: row.try_get("channel")?,
        source_kind: kind
            .parse::<SourceKind>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?,
    })
}
