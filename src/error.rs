//! Error taxonomy for sync operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors that reject a whole engine call
///
/// Per-item acquisition failures are not represented here: they are logged
/// and counted in the [`SyncReport`](crate::sync::SyncReport) instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A local manifest could not be read or contained no references
    #[error("failed to parse manifest {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// The catalog resolver failed or produced unusable output
    #[error("failed to resolve playlist {reference}: {reason}")]
    Resolution { reference: String, reason: String },

    /// No playlist with this id is stored
    #[error("playlist not found: {0}")]
    PlaylistNotFound(String),

    /// The persistence layer rejected a statement
    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn resolution(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            reference: reference.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
