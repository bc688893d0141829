//! Library configuration persistence
//!
//! Stored in ~/.config/mossync/config.json. Every field is optional on disk;
//! missing fields fall back to defaults, and CLI flags override the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::sync::PipelineConfig;

const APP_DIR: &str = "mossync";
const CONFIG_FILE: &str = "config.json";
const DATA_DIR_NAME: &str = "moss-music";
const DEFAULT_PROGRAM: &str = "yt-dlp";

/// Library settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root for the database, the media cache and local override files
    pub data_dir: PathBuf,
    /// Executable used to resolve remote playlists
    pub resolver_program: String,
    /// Executable used to download remote items
    pub downloader_program: String,
    /// Items acquired concurrently per batch
    pub batch_size: usize,
    /// Pause between batches, in milliseconds
    pub batch_delay_ms: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            resolver_program: DEFAULT_PROGRAM.to_string(),
            downloader_program: DEFAULT_PROGRAM.to_string(),
            batch_size: PipelineConfig::DEFAULT_BATCH_SIZE,
            batch_delay_ms: PipelineConfig::DEFAULT_BATCH_DELAY.as_millis() as u64,
        }
    }
}

impl LibraryConfig {
    /// Load the config from its default location, or defaults if absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load the config from a specific file, or defaults if absent
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        let config: Self =
            serde_json::from_str(&contents).with_context(|| "Failed to parse config")?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save the config to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join(APP_DIR).join(CONFIG_FILE))
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("database.db")
    }

    /// Managed cache for downloaded items
    pub fn media_root(&self) -> PathBuf {
        self.data_dir.join("songs")
    }

    /// Root that description overrides' relative paths resolve against
    pub fn local_root(&self) -> PathBuf {
        self.data_dir.join("files")
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            batch_size: self.batch_size.max(1),
            batch_delay: Duration::from_millis(self.batch_delay_ms),
        }
    }
}

/// ~/.local/share/moss-music on Linux, the platform data dir elsewhere
fn default_data_dir() -> PathBuf {
    let base = if cfg!(target_os = "linux") {
        dirs::home_dir().map(|home| home.join(".local").join("share"))
    } else {
        dirs::data_dir()
    };
    base.unwrap_or_else(|| PathBuf::from(".")).join(DATA_DIR_NAME)
}
