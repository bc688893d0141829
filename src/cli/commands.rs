//! CLI command handlers

use anyhow::{Context, Result};
use chrono::Local;
use clap::CommandFactory;
use clap_complete::generate;
use colored::Colorize;
use dialoguer::Confirm;
use futures::future::join_all;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::library::{LibraryConfig, MediaLayout, Playlist, Store};
use crate::source::YtDlpResolver;
use crate::sync::{
    ConsoleProgress, NoProgress, PlaylistChange, ProgressSink, SyncEngine, SyncReport,
    YtDlpDownloader,
};

/// Load the config and apply CLI overrides
fn load_config(data_dir: Option<PathBuf>) -> Result<LibraryConfig> {
    let mut config = LibraryConfig::load()?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    Ok(config)
}

/// Wire up the engine; `progress` receives acquisition progress
async fn open_engine(
    data_dir: Option<PathBuf>,
    progress: Arc<dyn ProgressSink>,
) -> Result<SyncEngine> {
    let config = load_config(data_dir)?;

    let db_path = config.database_path();
    let store = Store::open(&db_path)
        .await
        .with_context(|| format!("Failed to open library database {:?}", db_path))?;

    let layout = MediaLayout::new(config.media_root(), config.local_root());
    let resolver = YtDlpResolver::new(config.resolver_program.clone(), config.local_root());
    let downloader = YtDlpDownloader::new(config.downloader_program.clone());

    Ok(SyncEngine::new(
        store,
        Arc::new(resolver),
        Arc::new(downloader),
        progress,
        layout,
        config.pipeline(),
    ))
}

/// Handle the `sync` command
pub async fn sync(data_dir: Option<PathBuf>, references: Vec<String>) -> Result<()> {
    let engine = open_engine(data_dir, Arc::new(ConsoleProgress::new())).await?;

    println!(
        "{}",
        format!("Syncing {} playlist(s)...", references.len()).cyan()
    );

    let results = join_all(references.iter().map(|r| engine.sync_playlist(r))).await;

    println!();
    let mut failures = 0;
    for (reference, result) in references.iter().zip(results) {
        match result {
            Ok(report) => print_report(&report),
            Err(e) => {
                failures += 1;
                println!("{} {}", "Failed:".red().bold(), reference);
                println!("  {}", e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} playlist(s) failed to sync", failures, references.len());
    }

    Ok(())
}

/// Handle the `refresh` command
pub async fn refresh(data_dir: Option<PathBuf>, stale_hours: Option<u64>) -> Result<()> {
    let engine = open_engine(data_dir, Arc::new(ConsoleProgress::new())).await?;
    let stale_after = stale_hours.map(|h| Duration::from_secs(h * 3600));

    println!("{}", "Refreshing playlists...".cyan());
    let outcomes = engine.refresh_all(stale_after).await?;

    if outcomes.is_empty() {
        println!("{}", "Everything is up to date.".green());
        return Ok(());
    }

    println!();
    let mut failures = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => print_report(report),
            Err(e) => {
                failures += 1;
                println!("{} {}", "Failed:".red().bold(), outcome.playlist_id);
                println!("  {}", e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} playlist(s) failed to refresh", failures, outcomes.len());
    }

    Ok(())
}

/// Handle the `remove` command
pub async fn remove(data_dir: Option<PathBuf>, playlist_id: String, yes: bool) -> Result<()> {
    let engine = open_engine(data_dir, Arc::new(NoProgress)).await?;
    let playlist = find_playlist(&engine, &playlist_id).await?;

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Remove playlist '{}'?", playlist.title))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("{}", "Cancelled.".yellow());
            return Ok(());
        }
    }

    let report = engine.remove_playlist(&playlist.id).await?;

    println!("{} {}", "Removed".green().bold(), playlist.title);
    if report.rows_deleted > 0 {
        println!(
            "  Dropped {} unused item(s), deleted {} file(s)",
            report.rows_deleted,
            report.files_deleted.len()
        );
    }

    Ok(())
}

/// Handle the `list` command
pub async fn list(data_dir: Option<PathBuf>) -> Result<()> {
    let engine = open_engine(data_dir, Arc::new(NoProgress)).await?;
    let playlists = engine.list_playlists().await?;

    if playlists.is_empty() {
        println!("{}", "No playlists yet.".yellow());
        println!("Run {} to add one.", "mossync sync <REF>".cyan());
        return Ok(());
    }

    println!(
        "{} playlist(s), {} cached item(s)",
        playlists.len(),
        engine.media_count().await?
    );
    for playlist in &playlists {
        let count = engine.item_count(&playlist.id).await?;
        let synced = playlist
            .synced_at
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());

        println!(
            "{:>3}. {} ({})",
            playlist.position,
            playlist.title.green().bold(),
            playlist.id
        );
        println!("     {} items, last sync: {}", count, synced);
    }

    Ok(())
}

/// Handle the `items` command
pub async fn items(data_dir: Option<PathBuf>, playlist_id: String) -> Result<()> {
    let engine = open_engine(data_dir, Arc::new(NoProgress)).await?;
    let playlist = find_playlist(&engine, &playlist_id).await?;
    let items = engine.list_items(&playlist.id).await?;

    println!("{}", playlist.title.green().bold());
    if items.is_empty() {
        println!("  {}", "(no items)".yellow());
        return Ok(());
    }

    for entry in &items {
        println!(
            "{:>4}. {} - {}",
            entry.position,
            entry.item.title,
            entry.item.channel.cyan()
        );
        println!("      {}", entry.item.local_path.display().to_string().dimmed());
    }

    Ok(())
}

/// Handle the `swap` command
pub async fn swap(data_dir: Option<PathBuf>, first: String, second: String) -> Result<()> {
    let engine = open_engine(data_dir, Arc::new(NoProgress)).await?;
    engine.reorder_playlists(&first, &second).await?;

    println!("Swapped {} and {}", first.cyan(), second.cyan());
    Ok(())
}

/// Handle the `config` command
pub fn config(data_dir: Option<PathBuf>, init: bool) -> Result<()> {
    let config = load_config(data_dir)?;
    let path = LibraryConfig::config_path()?;

    if init {
        config.save_to(&path)?;
        println!("{} {}", "Wrote".green().bold(), path.display());
    }

    println!("{}", "Configuration".cyan().bold());
    println!("  file:       {}", path.display());
    println!("  data dir:   {}", config.data_dir.display());
    println!("  database:   {}", config.database_path().display());
    println!("  resolver:   {}", config.resolver_program);
    println!("  downloader: {}", config.downloader_program);
    println!(
        "  batches:    {} item(s), {} ms apart",
        config.batch_size, config.batch_delay_ms
    );

    Ok(())
}

/// Handle the `completion` command
pub fn completion(shell: clap_complete::Shell) {
    let mut cmd = super::Cli::command();
    generate(shell, &mut cmd, "mossync", &mut io::stdout());
}

async fn find_playlist(engine: &SyncEngine, playlist_id: &str) -> Result<Playlist> {
    engine
        .list_playlists()
        .await?
        .into_iter()
        .find(|p| p.id == playlist_id)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Playlist '{}' not found. Run 'mossync list' to see stored playlists.",
                playlist_id
            )
        })
}

fn print_report(report: &SyncReport) {
    let status = match report.change {
        PlaylistChange::Inserted => "added",
        PlaylistChange::Renamed => "renamed",
        PlaylistChange::Unchanged => "updated",
    };

    println!(
        "{} {} ({}) {}",
        "✓".green(),
        report.title.bold(),
        report.playlist_id,
        status
    );
    println!(
        "  {} item(s): {} downloaded, {} already cached, {} removed",
        report.desired,
        report.acquired.len(),
        report.already_present,
        report.removed
    );
    if !report.failed.is_empty() {
        println!(
            "  {}",
            format!("{} item(s) failed: {}", report.failed.len(), report.failed.join(", ")).yellow()
        );
    }
}
