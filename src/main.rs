//! mossync - Sync playlists into a deduplicated local media library

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod error;
mod library;
mod source;
mod sync;
mod utils;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "mossync=debug,sqlx=warn"
    } else {
        "mossync=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let data_dir = cli.data_dir;

    match cli.command {
        Some(Commands::Sync { references }) => {
            cli::commands::sync(data_dir, references).await?;
        }
        Some(Commands::Refresh { stale_hours }) => {
            cli::commands::refresh(data_dir, stale_hours).await?;
        }
        Some(Commands::Remove { playlist_id, yes }) => {
            cli::commands::remove(data_dir, playlist_id, yes).await?;
        }
        Some(Commands::Items { playlist_id }) => {
            cli::commands::items(data_dir, playlist_id).await?;
        }
        Some(Commands::Swap { first, second }) => {
            cli::commands::swap(data_dir, first, second).await?;
        }
        Some(Commands::Config { init }) => {
            cli::commands::config(data_dir, init)?;
        }
        Some(Commands::Completion { shell }) => {
            cli::commands::completion(shell);
        }
        Some(Commands::List) | None => {
            cli::commands::list(data_dir).await?;
        }
    }

    Ok(())
}
