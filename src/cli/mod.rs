//! CLI module for mossync

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser, Debug)]
#[command(name = "mossync", about = "Sync playlists into a deduplicated local media library")]
#[command(version, author)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Library data directory (database, media cache, local files)
    #[arg(long, global = true, env = "MOSSYNC_DATA_DIR", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync one or more playlists into the library
    Sync {
        /// Playlist URL, bare playlist id, or path to an .m3u/.m3u8 manifest
        #[arg(value_name = "REF", required = true)]
        references: Vec<String>,
    },

    /// Re-sync stored playlists from the source they were last synced from
    Refresh {
        /// Only refresh playlists last synced at least this many hours ago
        #[arg(long, value_name = "HOURS")]
        stale_hours: Option<u64>,
    },

    /// Remove a playlist and any media no other playlist uses
    Remove {
        /// Playlist id (as shown by `list`)
        #[arg(value_name = "PLAYLIST_ID")]
        playlist_id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List playlists in display order
    List,

    /// List the items of a playlist in playback order
    Items {
        #[arg(value_name = "PLAYLIST_ID")]
        playlist_id: String,
    },

    /// Swap the display positions of two playlists
    Swap {
        #[arg(value_name = "PLAYLIST_ID")]
        first: String,

        #[arg(value_name = "PLAYLIST_ID")]
        second: String,
    },

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sync_takes_several_references() {
        let cli = Cli::parse_from(["mossync", "sync", "PLabc", "./mix.m3u"]);
        match cli.command {
            Some(Commands::Sync { references }) => assert_eq!(references, ["PLabc", "./mix.m3u"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_sync_requires_a_reference() {
        assert!(Cli::try_parse_from(["mossync", "sync"]).is_err());
    }

    #[test]
    fn test_config_init_flag() {
        let cli = Cli::parse_from(["mossync", "config", "--init", "--data-dir", "/srv/moss"]);
        assert!(matches!(cli.command, Some(Commands::Config { init: true })));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/srv/moss")));

        let cli = Cli::parse_from(["mossync", "config"]);
        assert!(matches!(cli.command, Some(Commands::Config { init: false })));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["mossync", "list", "--verbose", "--data-dir", "/srv/moss"]);
        assert!(cli.verbose);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/srv/moss")));
    }
}
