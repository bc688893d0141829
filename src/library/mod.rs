//! Local library: configuration, on-disk layout and the persistent store

pub mod config;
pub mod layout;
pub mod models;
pub mod store;

pub use config::LibraryConfig;
pub use layout::MediaLayout;
pub use models::{MediaItem, Playlist, PlaylistItem, SourceKind};
pub use store::{Store, SweepReport};
