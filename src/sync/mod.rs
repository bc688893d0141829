//! Sync engine module

pub mod downloader;
pub mod engine;
pub mod pipeline;
pub mod progress;

#[cfg(test)]
mod testing;

pub use downloader::YtDlpDownloader;
pub use engine::{PlaylistChange, SyncEngine, SyncReport};
pub use pipeline::PipelineConfig;
pub use progress::{ConsoleProgress, NoProgress, ProgressSink};
