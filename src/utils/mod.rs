//! Utility functions

mod m3u;

pub use m3u::{normalize_path, parse_manifest};
