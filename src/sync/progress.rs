//! Progress notification for running syncs

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
#[cfg(test)]
use tokio::sync::mpsc;

/// Receives per-playlist completion fractions in `[0.0, 1.0]`
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, playlist_id: &str, fraction: f64);
}

/// Discards every notification
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _playlist_id: &str, _fraction: f64) {}
}

/// A single progress notification
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub playlist_id: String,
    pub fraction: f64,
}

/// Forwards notifications over an unbounded channel
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

#[cfg(test)]
impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[cfg(test)]
impl ProgressSink for ChannelProgress {
    fn on_progress(&self, playlist_id: &str, fraction: f64) {
        // A dropped receiver just means nobody is listening any more
        let _ = self.tx.send(ProgressEvent {
            playlist_id: playlist_id.to_string(),
            fraction,
        });
    }
}

const BAR_LENGTH: u64 = 100;

/// Terminal progress: one bar per playlist under a shared `MultiProgress`
pub struct ConsoleProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn new_bar(&self, playlist_id: &str) -> ProgressBar {
        let bar = self.multi.add(ProgressBar::new(BAR_LENGTH));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
                .expect("valid progress template")
                .progress_chars("#>-"),
        );
        bar.set_message(playlist_id.to_string());
        bar
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_progress(&self, playlist_id: &str, fraction: f64) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };

        let bar = bars
            .entry(playlist_id.to_string())
            .or_insert_with(|| self.new_bar(playlist_id));

        let position = (fraction.clamp(0.0, 1.0) * BAR_LENGTH as f64).round() as u64;
        bar.set_position(position);

        if position >= BAR_LENGTH {
            bar.finish_with_message(format!("{} acquired", playlist_id));
            bars.remove(playlist_id);
        }
    }
}
