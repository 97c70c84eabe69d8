// src/progress.rs

//! Progress reporting for index updates and artifact downloads
//!
//! Progress is advisory. Nothing in the updater or downloader depends on a
//! tracker observing an event, so every implementation may drop updates.
//!
//! # Implementations
//!
//! - [`SilentProgress`]: no output, counters only (tests, scripted use)
//! - [`LogProgress`]: periodic `tracing` lines for non-interactive runs
//! - [`CallbackProgress`]: forwards [`ProgressEvent`]s to a closure
//! - [`CliProgress`]: `indicatif` bar for interactive terminals

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

/// Sink for update and download progress
pub trait UpdateProgress: Send + Sync {
    /// Describe the current step
    fn set_message(&self, message: &str);

    /// Bytes of the current transfer received so far
    fn bytes_read(&self, read: u64, total: Option<u64>);

    /// Index records applied so far in the current update
    fn entries_processed(&self, count: u64);

    /// Mark the operation finished
    fn finish_with_message(&self, message: &str);
}

/// No-op tracker that still records counters
#[derive(Debug, Default)]
pub struct SilentProgress {
    bytes: AtomicU64,
    entries: AtomicU64,
    finished: AtomicBool,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn entries(&self) -> u64 {
        self.entries.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

impl UpdateProgress for SilentProgress {
    fn set_message(&self, _message: &str) {}

    fn bytes_read(&self, read: u64, _total: Option<u64>) {
        self.bytes.store(read, Ordering::Relaxed);
    }

    fn entries_processed(&self, count: u64) {
        self.entries.store(count, Ordering::Relaxed);
    }

    fn finish_with_message(&self, _message: &str) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

/// Logging progress tracker
///
/// Logs at info level, rate limited so large transfers produce a handful of
/// lines rather than one per chunk.
#[derive(Debug)]
pub struct LogProgress {
    name: String,
    /// Last reported tenth of the transfer (or MiB bucket when unsized)
    last_bucket: AtomicU64,
    /// Log every N records
    entry_interval: u64,
}

impl LogProgress {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_bucket: AtomicU64::new(0),
            entry_interval: 1000,
        }
    }

    /// Set the record logging interval
    pub fn with_entry_interval(mut self, interval: u64) -> Self {
        self.entry_interval = interval.max(1);
        self
    }
}

impl UpdateProgress for LogProgress {
    fn set_message(&self, message: &str) {
        self.last_bucket.store(0, Ordering::Relaxed);
        info!("{}: {}", self.name, message);
    }

    fn bytes_read(&self, read: u64, total: Option<u64>) {
        let bucket = match total {
            Some(total) if total > 0 => (read * 10) / total,
            _ => read / (1024 * 1024),
        };
        let previous = self.last_bucket.swap(bucket, Ordering::Relaxed);
        if bucket > previous {
            match total {
                Some(total) if total > 0 => {
                    info!("{}: {}% ({}/{})", self.name, bucket * 10, read, total)
                }
                _ => info!("{}: {} bytes", self.name, read),
            }
        }
    }

    fn entries_processed(&self, count: u64) {
        if count > 0 && count % self.entry_interval == 0 {
            info!("{}: {} records", self.name, count);
        }
    }

    fn finish_with_message(&self, message: &str) {
        info!("{}: {}", self.name, message);
    }
}

/// Events emitted by [`CallbackProgress`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Message(String),
    Bytes { read: u64, total: Option<u64> },
    Entries(u64),
    Finished(String),
}

/// Callback-based progress tracker
///
/// Useful for embedding the updater in a larger application.
pub struct CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> UpdateProgress for CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn set_message(&self, message: &str) {
        (self.callback)(ProgressEvent::Message(message.to_string()));
    }

    fn bytes_read(&self, read: u64, total: Option<u64>) {
        (self.callback)(ProgressEvent::Bytes { read, total });
    }

    fn entries_processed(&self, count: u64) {
        (self.callback)(ProgressEvent::Entries(count));
    }

    fn finish_with_message(&self, message: &str) {
        (self.callback)(ProgressEvent::Finished(message.to_string()));
    }
}

/// Terminal progress bar
pub struct CliProgress {
    bar: ProgressBar,
    /// Whether the bar currently shows a byte count
    sized: Mutex<Option<u64>>,
}

impl CliProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        Self {
            bar,
            sized: Mutex::new(None),
        }
    }
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg} {pos}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bytes_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

impl UpdateProgress for CliProgress {
    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn bytes_read(&self, read: u64, total: Option<u64>) {
        if let Ok(mut sized) = self.sized.lock() {
            if *sized != total {
                match total {
                    Some(len) => {
                        self.bar.set_style(bytes_style());
                        self.bar.set_length(len);
                    }
                    None => self.bar.set_style(spinner_style()),
                }
                *sized = total;
            }
        }
        self.bar.set_position(read);
    }

    fn entries_processed(&self, count: u64) {
        if let Ok(mut sized) = self.sized.lock() {
            if sized.take().is_some() {
                self.bar.set_style(spinner_style());
            }
        }
        self.bar.set_position(count);
    }

    fn finish_with_message(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
