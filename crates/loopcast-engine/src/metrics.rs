//! Playout counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

use loopcast_ipc::PlayoutMetrics;

/// Counts what the coordinator did since the process started.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    session_start: RwLock<Option<Instant>>,
    entries_started: AtomicU64,
    entries_completed: AtomicU64,
    feeder_failures: AtomicU64,
    skips: AtomicU64,
    master_failures: AtomicU64,
    playlist_reloads: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a session as live.
    pub fn start(&self) {
        *self.session_start.write() = Some(Instant::now());
    }

    /// Mark the session as gone.
    pub fn stop(&self) {
        *self.session_start.write() = None;
    }

    pub fn record_entry_started(&self) {
        self.entries_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entry_completed(&self) {
        self.entries_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_feeder_failure(&self) {
        self.feeder_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skip(&self) {
        self.skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_master_failure(&self) {
        self.master_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload(&self) {
        self.playlist_reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PlayoutMetrics {
        let uptime_seconds = self
            .session_start
            .read()
            .map(|start| start.elapsed().as_secs())
            .unwrap_or(0);

        PlayoutMetrics {
            entries_started: self.entries_started.load(Ordering::Relaxed),
            entries_completed: self.entries_completed.load(Ordering::Relaxed),
            feeder_failures: self.feeder_failures.load(Ordering::Relaxed),
            skips: self.skips.load(Ordering::Relaxed),
            master_failures: self.master_failures.load(Ordering::Relaxed),
            playlist_reloads: self.playlist_reloads.load(Ordering::Relaxed),
            uptime_seconds,
        }
    }
}
