//! Periodic config store polling.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use loopcast_ipc::StreamConfig;
use loopcast_store::ConfigStore;

use crate::error::{EngineError, EngineResult};

/// One successful fetch.
#[derive(Debug, Clone)]
pub struct PollUpdate {
    /// Record from the previous successful fetch.
    pub previous: Option<StreamConfig>,

    /// Record just fetched; `None` means there is none.
    pub current: Option<StreamConfig>,
}

/// What changed between the config a session runs with and a newer one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDelta {
    /// Master settings that changed; non-empty forces a restart.
    pub critical: Vec<String>,

    /// The playlist can be hot-reloaded.
    pub playlist_changed: bool,
}

impl ConfigDelta {
    pub fn between(applied: &StreamConfig, current: &StreamConfig) -> Self {
        Self {
            critical: applied
                .critical_settings()
                .changed_fields(&current.critical_settings()),
            playlist_changed: applied.playlist != current.playlist,
        }
    }

    pub fn requires_restart(&self) -> bool {
        !self.critical.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.critical.is_empty() && !self.playlist_changed
    }
}

/// Background thread fetching the config record on a fixed interval.
///
/// Fetch failures are logged and swallowed: the engine keeps acting on the
/// last record it saw.
pub struct ConfigPoller {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ConfigPoller {
    /// Fetch immediately, then every `interval`, sending each result on `updates`.
    pub fn spawn(
        store: Arc<dyn ConfigStore>,
        interval: Duration,
        updates: Sender<PollUpdate>,
    ) -> EngineResult<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let thread = thread::Builder::new()
            .name("loopcast-poller".into())
            .spawn(move || poll_loop(store, interval, updates, stop_rx))
            .map_err(|source| EngineError::Thread {
                name: "poller",
                source,
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Stop polling and wait for the thread. A fetch in flight finishes first.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ConfigPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop(
    store: Arc<dyn ConfigStore>,
    interval: Duration,
    updates: Sender<PollUpdate>,
    stop_rx: Receiver<()>,
) {
    let location = store.describe();
    info!(store = %location, interval_ms = interval.as_millis() as u64, "Config poller started");

    let mut previous: Option<StreamConfig> = None;
    let mut failures: u32 = 0;

    loop {
        match store.fetch() {
            Ok(current) => {
                if failures > 0 {
                    info!(failures, "Config store reachable again");
                    failures = 0;
                }
                if current != previous {
                    debug!(
                        updated_at = ?current.as_ref().and_then(|c| c.updated_at),
                        "Config record changed"
                    );
                }
                let update = PollUpdate {
                    previous: previous.take(),
                    current: current.clone(),
                };
                if updates.send(update).is_err() {
                    break;
                }
                previous = current;
            }
            Err(e) => {
                failures += 1;
                warn!(store = %location, failures, "Config fetch failed, keeping last known state: {}", e);
            }
        }

        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("Config poller stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use loopcast_ipc::{PlaylistEntry, StreamConfig};
    use loopcast_store::{MemoryConfigStore, StoreError, StoreResult};

    use super::*;

    /// Fails every other fetch.
    struct Flaky {
        inner: MemoryConfigStore,
        calls: AtomicUsize,
    }

    impl ConfigStore for Flaky {
        fn fetch(&self) -> StoreResult<Option<StreamConfig>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                return Err(StoreError::Status {
                    status: 503,
                    url: "test".into(),
                });
            }
            self.inner.fetch()
        }

        fn patch_playlist(&self, playlist: &[PlaylistEntry]) -> StoreResult<()> {
            self.inner.patch_playlist(playlist)
        }

        fn describe(&self) -> String {
            "flaky".into()
        }
    }

    #[test]
    fn test_delta_classification() {
        let applied = StreamConfig::default();

        let mut edited = applied.clone();
        edited.playlist.push(PlaylistEntry::file("a.mp4"));
        let delta = ConfigDelta::between(&applied, &edited);
        assert!(delta.playlist_changed);
        assert!(!delta.requires_restart());

        edited.rtmp_endpoint.key = "new".into();
        let delta = ConfigDelta::between(&applied, &edited);
        assert_eq!(delta.critical, vec!["stream key"]);

        assert!(ConfigDelta::between(&applied, &applied).is_empty());
    }

    #[test]
    fn test_failures_send_nothing() {
        let store = Arc::new(Flaky {
            inner: MemoryConfigStore::new(Some(StreamConfig::default())),
            calls: AtomicUsize::new(0),
        });
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut poller = ConfigPoller::spawn(store.clone(), Duration::from_millis(10), tx).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(first.previous.is_none());
        assert!(first.current.is_some());

        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(second.previous, first.current);

        poller.stop();
        assert!(store.calls.load(Ordering::SeqCst) >= 3);
    }
}
