//! Broadcast coordinator for loopcast.
//!
//! This crate turns a polled [`StreamConfig`](loopcast_ipc::StreamConfig)
//! into a running broadcast: it resolves the playlist against the media
//! directory, keeps one master encoder alive and sequences feeders into it,
//! hot-reloads playlist edits and restarts the master when a setting baked
//! into its command line changes.

mod error;
mod metrics;
mod orchestrator;
mod playhead;
mod poller;
mod resolver;
mod state;
mod status;

pub use error::{EngineError, EngineResult, Unresolvable};
pub use metrics::MetricsCollector;
pub use orchestrator::Engine;
pub use playhead::{Adoption, Playhead};
pub use poller::{ConfigDelta, ConfigPoller, PollUpdate};
pub use resolver::{PlaylistResolver, ResolvedEntry, Validated};
pub use status::StatusHandle;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use serde::Deserialize;

use loopcast_ffmpeg::MediaLauncher;
use loopcast_ipc::{EngineCommand, EngineEvent};
use loopcast_store::ConfigStore;

/// Timing and filesystem settings for the coordinator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Interval between config store polls.
    pub poll_interval_ms: u64,

    /// Delay before advancing past a failed feeder.
    pub feeder_retry_backoff_ms: u64,

    /// Delay between stopping and restarting after a critical change.
    pub restart_settle_ms: u64,

    /// Retry interval while the playlist has nothing playable.
    pub empty_playlist_retry_ms: u64,

    /// How long a stop waits for processes to report their exit.
    pub shutdown_grace_ms: u64,

    /// Managed directory of pre-normalized videos.
    pub video_dir: PathBuf,

    /// Directory holding background audio tracks.
    pub audio_dir: PathBuf,

    /// URL path prefix under which videos are published.
    pub url_prefix: String,

    /// Resume checkpoint location.
    pub checkpoint_path: PathBuf,

    /// Write the cleaned playlist back when entries with missing files are dropped.
    pub write_back_cleanup: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            feeder_retry_backoff_ms: 1_000,
            restart_settle_ms: 2_000,
            empty_playlist_retry_ms: 5_000,
            shutdown_grace_ms: 5_000,
            video_dir: PathBuf::from("videos"),
            audio_dir: PathBuf::from("audio"),
            url_prefix: "/videos/".to_string(),
            checkpoint_path: PathBuf::from("data/resume.json"),
            write_back_cleanup: true,
        }
    }
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn feeder_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.feeder_retry_backoff_ms)
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_millis(self.restart_settle_ms)
    }

    pub fn empty_playlist_retry(&self) -> Duration {
        Duration::from_millis(self.empty_playlist_retry_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Create an engine instance with IPC channels.
pub fn create_engine(
    settings: EngineSettings,
    store: Arc<dyn ConfigStore>,
    launcher: Box<dyn MediaLauncher>,
    command_rx: Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
) -> Engine {
    Engine::new(settings, store, launcher, command_rx, event_tx)
}
