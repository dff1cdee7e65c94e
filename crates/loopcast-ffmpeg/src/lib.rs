//! Feeder and master ffmpeg process management.
//!
//! A broadcast is one long-lived *master* ffmpeg that reads MPEG-TS on stdin,
//! re-encodes it with continuous timestamps and publishes to RTMP, plus a
//! succession of short-lived *feeders*, each stream-copying one file into the
//! master's stdin at native rate.
//!
//! Every spawned process is watched by a supervisor task that drains its
//! stderr and reports exactly one [`ProcessEvent`] when it goes away.

mod args;
mod error;
mod feeder;
mod launcher;
mod master;
mod process;

pub use args::{feeder_args, master_args, redact_args};
pub use error::FfmpegError;
pub use launcher::FfmpegLauncher;
pub use master::MasterInput;
pub use process::{
    ExitOutcome, ProcessEvent, ProcessHandle, ProcessId, ProcessRole, ProcessStatus,
};

use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;
use serde::Deserialize;
use url::Url;

use loopcast_ipc::{RtmpEndpoint, StreamConfig};

/// Result type for process operations.
pub type FfmpegResult<T> = Result<T, FfmpegError>;

/// Number of stderr lines kept per process for failure reports.
pub const STDERR_TAIL_LINES: usize = 32;

/// Encoder and binary settings shared by every session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FfmpegSettings {
    /// ffmpeg executable.
    pub binary: PathBuf,

    /// Value passed to `-loglevel`.
    pub log_level: String,

    /// x264 preset.
    pub preset: String,

    /// Output frame rate.
    pub fps: u32,

    /// Keyframe interval in seconds.
    pub keyframe_interval_secs: u32,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,

    /// Audio sample rate in Hz.
    pub audio_sample_rate: u32,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            log_level: "warning".to_string(),
            preset: "veryfast".to_string(),
            fps: 30,
            keyframe_interval_secs: 2,
            audio_bitrate_kbps: 128,
            audio_sample_rate: 44_100,
        }
    }
}

/// Background audio input for the master.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayInput {
    /// Audio file looped for the life of the master.
    pub path: PathBuf,

    /// Mix weight in `[0.0, 1.0]`.
    pub weight: f32,
}

/// Per-session master configuration.
///
/// Can only be built through [`MasterConfig::new`], which refuses an
/// incomplete or malformed endpoint, so no master is ever spawned without one.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterConfig {
    endpoint: RtmpEndpoint,
    video_bitrate_kbps: u32,
    overlay: Option<OverlayInput>,
}

impl MasterConfig {
    /// Validate the endpoint and capture the settings baked into the master.
    pub fn new(config: &StreamConfig, overlay: Option<OverlayInput>) -> FfmpegResult<Self> {
        let endpoint = &config.rtmp_endpoint;
        if endpoint.base_url.trim().is_empty() {
            return Err(FfmpegError::MissingEndpoint("RTMP URL"));
        }
        if endpoint.key.trim().is_empty() {
            return Err(FfmpegError::MissingEndpoint("stream key"));
        }

        let base = endpoint.base_url.trim();
        let parsed = Url::parse(base).map_err(|e| FfmpegError::InvalidUrl(format!("{base}: {e}")))?;
        if parsed.scheme() != "rtmp" && parsed.scheme() != "rtmps" {
            return Err(FfmpegError::InvalidUrl(
                "URL must start with rtmp:// or rtmps://".to_string(),
            ));
        }

        Ok(Self {
            endpoint: endpoint.clone(),
            video_bitrate_kbps: config.video_bitrate_kbps.max(1),
            overlay,
        })
    }

    /// Publish target.
    pub fn endpoint(&self) -> &RtmpEndpoint {
        &self.endpoint
    }

    /// Target video bitrate.
    pub fn video_bitrate_kbps(&self) -> u32 {
        self.video_bitrate_kbps
    }

    /// Background audio, if mixed in.
    pub fn overlay(&self) -> Option<&OverlayInput> {
        self.overlay.as_ref()
    }
}

/// What a feeder should play.
#[derive(Debug, Clone, PartialEq)]
pub struct FeederConfig {
    /// Pre-normalized media file.
    pub path: PathBuf,

    /// Label used in logs.
    pub label: String,
}

impl FeederConfig {
    /// Feeder for `path`, labelled with `label`.
    pub fn new(path: impl AsRef<Path>, label: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            label: label.into(),
        }
    }
}

/// A running master.
#[derive(Debug)]
pub struct MasterHandle {
    /// Lifecycle handle.
    pub process: ProcessHandle,

    /// Write side of the master's stdin, shared with feeders.
    pub input: Option<MasterInput>,
}

/// A running feeder.
#[derive(Debug)]
pub struct FeederHandle {
    /// Lifecycle handle.
    pub process: ProcessHandle,

    /// File being fed.
    pub path: PathBuf,
}

/// Seam between the coordinator and the processes it sequences.
///
/// Implementations must report every process they start exactly once on
/// `events`, including processes killed through their handle.
pub trait MediaLauncher: Send {
    /// Spawn the master for a new session.
    fn start_master(
        &self,
        config: &MasterConfig,
        events: Sender<ProcessEvent>,
    ) -> FfmpegResult<MasterHandle>;

    /// Spawn a feeder writing into `master`'s input.
    fn start_feeder(
        &self,
        config: &FeederConfig,
        master: &MasterHandle,
        events: Sender<ProcessEvent>,
    ) -> FfmpegResult<FeederHandle>;

    /// Launcher name for diagnostics.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, key: &str) -> StreamConfig {
        let mut config = StreamConfig::default();
        config.rtmp_endpoint = RtmpEndpoint {
            base_url: url.to_string(),
            key: key.to_string(),
        };
        config
    }

    #[test]
    fn test_master_config_requires_endpoint() {
        assert!(matches!(
            MasterConfig::new(&config("", "key"), None),
            Err(FfmpegError::MissingEndpoint("RTMP URL"))
        ));
        assert!(matches!(
            MasterConfig::new(&config("rtmp://host/app", " "), None),
            Err(FfmpegError::MissingEndpoint("stream key"))
        ));
    }

    #[test]
    fn test_master_config_rejects_non_rtmp() {
        assert!(matches!(
            MasterConfig::new(&config("http://host/app", "key"), None),
            Err(FfmpegError::InvalidUrl(_))
        ));
        assert!(MasterConfig::new(&config("rtmps://host:443/app", "key"), None).is_ok());
    }
}
