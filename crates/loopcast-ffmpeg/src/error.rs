//! Error types for the process managers.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while starting or driving ffmpeg.
#[derive(Debug, Error)]
pub enum FfmpegError {
    /// Endpoint URL or key absent.
    #[error("RTMP endpoint incomplete: missing {0}")]
    MissingEndpoint(&'static str),

    /// Invalid RTMP URL.
    #[error("Invalid RTMP URL: {0}")]
    InvalidUrl(String),

    /// Input file vanished before the feeder could open it.
    #[error("Input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// The OS refused to start the process.
    #[error("Failed to spawn {}: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A requested stdio pipe was not set up.
    #[error("Missing {0} pipe")]
    MissingPipe(&'static str),

    /// Feeder requested without a master input to write to.
    #[error("Master input not available")]
    MasterNotRunning,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
