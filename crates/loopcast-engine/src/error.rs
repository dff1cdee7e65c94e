//! Engine error types.

use thiserror::Error;

use loopcast_ffmpeg::FfmpegError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Reasons a session could not be brought up.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no playable entries ({removed} dropped during validation)")]
    NoPlayableEntries { removed: usize },

    #[error(transparent)]
    Ffmpeg(#[from] FfmpegError),

    #[error("failed to spawn {name} thread: {source}")]
    Thread {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Why an entry could not be mapped to a local file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unresolvable {
    #[error("entry has no file, url or path")]
    NoSource,

    #[error("url cannot be parsed: {0}")]
    BadUrl(String),

    #[error("reference escapes the video directory: {0}")]
    Traversal(String),

    #[error("file not found: {0}")]
    Missing(String),
}
