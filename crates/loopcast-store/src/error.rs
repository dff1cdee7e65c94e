//! Error types for the store module.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while talking to the config store or the checkpoint.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record is not valid JSON for the expected shape.
    #[error("Malformed record: {0}")]
    Parse(#[from] serde_json::Error),

    /// Transport-level HTTP failure (connect, timeout, body).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with an unexpected status.
    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
