//! Resume checkpoint: the last entry that began playing.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{write_atomic, StoreError, StoreResult};

/// One record, overwritten in place on every entry start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub last_played_entry_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// Checkpoint for `entry_id`, stamped now.
    pub fn now(entry_id: impl Into<String>) -> Self {
        Self {
            last_played_entry_id: entry_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// JSON file holding the [`Checkpoint`].
#[derive(Debug, Clone)]
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the checkpoint; `Ok(None)` if none was ever written.
    pub fn load(&self) -> StoreResult<Option<Checkpoint>> {
        match fs::read_to_string(&self.path) {
            Ok(body) if body.trim().is_empty() => Ok(None),
            Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::io(&self.path, source)),
        }
    }

    /// Overwrite the checkpoint.
    pub fn save(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        let bytes = serde_json::to_vec(checkpoint)?;
        write_atomic(&self.path, &bytes)
    }
}
