//! JSON file config store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use loopcast_ipc::{PlaylistEntry, StreamConfig};

use crate::{parse_record, write_atomic, ConfigStore, StoreError, StoreResult};

/// Reads the record from a JSON file that an admin tool edits in place.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> StoreResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::io(&self.path, source)),
        }
    }
}

impl ConfigStore for FileConfigStore {
    fn fetch(&self) -> StoreResult<Option<StreamConfig>> {
        match self.read()? {
            Some(body) => parse_record(&body),
            None => Ok(None),
        }
    }

    fn patch_playlist(&self, playlist: &[PlaylistEntry]) -> StoreResult<()> {
        // Only the playlist is replaced; fields this crate does not model survive.
        let mut document = match self.read()? {
            Some(body) if !body.trim().is_empty() => match serde_json::from_str(&body)? {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            _ => Map::new(),
        };
        document.insert("playlist".to_string(), serde_json::to_value(playlist)?);

        let bytes = serde_json::to_vec_pretty(&Value::Object(document))?;
        write_atomic(&self.path, &bytes)?;
        debug!(path = %self.path.display(), entries = playlist.len(), "Playlist written back");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
