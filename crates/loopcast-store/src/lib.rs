//! Config store clients and the resume checkpoint.
//!
//! The engine never receives pushes: it polls a [`ConfigStore`] for the one
//! current [`StreamConfig`] record. A missing record is a valid
//! "nothing to stream" answer, not an error.

mod checkpoint;
mod error;
mod file;
mod http;
mod memory;

pub use checkpoint::{Checkpoint, CheckpointFile};
pub use error::StoreError;
pub use file::FileConfigStore;
pub use http::HttpConfigStore;
pub use memory::MemoryConfigStore;

use std::fs;
use std::io::Write;
use std::path::Path;

use loopcast_ipc::{PlaylistEntry, StreamConfig};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Source of the desired broadcast state.
pub trait ConfigStore: Send + Sync {
    /// Fetch the current record; `Ok(None)` when there is none.
    fn fetch(&self) -> StoreResult<Option<StreamConfig>>;

    /// Replace the stored playlist. Best-effort cleanup after validation
    /// dropped entries whose files are gone.
    fn patch_playlist(&self, playlist: &[PlaylistEntry]) -> StoreResult<()>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Write `bytes` to a sibling temp file and rename it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StoreError::io(parent, source))?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp).map_err(|source| StoreError::io(&tmp, source))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|source| StoreError::io(&tmp, source))?;
    fs::rename(&tmp, path).map_err(|source| StoreError::io(path, source))?;
    Ok(())
}

/// Parse a record body; empty bodies and JSON `null` mean "no record".
pub(crate) fn parse_record(body: &str) -> StoreResult<Option<StreamConfig>> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(None);
    }
    Ok(serde_json::from_str::<Option<StreamConfig>>(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_absent() {
        assert!(parse_record("").unwrap().is_none());
        assert!(parse_record(" null ").unwrap().is_none());
    }

    #[test]
    fn test_parse_record_present() {
        let config = parse_record(r#"{"isActive": true, "playlist": []}"#)
            .unwrap()
            .unwrap();
        assert!(config.is_active);
    }

    #[test]
    fn test_write_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");
        write_atomic(&path, b"{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert!(!dir.path().join("nested/state.json.tmp").exists());
    }
}
