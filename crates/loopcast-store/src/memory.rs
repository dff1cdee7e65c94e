//! In-process config store.

use std::sync::Arc;

use parking_lot::RwLock;

use loopcast_ipc::{PlaylistEntry, StreamConfig};

use crate::{ConfigStore, StoreResult};

/// A shared record; clones see the same state. Useful when the engine is
/// embedded in a process that owns the configuration itself.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    record: Arc<RwLock<Option<StreamConfig>>>,
}

impl MemoryConfigStore {
    pub fn new(config: Option<StreamConfig>) -> Self {
        Self {
            record: Arc::new(RwLock::new(config)),
        }
    }

    /// Replace the record.
    pub fn set(&self, config: Option<StreamConfig>) {
        *self.record.write() = config;
    }

    /// Mutate the record in place, if there is one.
    pub fn update(&self, f: impl FnOnce(&mut StreamConfig)) {
        if let Some(config) = self.record.write().as_mut() {
            f(config);
        }
    }

    /// Current record.
    pub fn get(&self) -> Option<StreamConfig> {
        self.record.read().clone()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn fetch(&self) -> StoreResult<Option<StreamConfig>> {
        Ok(self.get())
    }

    fn patch_playlist(&self, playlist: &[PlaylistEntry]) -> StoreResult<()> {
        self.update(|config| config.playlist = playlist.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let store = MemoryConfigStore::new(Some(StreamConfig::default()));
        let view = store.clone();

        store.update(|c| c.is_active = true);
        assert!(view.fetch().unwrap().unwrap().is_active);

        view.patch_playlist(&[PlaylistEntry::file("a.mp4")]).unwrap();
        assert_eq!(store.get().unwrap().playlist.len(), 1);

        store.set(None);
        assert!(view.fetch().unwrap().is_none());
    }
}
