//! Shared view of the broadcast status.

use std::sync::Arc;

use parking_lot::RwLock;

use loopcast_ipc::BroadcastStatus;

/// Cheap to clone; readers see whatever the engine last published.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<BroadcastStatus>>,
}

impl StatusHandle {
    pub fn get(&self) -> BroadcastStatus {
        self.inner.read().clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.read().is_streaming
    }

    pub(crate) fn publish(&self, status: BroadcastStatus) {
        *self.inner.write() = status;
    }
}
