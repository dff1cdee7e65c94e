//! Events sent from the engine to the control surface.

use serde::{Deserialize, Serialize};

use crate::state::EngineState;
use crate::types::{BroadcastStatus, EntrySummary, PlayoutMetrics};

/// Events that the engine can send to the control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Engine state has changed.
    StateChanged {
        /// Previous state.
        previous: Box<EngineState>,

        /// Current state.
        current: Box<EngineState>,
    },

    /// A feeder started playing an entry.
    NowPlaying {
        /// Position in the playlist snapshot.
        index: usize,

        /// The entry being fed.
        entry: EntrySummary,
    },

    /// A new playlist snapshot was adopted without restarting the master.
    PlaylistReloaded {
        /// Entries in the adopted snapshot.
        total: usize,

        /// Entries dropped during validation.
        removed: usize,

        /// Playhead after pointer correction.
        index: usize,
    },

    /// Answer to [`EngineCommand::GetStatus`](crate::EngineCommand::GetStatus).
    Status(BroadcastStatus),

    /// Periodic playout counters.
    Metrics(PlayoutMetrics),

    /// Error occurred.
    Error {
        /// Whether the engine keeps running (always true unless shutting down).
        recoverable: bool,

        /// Error message.
        message: String,
    },

    /// Engine is ready.
    Ready,

    /// Engine has shut down.
    Shutdown,
}
