//! Data model and typed control<->engine messages for loopcast.
//!
//! This crate defines the polled stream configuration, playlist entries and
//! every message exchanged between the broadcast engine and whatever control
//! surface sits in front of it (operator console, admin API).

mod commands;
mod events;
mod playlist;
mod state;
mod types;

pub use commands::{ControlError, EngineCommand, SkipDirection};
pub use events::EngineEvent;
pub use playlist::{EntrySource, PlaylistEntry};
pub use state::{EngineState, ShutdownPhase, StartupPhase, StopReason};
pub use types::{
    redact_key, AudioOverlay, BroadcastStatus, CriticalSettings, EntrySummary, PlayoutMetrics,
    RtmpEndpoint, StreamConfig, DEFAULT_VIDEO_BITRATE_KBPS,
};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for commands (control surface → engine).
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for events (engine → control surface).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded command channel.
pub fn command_channel() -> (Sender<EngineCommand>, Receiver<EngineCommand>) {
    crossbeam_channel::bounded(COMMAND_CHANNEL_CAPACITY)
}

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<EngineEvent>, Receiver<EngineEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
