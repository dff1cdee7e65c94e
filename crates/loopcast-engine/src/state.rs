//! Resources owned by a live session.

use std::time::Instant;

use crossbeam_channel::Receiver;

use loopcast_ffmpeg::{FeederHandle, MasterHandle};
use loopcast_ipc::StreamConfig;

use crate::playhead::Playhead;

/// What occupies the feeder position of a session.
#[derive(Debug)]
pub(crate) enum FeederSlot {
    /// No feeder and nothing scheduled.
    Vacant,

    /// A feeder is writing into the master.
    Playing(FeederHandle),

    /// A feeder failed; advance when the timer fires.
    Backoff(Receiver<Instant>),

    /// Nothing is playable; retry the current index when the timer fires.
    AwaitingEntries(Receiver<Instant>),
}

impl FeederSlot {
    /// Timer the coordinator should wait on, if any.
    pub(crate) fn timer(&self) -> Option<&Receiver<Instant>> {
        match self {
            Self::Backoff(due) | Self::AwaitingEntries(due) => Some(due),
            Self::Vacant | Self::Playing(_) => None,
        }
    }

    pub(crate) fn playing(&self) -> Option<&FeederHandle> {
        match self {
            Self::Playing(handle) => Some(handle),
            _ => None,
        }
    }
}

/// One master lifetime.
#[derive(Debug)]
pub(crate) struct Session {
    pub master: MasterHandle,
    pub feeder: FeederSlot,
    pub playhead: Playhead,

    /// Config the master was started with; playlist updated on hot-reload.
    pub applied: StreamConfig,
}

impl Session {
    pub(crate) fn new(master: MasterHandle, playhead: Playhead, applied: StreamConfig) -> Self {
        Self {
            master,
            feeder: FeederSlot::Vacant,
            playhead,
            applied,
        }
    }
}
