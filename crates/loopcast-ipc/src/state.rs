//! Engine state machine types.

use serde::{Deserialize, Serialize};

/// The current state of the broadcast engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum EngineState {
    /// Engine is idle, not streaming.
    #[default]
    Idle,

    /// Engine is bringing up a broadcast session.
    Starting {
        /// Current startup phase.
        phase: StartupPhase,
    },

    /// Master is live and feeders are being sequenced.
    Streaming {
        /// Redacted publish URL.
        endpoint: String,

        /// Entries in the playlist snapshot when the session started.
        total_entries: usize,
    },

    /// Engine is tearing the session down.
    Stopping {
        /// Reason for stopping.
        reason: StopReason,

        /// Current shutdown phase.
        phase: ShutdownPhase,
    },
}

impl EngineState {
    /// Returns true if the engine is in the Idle state.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if the engine is currently streaming.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    /// Returns true if the engine is starting.
    pub fn is_starting(&self) -> bool {
        matches!(self, Self::Starting { .. })
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting { .. } => "Starting",
            Self::Streaming { .. } => "Streaming",
            Self::Stopping { .. } => "Stopping",
        }
    }
}

/// Startup phases for a broadcast session, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartupPhase {
    /// Resolving and validating the playlist.
    ResolvePlaylist,

    /// Reading the resume checkpoint.
    RecoverCheckpoint,

    /// Spawning the master encoder.
    SpawnMaster,

    /// Spawning the first feeder.
    SpawnFeeder,
}

impl StartupPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::ResolvePlaylist => Some(Self::RecoverCheckpoint),
            Self::RecoverCheckpoint => Some(Self::SpawnMaster),
            Self::SpawnMaster => Some(Self::SpawnFeeder),
            Self::SpawnFeeder => None,
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::ResolvePlaylist => "Resolving playlist",
            Self::RecoverCheckpoint => "Recovering resume point",
            Self::SpawnMaster => "Starting master encoder",
            Self::SpawnFeeder => "Starting first feeder",
        }
    }
}

/// Shutdown phases for a broadcast session, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownPhase {
    /// Killing the feeder.
    StopFeeder,

    /// Killing the master.
    StopMaster,
}

impl ShutdownPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::StopFeeder => Some(Self::StopMaster),
            Self::StopMaster => None,
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::StopFeeder => "Stopping feeder",
            Self::StopMaster => "Stopping master encoder",
        }
    }
}

/// Reason for stopping the broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StopReason {
    /// The polled configuration says `isActive = false` (or has no record).
    Deactivated,

    /// A field baked into the master's command line changed.
    CriticalChange { fields: Vec<String> },

    /// The master process exited on its own.
    MasterExited { message: String },

    /// The engine is shutting down.
    Shutdown,
}

impl StopReason {
    /// Returns a display message for this reason.
    pub fn message(&self) -> String {
        match self {
            Self::Deactivated => "Broadcast deactivated".to_string(),
            Self::CriticalChange { fields } => {
                format!("Restart required, changed: {}", fields.join(", "))
            }
            Self::MasterExited { message } => format!("Master exited: {message}"),
            Self::Shutdown => "Engine shutting down".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_phase_order() {
        let mut phase = StartupPhase::ResolvePlaylist;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            seen.push(next);
            phase = next;
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(seen.last(), Some(&StartupPhase::SpawnFeeder));
    }

    #[test]
    fn test_stop_reason_message() {
        let reason = StopReason::CriticalChange {
            fields: vec!["bitrate".into(), "audio overlay".into()],
        };
        assert_eq!(
            reason.message(),
            "Restart required, changed: bitrate, audio overlay"
        );
    }
}
