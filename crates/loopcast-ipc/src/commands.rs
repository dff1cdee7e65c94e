//! Commands sent from the control surface to the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction of a manual skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipDirection {
    /// Jump to the entry after the one playing.
    Next,

    /// Jump to the entry before the one playing.
    Previous,
}

impl SkipDirection {
    /// Parses an operator keyword (`next`, `prev`, `previous`).
    pub fn parse(word: &str) -> Option<Self> {
        match word.trim().to_ascii_lowercase().as_str() {
            "next" | "n" => Some(Self::Next),
            "prev" | "previous" | "p" => Some(Self::Previous),
            _ => None,
        }
    }
}

/// Commands that a control surface can send to the engine.
///
/// Start and stop are deliberately absent: they are driven by `isActive` in
/// the polled configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineCommand {
    /// Kill the current feeder and jump in the given direction.
    Skip(SkipDirection),

    /// Request an [`EngineEvent::Status`](crate::EngineEvent::Status) event.
    GetStatus,

    /// Stop any live broadcast and shut the engine down.
    Shutdown,
}

/// Reasons a control request can be rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlError {
    /// The engine is not currently streaming.
    #[error("not streaming")]
    NotStreaming,

    /// The playlist snapshot has no playable entries.
    #[error("playlist is empty")]
    EmptyPlaylist,

    /// The engine's command channel is gone.
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_direction_parse() {
        assert_eq!(SkipDirection::parse("next"), Some(SkipDirection::Next));
        assert_eq!(SkipDirection::parse(" PREV "), Some(SkipDirection::Previous));
        assert_eq!(SkipDirection::parse("previous"), Some(SkipDirection::Previous));
        assert_eq!(SkipDirection::parse("later"), None);
    }
}
