//! Streamer state machine.

use serde::{Deserialize, Serialize};

/// Streamer operational states.
///
/// `paused` is tracked separately on the record; a paused streamer still
/// moves between these states, it just never starts a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StreamerState {
    /// The last status check found the streamer offline.
    #[default]
    Offline,
    /// The streamer is live but no recorder is running.
    Streaming,
    /// A recorder is running for the streamer.
    Capturing,
    /// A finished recording is queued for, or going through, post-processing.
    PostProcessing,
}

impl StreamerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "Offline",
            Self::Streaming => "Streaming",
            Self::Capturing => "Capturing",
            Self::PostProcessing => "Post-processing",
        }
    }

    /// Whether the streamer was live at the last check.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Streaming | Self::Capturing)
    }

    /// States in which the record owns a capture handle.
    pub fn holds_capture(&self) -> bool {
        matches!(self, Self::Capturing | Self::PostProcessing)
    }
}

impl std::fmt::Display for StreamerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_offline() {
        assert_eq!(StreamerState::default(), StreamerState::Offline);
    }

    #[test]
    fn test_state_predicates() {
        assert!(StreamerState::Streaming.is_live());
        assert!(StreamerState::Capturing.is_live());
        assert!(!StreamerState::PostProcessing.is_live());

        assert!(StreamerState::Capturing.holds_capture());
        assert!(StreamerState::PostProcessing.holds_capture());
        assert!(!StreamerState::Streaming.holds_capture());
        assert!(!StreamerState::Offline.holds_capture());
    }
}
