use crate::time::EmuTime;
use serde::Serialize;
use std::fmt;

/// Externally visible state of the rewind manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReverseState {
    /// Not collecting; no history.
    Idle,
    /// Capturing snapshots and recording input.
    Collecting,
    /// Reconstructing a past point from recorded input.
    Replaying,
}

impl fmt::Display for ReverseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReverseState::Idle => "disabled",
            ReverseState::Collecting => "enabled",
            ReverseState::Replaying => "replaying",
        };
        f.write_str(label)
    }
}

/// Report produced by `reverse status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReverseStatus {
    pub state: ReverseState,
    /// Oldest reachable time.
    pub begin: Option<EmuTime>,
    /// Newest reachable time.
    pub end: Option<EmuTime>,
    /// Current machine time.
    pub current: EmuTime,
    /// Times of the retained snapshots, oldest first.
    pub snapshots: Vec<EmuTime>,
    pub event_count: usize,
    pub last_event: Option<EmuTime>,
    /// Approximate bytes held by the history.
    pub memory_bytes: usize,
}

/// Result of a completed seek.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GoOutcome {
    /// Time the caller asked for.
    pub requested: EmuTime,
    /// Time actually reached after clamping to the history bounds.
    pub target: EmuTime,
    /// Snapshot the replay started from.
    pub snapshot_time: EmuTime,
    pub events_replayed: usize,
}
