use crate::retention::RetentionPolicy;
use crate::time::EmuTime;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;

/// DMG master clock.
pub const DEFAULT_TICKS_PER_SECOND: u64 = 4_194_304;

/// Rewind configuration shared by the manager and its front ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewindConfig {
    /// Emulated ticks between periodic snapshots.
    pub snapshot_interval: NonZeroU64,
    /// Master clock rate used to convert command arguments given in seconds.
    pub ticks_per_second: NonZeroU64,
    /// Which snapshots survive as history grows.
    pub retention: RetentionPolicy,
}

impl Default for RewindConfig {
    fn default() -> Self {
        let ticks_per_second = NonZeroU64::new(DEFAULT_TICKS_PER_SECOND).expect("non-zero");
        Self {
            snapshot_interval: ticks_per_second,
            ticks_per_second,
            retention: RetentionPolicy::default(),
        }
    }
}

impl RewindConfig {
    /// Configuration snapshotting every `interval` ticks, other fields default.
    pub fn with_interval(interval: NonZeroU64) -> Self {
        Self {
            snapshot_interval: interval,
            ..Self::default()
        }
    }

    /// Converts a duration in seconds to ticks. `None` for negative or
    /// non-finite input.
    pub fn ticks_from_secs(&self, secs: f64) -> Option<u64> {
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        Some((secs * self.ticks_per_second.get() as f64).round() as u64)
    }

    pub fn secs(&self, time: EmuTime) -> f64 {
        time.as_secs_f64(self.ticks_per_second)
    }
}
