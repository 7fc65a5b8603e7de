use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// Point in emulated time, counted in master-clock ticks.
///
/// Emulated time is independent of the host wall clock; it only advances
/// when the machine is run.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EmuTime(u64);

impl EmuTime {
    /// Power-on time.
    pub const ZERO: EmuTime = EmuTime(0);

    #[inline]
    pub const fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    #[inline]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn saturating_add(self, ticks: u64) -> Self {
        Self(self.0.saturating_add(ticks))
    }

    #[inline]
    pub fn saturating_sub(self, ticks: u64) -> Self {
        Self(self.0.saturating_sub(ticks))
    }

    /// Converts to seconds for a clock running at `ticks_per_second`.
    pub fn as_secs_f64(self, ticks_per_second: NonZeroU64) -> f64 {
        self.0 as f64 / ticks_per_second.get() as f64
    }
}

impl fmt::Display for EmuTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EmuTime {
    fn from(ticks: u64) -> Self {
        Self(ticks)
    }
}
