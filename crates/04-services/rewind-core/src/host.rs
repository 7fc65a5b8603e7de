//! Collaborator interfaces the rewind manager drives.
//!
//! The manager never owns the machine. Every operation that touches machine
//! state receives the host explicitly, which keeps the dependency visible and
//! lets tests substitute tiny deterministic machines.

use crate::time::EmuTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable identity of one serialized memory region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub u32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Declared layout of a region captured into every snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub id: RegionId,
    /// Human-readable name used in logs.
    pub name: &'static str,
    /// Serialized size in bytes. Fixed for the lifetime of a session.
    pub size: usize,
}

impl Region {
    pub const fn new(id: u32, name: &'static str, size: usize) -> Self {
        Self {
            id: RegionId(id),
            name,
            size,
        }
    }
}

/// Failure reported by a host while restoring state or accepting input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HostError(String);

impl HostError {
    pub fn new(msg: impl Into<String>) -> Self {
        HostError(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Per-device serialize/deserialize hooks.
pub trait StateRegions {
    /// Regions captured into every snapshot, in restore order.
    fn regions(&self) -> &[Region];

    /// Appends the current bytes of region `id` to `out`.
    ///
    /// Exactly `size` bytes of the declared [`Region`] must be written.
    fn serialize_region(&self, id: RegionId, time: EmuTime, out: &mut Vec<u8>);

    /// Replaces the state of region `id` with `bytes`.
    fn deserialize_region(
        &mut self,
        id: RegionId,
        bytes: &[u8],
        time: EmuTime,
    ) -> Result<(), HostError>;
}

/// Virtual-clock access.
pub trait Scheduler {
    /// Current emulated time.
    fn now(&self) -> EmuTime;

    /// Moves the clock to `time` without running the machine.
    fn reset_time(&mut self, time: EmuTime);

    /// Runs the machine until exactly `time`. A no-op when `time` is not in
    /// the future.
    ///
    /// Must be split-invariant: running to `t1` and then to `t2` leaves the
    /// machine in the same state as running to `t2` directly.
    fn run_until(&mut self, time: EmuTime);
}

/// Input path for externally observed, non-deterministic events.
pub trait EventSink<E> {
    /// Feeds `event` into the machine at the current time.
    fn deliver_event(&mut self, event: &E) -> Result<(), HostError>;
}

/// Everything the rewind manager needs from the emulated machine.
pub trait RewindHost<E>: StateRegions + Scheduler + EventSink<E> {}

impl<E, H> RewindHost<E> for H where H: StateRegions + Scheduler + EventSink<E> {}
