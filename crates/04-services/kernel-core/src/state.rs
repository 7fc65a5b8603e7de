//! Per-region serialization of the core.
//!
//! Each [`StateRegion`] serializes to a fixed number of bytes. The cycle
//! counter is not part of any region; whoever restores a state also owns the
//! clock.

use crate::bus::{IoRegs, IO_SIZE, VRAM_SIZE, WRAM_SIZE};
use crate::core::Core;
use crate::cpu::Cpu;
use crate::timers::Timers;
use std::fmt;

/// Independently serialized piece of core state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateRegion {
    Cpu,
    Timers,
    Io,
    Wram,
    Vram,
}

impl StateRegion {
    /// All regions in restore order.
    pub const ALL: [StateRegion; 5] = [
        StateRegion::Cpu,
        StateRegion::Timers,
        StateRegion::Io,
        StateRegion::Wram,
        StateRegion::Vram,
    ];

    pub const fn id(self) -> u32 {
        match self {
            StateRegion::Cpu => 0,
            StateRegion::Timers => 1,
            StateRegion::Io => 2,
            StateRegion::Wram => 3,
            StateRegion::Vram => 4,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|region| region.id() == id)
    }

    pub const fn name(self) -> &'static str {
        match self {
            StateRegion::Cpu => "cpu",
            StateRegion::Timers => "timers",
            StateRegion::Io => "io",
            StateRegion::Wram => "wram",
            StateRegion::Vram => "vram",
        }
    }

    /// Serialized size in bytes.
    pub const fn size(self) -> usize {
        match self {
            StateRegion::Cpu => Cpu::STATE_SIZE,
            StateRegion::Timers => Timers::STATE_SIZE,
            StateRegion::Io => IO_SIZE,
            StateRegion::Wram => WRAM_SIZE,
            StateRegion::Vram => VRAM_SIZE,
        }
    }
}

/// Errors raised while loading serialized state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Byte count does not match the region's fixed size.
    SizeMismatch {
        region: StateRegion,
        expected: usize,
        actual: usize,
    },
    /// Bytes decode to a state the hardware cannot be in.
    InvalidValue {
        region: StateRegion,
        detail: &'static str,
    },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::SizeMismatch {
                region,
                expected,
                actual,
            } => write!(
                f,
                "{} state is {actual} bytes, expected {expected}",
                region.name()
            ),
            StateError::InvalidValue { region, detail } => {
                write!(f, "invalid {} state: {detail}", region.name())
            }
        }
    }
}

impl std::error::Error for StateError {}

/// Full copy of the core state used for determinism checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreState {
    pub cpu: Cpu,
    pub timers: Timers,
    pub io: Vec<u8>,
    pub wram: Vec<u8>,
    pub vram: Vec<u8>,
}

impl From<&Core> for CoreState {
    fn from(core: &Core) -> Self {
        Self {
            cpu: core.cpu.clone(),
            timers: core.timers.clone(),
            io: core.bus.io.regs().to_vec(),
            wram: core.bus.wram.to_vec(),
            vram: core.bus.vram.to_vec(),
        }
    }
}

impl Core {
    /// Appends the bytes of `region` to `out`.
    pub fn serialize_region(&self, region: StateRegion, out: &mut Vec<u8>) {
        match region {
            StateRegion::Cpu => out.extend_from_slice(&self.cpu.to_bytes()),
            StateRegion::Timers => out.extend_from_slice(&self.timers.to_bytes()),
            StateRegion::Io => out.extend_from_slice(self.bus.io.regs()),
            StateRegion::Wram => out.extend_from_slice(&self.bus.wram[..]),
            StateRegion::Vram => out.extend_from_slice(&self.bus.vram[..]),
        }
    }

    /// Replaces `region` with previously serialized bytes. The core is left
    /// untouched when the bytes are rejected.
    pub fn load_region(&mut self, region: StateRegion, bytes: &[u8]) -> Result<(), StateError> {
        if bytes.len() != region.size() {
            return Err(StateError::SizeMismatch {
                region,
                expected: region.size(),
                actual: bytes.len(),
            });
        }
        match region {
            StateRegion::Cpu => {
                let mut regs = [0; Cpu::STATE_SIZE];
                regs.copy_from_slice(bytes);
                self.cpu = Cpu::from_bytes(regs);
            }
            StateRegion::Timers => {
                let mut counters = [0; Timers::STATE_SIZE];
                counters.copy_from_slice(bytes);
                let timers = Timers::from_bytes(counters);
                if timers.tima_counter() >= Timers::MAX_PERIOD {
                    return Err(StateError::InvalidValue {
                        region,
                        detail: "TIMA counter beyond the longest period",
                    });
                }
                self.timers = timers;
            }
            StateRegion::Io => {
                if bytes[IoRegs::IF] & 0xE0 != 0xE0 {
                    return Err(StateError::InvalidValue {
                        region,
                        detail: "IF upper bits must read as 1",
                    });
                }
                self.bus.io.regs_mut().copy_from_slice(bytes);
            }
            StateRegion::Wram => self.bus.wram.copy_from_slice(bytes),
            StateRegion::Vram => self.bus.vram.copy_from_slice(bytes),
        }
        Ok(())
    }

    /// Every region back to back, in [`StateRegion::ALL`] order.
    pub fn full_state(&self) -> Vec<u8> {
        let total = StateRegion::ALL.iter().map(|region| region.size()).sum();
        let mut out = Vec::with_capacity(total);
        for region in StateRegion::ALL {
            self.serialize_region(region, &mut out);
        }
        out
    }

    /// Loads a previously captured state into the core.
    pub fn load_state(&mut self, state: &CoreState) {
        self.cpu = state.cpu.clone();
        self.timers = state.timers.clone();
        self.bus.io.regs_mut().copy_from_slice(&state.io);
        self.bus.wram.copy_from_slice(&state.wram);
        self.bus.vram.copy_from_slice(&state.vram);
    }
}
