#![deny(unsafe_code)]
#![allow(missing_docs)]

//! Deterministic reference machine for the GBX rewind stack.
//!
//! A register file, work/video RAM, an IO block, and the DMG timer run one
//! master-clock cycle at a time. The machine is not a real SM83; it exists so
//! rewind can be exercised end to end against state that evolves, reacts to
//! joypad and serial input, and raises interrupts. Stepping is strictly
//! per cycle, so running to `t1` and then to `t2` equals running to `t2`.

pub mod bus;
pub mod core;
pub mod cpu;
pub mod state;
pub mod timers;

pub use bus::{Bus, IoRegs};
pub use core::{Core, CoreConfig};
pub use cpu::Cpu;
pub use state::{CoreState, StateError, StateRegion};
pub use timers::{TimerIo, Timers};
