#![deny(unsafe_code)]
#![allow(missing_docs)]

//! Deterministic rewind for the GBX emulator.
//!
//! The crate keeps a delta-compressed history of whole-machine snapshots plus
//! a log of every external input, and can rebuild any retained point in
//! emulated time by restoring the nearest snapshot and replaying the log.
//! The machine itself stays behind the [`host`] traits so the same manager
//! drives the kernel, tests, and tooling.

pub mod block;
pub mod command;
pub mod config;
pub mod delta;
pub mod error;
pub mod history;
pub mod host;
pub mod last_blocks;
pub mod manager;
pub mod retention;
pub mod status;
pub mod time;

pub use block::{DeltaBlock, DeltaBlockCopy, DeltaBlockDiff};
pub use command::{ReverseCmd, ReverseReply};
pub use config::RewindConfig;
pub use error::{RewindError, RewindResult};
pub use history::{EventChunk, RegionBlock, ReverseChunk, ReverseHistory};
pub use host::{EventSink, HostError, Region, RegionId, RewindHost, Scheduler, StateRegions};
pub use last_blocks::LastDeltaBlocks;
pub use manager::{ReverseManager, TransferredHistory};
pub use retention::RetentionPolicy;
pub use status::{GoOutcome, ReverseState, ReverseStatus};
pub use time::EmuTime;
