#![deny(unsafe_code)]
#![allow(missing_docs)]

//! Kernel service wiring the reference core to the rewind manager.
//!
//! [`KernelSession`] owns one [`Instance`] and the [`ReverseManager`] that
//! records it. Every external input goes through the session so it can be
//! logged while collecting and refused while a replay is in flight.

mod instance;

pub use crate::instance::{Instance, KernelEvent};

use kernel_core::{CoreConfig, CoreState};
use log::debug;
use rewind_core::{
    EmuTime, GoOutcome, ReverseCmd, ReverseManager, ReverseReply, ReverseStatus, RewindConfig,
    RewindResult, Scheduler,
};

pub struct KernelSession {
    instance: Instance,
    reverse: ReverseManager<KernelEvent>,
}

impl KernelSession {
    pub fn new(core_config: CoreConfig, rewind_config: RewindConfig) -> Self {
        Self {
            instance: Instance::new(core_config),
            reverse: ReverseManager::new(rewind_config),
        }
    }

    pub fn now(&self) -> EmuTime {
        self.instance.now()
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn reverse(&self) -> &ReverseManager<KernelEvent> {
        &self.reverse
    }

    /// Runs the machine for `budget` master-clock cycles.
    pub fn tick(&mut self, budget: u64) -> RewindResult<EmuTime> {
        let target = self.instance.now().saturating_add(budget);
        self.reverse.run_until(&mut self.instance, target)?;
        Ok(self.instance.now())
    }

    /// Runs the machine up to `time`.
    pub fn run_until(&mut self, time: EmuTime) -> RewindResult<()> {
        self.reverse.run_until(&mut self.instance, time)
    }

    pub fn set_inputs(&mut self, joypad: u8) -> RewindResult<()> {
        self.signal(KernelEvent::Joypad(joypad))
    }

    pub fn serial_in(&mut self, byte: u8) -> RewindResult<()> {
        self.signal(KernelEvent::SerialIn(byte))
    }

    fn signal(&mut self, event: KernelEvent) -> RewindResult<()> {
        self.reverse.signal_event(&mut self.instance, event)
    }

    /// Parses and runs one `reverse ...` command line.
    pub fn command(&mut self, line: &str) -> RewindResult<ReverseReply> {
        let cmd: ReverseCmd = line.parse()?;
        self.execute(cmd)
    }

    pub fn execute(&mut self, cmd: ReverseCmd) -> RewindResult<ReverseReply> {
        debug!("kernel: {cmd} at {}", self.instance.now());
        self.reverse.execute(&mut self.instance, cmd)
    }

    /// Restores the snapshot for `time` and arms a replay towards it; the
    /// replay runs on subsequent ticks.
    pub fn seek(&mut self, time: EmuTime) -> RewindResult<EmuTime> {
        self.reverse.seek(&mut self.instance, time)
    }

    /// Rewinds (or replays forward) to `time`.
    pub fn go(&mut self, time: EmuTime) -> RewindResult<GoOutcome> {
        self.reverse.go(&mut self.instance, time)
    }

    pub fn status(&self) -> ReverseStatus {
        self.reverse.status(&self.instance)
    }

    /// Every state region back to back.
    pub fn full_state(&self) -> Vec<u8> {
        self.instance.full_state()
    }

    pub fn core_state(&self) -> CoreState {
        CoreState::from(&self.instance.core)
    }

    /// Replaces the instance with a fresh copy of itself and moves the
    /// recorded history over to a new manager. A replay in flight keeps its
    /// event cursor but not its target: the new manager replays up to the
    /// last pending event (or the current time when none remain) and then
    /// goes live, dropping history after that point.
    pub fn respawn(&mut self) -> RewindResult<()> {
        let fresh = Instance::clone_from_instance(&self.instance);
        let mut reverse = ReverseManager::new(*self.reverse.config());
        if self.reverse.is_collecting() {
            let taken = self.reverse.take_history()?;
            debug!(
                "kernel: respawn moves {} snapshots, cursor {}",
                taken.history.chunk_count(),
                taken.event_index
            );
            self.instance = fresh;
            reverse.transfer_history(
                &mut self.instance,
                taken.history,
                taken.collect_count,
                taken.event_index,
            )?;
        } else {
            self.instance = fresh;
        }
        self.reverse = reverse;
        Ok(())
    }
}
