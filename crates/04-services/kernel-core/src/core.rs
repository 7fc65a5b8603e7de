use crate::bus::Bus;
use crate::cpu::Cpu;
use crate::timers::Timers;
use std::num::NonZeroU32;

/// Core configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoreConfig {
    /// Master-clock cycles per CPU step.
    pub cycles_per_step: NonZeroU32,
    /// TAC value written at power-on.
    pub timer_control: u8,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cycles_per_step: NonZeroU32::new(4).expect("non-zero"),
            timer_control: 0x05,
        }
    }
}

/// CPU + bus + timers, advanced one master-clock cycle at a time.
pub struct Core {
    /// Register file.
    pub cpu: Cpu,
    /// Memory and IO.
    pub bus: Bus,
    /// Timer block.
    pub timers: Timers,
    cycles: u64,
    config: CoreConfig,
}

impl Core {
    /// Creates a core in its post-boot state at cycle zero.
    pub fn new(config: CoreConfig) -> Self {
        let mut core = Self {
            cpu: Cpu::new(),
            bus: Bus::new(),
            timers: Timers::new(),
            cycles: 0,
            config,
        };
        core.reset_post_boot();
        core
    }

    /// Resets registers, memory, and timers. The cycle counter is kept.
    pub fn reset_post_boot(&mut self) {
        self.cpu = Cpu::new();
        self.bus.reset();
        self.timers.reset();
        self.bus.io.set_tac(self.config.timer_control);
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Master-clock cycles elapsed.
    #[inline]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Moves the cycle counter without running the machine.
    pub fn set_cycles(&mut self, cycles: u64) {
        self.cycles = cycles;
    }

    /// Advances one master-clock cycle; the CPU steps on every
    /// `cycles_per_step`-th cycle.
    pub fn step_cycle(&mut self) {
        self.timers.step(1, &mut self.bus.io);
        self.cycles += 1;
        if self.cycles % u64::from(self.config.cycles_per_step.get()) == 0 {
            self.cpu.execute(&mut self.bus);
        }
    }

    /// Runs until the cycle counter reaches `target`. No-op when `target` is
    /// not in the future.
    pub fn run_until(&mut self, target: u64) {
        while self.cycles < target {
            self.step_cycle();
        }
    }

    pub fn run_cycles(&mut self, cycles: u64) {
        self.run_until(self.cycles.saturating_add(cycles));
    }

    /// Latches the pressed-button mask (bit set = pressed).
    pub fn set_inputs(&mut self, joypad: u8) {
        self.bus.set_inputs(joypad);
    }

    /// Delivers one byte from the link cable.
    pub fn serial_in(&mut self, byte: u8) {
        self.bus.serial_in(byte);
    }
}
