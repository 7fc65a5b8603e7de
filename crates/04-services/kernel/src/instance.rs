use kernel_core::{Core, CoreConfig, CoreState, StateRegion};
use rewind_core::{EmuTime, EventSink, HostError, Region, RegionId, Scheduler, StateRegions};

/// External input a kernel instance accepts. Everything that reaches the
/// core from outside goes through one of these so it can be recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelEvent {
    /// New pressed-button mask (bit set = pressed).
    Joypad(u8),
    /// Byte received on the link cable.
    SerialIn(u8),
}

const fn region(kind: StateRegion) -> Region {
    Region::new(kind.id(), kind.name(), kind.size())
}

const REGIONS: [Region; 5] = [
    region(StateRegion::Cpu),
    region(StateRegion::Timers),
    region(StateRegion::Io),
    region(StateRegion::Wram),
    region(StateRegion::Vram),
];

/// Kernel instance state.
pub struct Instance {
    pub core: Core,
}

impl Instance {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            core: Core::new(config),
        }
    }

    /// Fresh instance carrying the exact state and clock of `other`.
    pub fn clone_from_instance(other: &Instance) -> Self {
        let mut core = Core::new(*other.core.config());
        core.load_state(&CoreState::from(&other.core));
        core.set_cycles(other.core.cycles());
        Self { core }
    }

    /// Currently pressed buttons, decoded from JOYP.
    pub fn joypad(&self) -> u8 {
        !self.core.bus.io.joyp()
    }

    pub fn full_state(&self) -> Vec<u8> {
        self.core.full_state()
    }
}

fn state_region(id: RegionId) -> Option<StateRegion> {
    StateRegion::from_id(id.0)
}

impl StateRegions for Instance {
    fn regions(&self) -> &[Region] {
        &REGIONS
    }

    fn serialize_region(&self, id: RegionId, _time: EmuTime, out: &mut Vec<u8>) {
        match state_region(id) {
            Some(kind) => self.core.serialize_region(kind, out),
            None => panic!("kernel has no state region {id}"),
        }
    }

    fn deserialize_region(
        &mut self,
        id: RegionId,
        bytes: &[u8],
        _time: EmuTime,
    ) -> Result<(), HostError> {
        let kind = state_region(id)
            .ok_or_else(|| HostError::new(format!("kernel has no state region {id}")))?;
        self.core
            .load_region(kind, bytes)
            .map_err(|err| HostError::new(err.to_string()))
    }
}

impl Scheduler for Instance {
    fn now(&self) -> EmuTime {
        EmuTime::from_ticks(self.core.cycles())
    }

    fn reset_time(&mut self, time: EmuTime) {
        self.core.set_cycles(time.ticks());
    }

    fn run_until(&mut self, time: EmuTime) {
        self.core.run_until(time.ticks());
    }
}

impl EventSink<KernelEvent> for Instance {
    fn deliver_event(&mut self, event: &KernelEvent) -> Result<(), HostError> {
        match *event {
            KernelEvent::Joypad(mask) => self.core.set_inputs(mask),
            KernelEvent::SerialIn(byte) => self.core.serial_in(byte),
        }
        Ok(())
    }
}
