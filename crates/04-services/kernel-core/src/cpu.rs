use crate::bus::{Bus, INT_JOYPAD, INT_SERIAL, INT_TIMER};

/// Register file of the reference machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cpu {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub pc: u16,
    pub hl: u16,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    /// Serialized size of the register file.
    pub const STATE_SIZE: usize = 8;

    /// Creates a CPU with post-boot register values.
    pub fn new() -> Self {
        Self {
            a: 0x01,
            b: 0x00,
            c: 0x13,
            d: 0xD8,
            pc: 0x0100,
            hl: 0xC000,
        }
    }

    /// Executes one machine step: services pending interrupts, folds the
    /// fetched byte and the joypad lines into the registers, and writes the
    /// results back to WRAM and VRAM.
    pub fn execute(&mut self, bus: &mut Bus) {
        let pending = bus.io.if_reg() & 0x1F;
        if pending & INT_TIMER != 0 {
            self.c = self.c.wrapping_add(1);
        }
        if pending & INT_SERIAL != 0 {
            self.d ^= bus.io.sb();
        }
        if pending & INT_JOYPAD != 0 {
            self.b = self.b.rotate_left(3) ^ bus.io.joyp();
        }
        if pending != 0 {
            bus.io.set_if(0);
        }

        let opcode = bus.read8(self.pc);
        let joyp = bus.io.joyp();
        self.a = self.a.wrapping_add(opcode ^ joyp).rotate_left(1) ^ self.c;
        self.b = self.b.wrapping_add(self.a) ^ self.d;
        bus.write8(self.hl, self.a);
        bus.write8(0x8000 | (self.pc & 0x1FFF), self.b);
        self.pc = 0xC000 | (self.pc.wrapping_add(1 + u16::from(self.a & 0x03)) & 0x1FFF);
        self.hl = 0xC000 | (self.hl.wrapping_add(u16::from(self.b) | 1) & 0x1FFF);
    }

    pub(crate) fn to_bytes(&self) -> [u8; Self::STATE_SIZE] {
        let [pc_lo, pc_hi] = self.pc.to_le_bytes();
        let [hl_lo, hl_hi] = self.hl.to_le_bytes();
        [self.a, self.b, self.c, self.d, pc_lo, pc_hi, hl_lo, hl_hi]
    }

    pub(crate) fn from_bytes(bytes: [u8; Self::STATE_SIZE]) -> Self {
        let [a, b, c, d, pc_lo, pc_hi, hl_lo, hl_hi] = bytes;
        Self {
            a,
            b,
            c,
            d,
            pc: u16::from_le_bytes([pc_lo, pc_hi]),
            hl: u16::from_le_bytes([hl_lo, hl_hi]),
        }
    }
}
