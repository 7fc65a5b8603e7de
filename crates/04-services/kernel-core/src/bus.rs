/// Work RAM size in bytes.
pub const WRAM_SIZE: usize = 0x2000;
/// Video RAM size in bytes.
pub const VRAM_SIZE: usize = 0x2000;
/// IO register block size in bytes.
pub const IO_SIZE: usize = 0x80;

/// Timer overflow interrupt bit in IF.
pub const INT_TIMER: u8 = 0x04;
/// Serial byte received interrupt bit in IF.
pub const INT_SERIAL: u8 = 0x08;
/// Joypad press interrupt bit in IF.
pub const INT_JOYPAD: u8 = 0x10;

/// Flat memory map: VRAM at `0x8000`, WRAM at `0xC000`, IO at `0xFF00`.
/// Everything else reads as open bus.
pub struct Bus {
    /// Video RAM at `0x8000`.
    pub vram: Box<[u8; VRAM_SIZE]>,
    /// Work RAM at `0xC000`.
    pub wram: Box<[u8; WRAM_SIZE]>,
    /// IO register block.
    pub io: IoRegs,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// Creates a bus with cleared memory.
    pub fn new() -> Self {
        Self {
            vram: Box::new([0; VRAM_SIZE]),
            wram: Box::new([0; WRAM_SIZE]),
            io: IoRegs::new(),
        }
    }

    /// Clears memory and IO back to power-on values.
    pub fn reset(&mut self) {
        self.vram.fill(0);
        self.wram.fill(0);
        self.io = IoRegs::new();
    }

    #[inline]
    pub fn read8(&self, addr: u16) -> u8 {
        match addr {
            0x8000..=0x9FFF => self.vram[(addr - 0x8000) as usize],
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            0xFF00..=0xFF7F => self.io.read((addr - 0xFF00) as usize),
            _ => 0xFF,
        }
    }

    #[inline]
    pub fn write8(&mut self, addr: u16, value: u8) {
        match addr {
            0x8000..=0x9FFF => self.vram[(addr - 0x8000) as usize] = value,
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = value,
            0xFF00..=0xFF7F => self.io.write((addr - 0xFF00) as usize, value),
            _ => {}
        }
    }

    /// Latches the pressed-button mask (bit set = pressed). Newly pressed
    /// buttons raise the joypad interrupt.
    pub fn set_inputs(&mut self, joypad: u8) {
        let previous = !self.io.joyp();
        if joypad & !previous != 0 {
            self.io.set_if(self.io.if_reg() | INT_JOYPAD);
        }
        // JOYP is active-low.
        self.io.set_joyp(!joypad);
    }

    /// Shifts in a byte from the link cable.
    pub fn serial_in(&mut self, byte: u8) {
        self.io.set_sb(byte);
        self.io.set_if(self.io.if_reg() | INT_SERIAL);
    }
}

/// IO register block at `0xFF00`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IoRegs {
    regs: [u8; IO_SIZE],
}

impl Default for IoRegs {
    fn default() -> Self {
        Self::new()
    }
}

impl IoRegs {
    /// JOYP register offset.
    pub const JOYP: usize = 0x00;
    /// Serial transfer data register.
    pub const SB: usize = 0x01;
    /// Serial transfer control register.
    pub const SC: usize = 0x02;
    /// Divider register offset.
    pub const DIV: usize = 0x04;
    /// Timer counter register offset.
    pub const TIMA: usize = 0x05;
    /// Timer modulo register offset.
    pub const TMA: usize = 0x06;
    /// Timer control register offset.
    pub const TAC: usize = 0x07;
    /// Interrupt flag register offset.
    pub const IF: usize = 0x0F;

    /// Creates IO registers with power-on values.
    pub fn new() -> Self {
        let mut regs = [0; IO_SIZE];
        regs[Self::JOYP] = 0xFF;
        regs[Self::IF] = 0xE0;
        Self { regs }
    }

    pub fn regs(&self) -> &[u8; IO_SIZE] {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut [u8; IO_SIZE] {
        &mut self.regs
    }

    #[inline]
    pub fn read(&self, idx: usize) -> u8 {
        match idx {
            Self::SC => self.sc(),
            Self::TAC => self.tac(),
            _ => self.regs[idx],
        }
    }

    #[inline]
    pub fn write(&mut self, idx: usize, value: u8) {
        match idx {
            Self::SC => self.regs[idx] = value & 0x81,
            Self::IF => self.set_if(value),
            // Any write resets the divider.
            Self::DIV => self.regs[idx] = 0,
            _ => self.regs[idx] = value,
        }
    }

    #[inline]
    pub fn div(&self) -> u8 {
        self.regs[Self::DIV]
    }

    #[inline]
    pub fn set_div(&mut self, value: u8) {
        self.regs[Self::DIV] = value;
    }

    #[inline]
    pub fn tima(&self) -> u8 {
        self.regs[Self::TIMA]
    }

    #[inline]
    pub fn set_tima(&mut self, value: u8) {
        self.regs[Self::TIMA] = value;
    }

    #[inline]
    pub fn tma(&self) -> u8 {
        self.regs[Self::TMA]
    }

    #[inline]
    pub fn set_tma(&mut self, value: u8) {
        self.regs[Self::TMA] = value;
    }

    /// Timer control with unused bits pulled high.
    #[inline]
    pub fn tac(&self) -> u8 {
        self.regs[Self::TAC] | 0xF8
    }

    #[inline]
    pub fn set_tac(&mut self, value: u8) {
        self.regs[Self::TAC] = value & 0x07;
    }

    /// Serial control with unused bits pulled high.
    #[inline]
    pub fn sc(&self) -> u8 {
        (self.regs[Self::SC] & 0x81) | 0x7E
    }

    #[inline]
    pub fn sb(&self) -> u8 {
        self.regs[Self::SB]
    }

    #[inline]
    pub fn set_sb(&mut self, value: u8) {
        self.regs[Self::SB] = value;
    }

    #[inline]
    pub fn if_reg(&self) -> u8 {
        self.regs[Self::IF]
    }

    /// IF bits 5-7 always read back as 1.
    #[inline]
    pub fn set_if(&mut self, value: u8) {
        self.regs[Self::IF] = (value & 0x1F) | 0xE0;
    }

    #[inline]
    pub fn joyp(&self) -> u8 {
        self.regs[Self::JOYP]
    }

    #[inline]
    pub fn set_joyp(&mut self, value: u8) {
        self.regs[Self::JOYP] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_map_routes_by_address() {
        let mut bus = Bus::new();
        bus.write8(0x8001, 0x11);
        bus.write8(0xC002, 0x22);
        bus.write8(0xFF06, 0x33);
        bus.write8(0x0100, 0x44);
        assert_eq!(bus.vram[1], 0x11);
        assert_eq!(bus.wram[2], 0x22);
        assert_eq!(bus.io.tma(), 0x33);
        assert_eq!(bus.read8(0x0100), 0xFF);
    }

    #[test]
    fn pressing_a_button_raises_joypad_interrupt() {
        let mut bus = Bus::new();
        bus.set_inputs(0x01);
        assert_eq!(bus.io.joyp(), 0xFE);
        assert_eq!(bus.io.if_reg() & INT_JOYPAD, INT_JOYPAD);

        bus.io.set_if(0);
        // Releasing does not interrupt.
        bus.set_inputs(0x00);
        assert_eq!(bus.io.if_reg() & INT_JOYPAD, 0);
    }

    #[test]
    fn serial_byte_lands_in_sb() {
        let mut bus = Bus::new();
        bus.serial_in(0x5A);
        assert_eq!(bus.io.sb(), 0x5A);
        assert_eq!(bus.io.if_reg(), 0xE0 | INT_SERIAL);
    }
}
