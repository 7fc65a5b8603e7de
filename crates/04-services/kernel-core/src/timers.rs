use crate::bus::{IoRegs, INT_TIMER};

/// Minimal IO interface used by the timers.
pub trait TimerIo {
    fn write_div(&mut self, value: u8);
    fn read_tima(&self) -> u8;
    fn write_tima(&mut self, value: u8);
    fn read_tma(&self) -> u8;
    fn read_tac(&self) -> u8;
    fn read_if(&self) -> u8;
    fn write_if(&mut self, value: u8);
}

impl TimerIo for IoRegs {
    #[inline]
    fn write_div(&mut self, value: u8) {
        self.set_div(value);
    }

    #[inline]
    fn read_tima(&self) -> u8 {
        self.tima()
    }

    #[inline]
    fn write_tima(&mut self, value: u8) {
        self.set_tima(value);
    }

    #[inline]
    fn read_tma(&self) -> u8 {
        self.tma()
    }

    #[inline]
    fn read_tac(&self) -> u8 {
        self.tac()
    }

    #[inline]
    fn read_if(&self) -> u8 {
        self.if_reg()
    }

    #[inline]
    fn write_if(&mut self, value: u8) {
        self.set_if(value);
    }
}

/// DIV + TIMA/TMA/TAC timer block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timers {
    pub(crate) div_counter: u32,
    pub(crate) tima_counter: u32,
}

impl Timers {
    /// Serialized size of the internal counters.
    pub const STATE_SIZE: usize = 8;

    /// Longest TIMA period in cycles.
    pub const MAX_PERIOD: u32 = 1024;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.div_counter = 0;
        self.tima_counter = 0;
    }

    pub fn tima_counter(&self) -> u32 {
        self.tima_counter
    }

    /// Steps the timer block by `cycles`.
    pub fn step<T: TimerIo>(&mut self, cycles: u32, io: &mut T) {
        self.div_counter = self.div_counter.wrapping_add(cycles);
        io.write_div((self.div_counter >> 8) as u8);

        let tac = io.read_tac();
        if tac & 0x04 == 0 {
            return;
        }

        let period = match tac & 0x03 {
            0x00 => Self::MAX_PERIOD,
            0x01 => 16,
            0x02 => 64,
            _ => 256,
        };

        self.tima_counter = self.tima_counter.wrapping_add(cycles);
        while self.tima_counter >= period {
            self.tima_counter -= period;
            let tima = io.read_tima();
            if tima == 0xFF {
                io.write_tima(io.read_tma());
                io.write_if(io.read_if() | INT_TIMER);
            } else {
                io.write_tima(tima.wrapping_add(1));
            }
        }
    }

    pub(crate) fn to_bytes(&self) -> [u8; Self::STATE_SIZE] {
        let mut out = [0; Self::STATE_SIZE];
        out[..4].copy_from_slice(&self.div_counter.to_le_bytes());
        out[4..].copy_from_slice(&self.tima_counter.to_le_bytes());
        out
    }

    pub(crate) fn from_bytes(bytes: [u8; Self::STATE_SIZE]) -> Self {
        let [d0, d1, d2, d3, t0, t1, t2, t3] = bytes;
        Self {
            div_counter: u32::from_le_bytes([d0, d1, d2, d3]),
            tima_counter: u32::from_le_bytes([t0, t1, t2, t3]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tima_overflow_reloads_and_interrupts() {
        let mut io = IoRegs::new();
        io.set_tac(0x05);
        io.set_tma(0xF0);
        io.set_tima(0xFF);
        let mut timers = Timers::new();

        timers.step(15, &mut io);
        assert_eq!(io.tima(), 0xFF);
        timers.step(1, &mut io);
        assert_eq!(io.tima(), 0xF0);
        assert_eq!(io.if_reg() & INT_TIMER, INT_TIMER);
    }

    #[test]
    fn div_follows_the_counter() {
        let mut io = IoRegs::new();
        let mut timers = Timers::new();
        timers.step(0x300, &mut io);
        assert_eq!(io.div(), 0x03);
        assert_eq!(io.tima(), 0);
    }
}
