//! Two-port interface to the AY-3-8910.
//!
//! The chip is driven through its BDIR/BC2/BC1 pins. Boards usually decode
//! two ports instead: one latches the register number, the other reads or
//! writes the latched register. Each access pulses the pins and returns
//! them to the inactive state so the next access registers as a change.

use emu_core::{Device, RegisterInfo};
use gi_ay_3_8910::{Ay3_8910, BC1, BC2, BDIR};

const INACTIVE: u8 = BC2;
const LATCH: u8 = BDIR | BC2 | BC1;
const WRITE: u8 = BDIR | BC2;
const READ: u8 = BC2 | BC1;

/// Local port 0 selects a register, local port 1 accesses it.
pub struct PsgPorts {
    chip: Ay3_8910,
    divider: u32,
    phase: u32,
}

impl PsgPorts {
    /// `divider` CPU ticks make one chip tick.
    #[must_use]
    pub fn new(chip: Ay3_8910, divider: u32) -> Self {
        Self {
            chip,
            divider: divider.max(1),
            phase: 0,
        }
    }

    #[must_use]
    pub fn chip(&self) -> &Ay3_8910 {
        &self.chip
    }

    pub fn chip_mut(&mut self) -> &mut Ay3_8910 {
        &mut self.chip
    }

    fn pulse(&mut self, pins: u8, data: u8) {
        self.chip.set_bus_control(pins, data);
        self.chip.set_bus_control(INACTIVE, data);
    }
}

impl Device for PsgPorts {
    fn name(&self) -> &str {
        self.chip.name()
    }

    fn read_port(&mut self, port: u16) -> u8 {
        if port & 1 == 0 {
            return 0xFF;
        }
        self.chip.set_bus_control(READ, 0xFF);
        let value = self.chip.read_port(0);
        self.chip.set_bus_control(INACTIVE, 0xFF);
        value
    }

    fn write_port(&mut self, port: u16, value: u8) {
        let pins = if port & 1 == 0 { LATCH } else { WRITE };
        self.pulse(pins, value);
    }

    fn cycle(&mut self) {
        self.phase += 1;
        if self.phase >= self.divider {
            self.phase = 0;
            self.chip.cycle();
        }
    }

    fn reset(&mut self) {
        self.phase = 0;
        self.chip.reset();
    }

    fn registers(&self) -> &'static [RegisterInfo] {
        self.chip.registers()
    }

    fn register_value(&self, index: usize) -> Option<u32> {
        self.chip.register_value(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn psg() -> PsgPorts {
        PsgPorts::new(Ay3_8910::new(1_000_000, 50_000), 4)
    }

    #[test]
    fn latch_then_write_then_read() {
        let mut psg = psg();
        psg.write_port(0, 7);
        psg.write_port(1, 0x38);
        assert_eq!(psg.chip().selected_register(), 7);
        assert_eq!(psg.chip().read_register(7), 0x38);
        assert_eq!(psg.read_port(1), 0x38);
        assert_eq!(psg.read_port(0), 0xFF);
    }

    #[test]
    fn repeated_writes_each_land() {
        let mut psg = psg();
        psg.write_port(0, 0);
        psg.write_port(1, 0x11);
        psg.write_port(1, 0x22);
        assert_eq!(psg.chip().read_register(0), 0x22);
    }

    #[test]
    fn chip_is_clocked_at_divided_rate() {
        let mut psg = psg();
        for _ in 0..3 {
            psg.cycle();
        }
        assert_eq!(psg.phase, 3);
        psg.cycle();
        assert_eq!(psg.phase, 0);
    }
}
