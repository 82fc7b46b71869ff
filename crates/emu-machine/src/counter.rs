//! Masked up/down counter clocked by the bus.

use emu_core::{Device, RegisterInfo};

/// An n-bit counter. Each `cycle()` adds one (or subtracts one when
/// counting down) and wraps within `bits`.
///
/// `count` is a free reload value for the owning board; the counter itself
/// never touches it.
pub struct Counter {
    name: String,
    mask: u32,
    increment: u32,
    count: u32,
    value: u32,
}

impl Counter {
    /// `bits` is clamped to 1..=32.
    #[must_use]
    pub fn new(bits: u8, down: bool) -> Self {
        let bits = bits.clamp(1, 32);
        let mask = u32::MAX >> (32 - u32::from(bits));
        Self {
            name: format!("Counter ({bits} bit {})", if down { "down" } else { "up" }),
            mask,
            // Adding the mask is subtracting one modulo 2^bits.
            increment: if down { mask } else { 1 },
            count: 0,
            value: 0,
        }
    }

    #[must_use]
    pub fn mask(&self) -> u32 {
        self.mask
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn set_count(&mut self, count: u32) {
        self.count = count;
    }

    #[must_use]
    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn set_value(&mut self, value: u32) {
        self.value = value & self.mask;
    }
}

const REGISTERS: [RegisterInfo; 2] = [
    RegisterInfo::new("Value", 16),
    RegisterInfo::new("Count", 16).in_column(1),
];

impl Device for Counter {
    fn name(&self) -> &str {
        &self.name
    }

    /// Port `n` reads byte `n` of the value, little-endian.
    fn read_port(&mut self, port: u16) -> u8 {
        match port {
            0..=3 => (self.value >> (port * 8)) as u8,
            _ => 0xFF,
        }
    }

    fn cycle(&mut self) {
        self.value = self.value.wrapping_add(self.increment) & self.mask;
    }

    fn reset(&mut self) {
        self.value = 0;
    }

    fn registers(&self) -> &'static [RegisterInfo] {
        &REGISTERS
    }

    fn register_value(&self, index: usize) -> Option<u32> {
        match index {
            0 => Some(self.value),
            1 => Some(self.count),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::Ticks;

    #[test]
    fn up_counter_wraps_at_mask() {
        let mut counter = Counter::new(4, false);
        assert_eq!(counter.name(), "Counter (4 bit up)");
        counter.cycle_n(Ticks::new(15));
        assert_eq!(counter.value(), 15);
        counter.cycle();
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn down_counter_wraps_below_zero() {
        let mut counter = Counter::new(8, true);
        assert_eq!(counter.name(), "Counter (8 bit down)");
        counter.cycle();
        assert_eq!(counter.value(), 0xFF);
        counter.set_value(0x102);
        assert_eq!(counter.value(), 0x02);
        counter.cycle_n(Ticks::new(2));
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn full_width_counter() {
        let mut counter = Counter::new(32, false);
        counter.set_value(u32::MAX);
        counter.cycle();
        assert_eq!(counter.value(), 0);
        assert_eq!(counter.mask(), u32::MAX);
    }

    #[test]
    fn ports_expose_value_bytes() {
        let mut counter = Counter::new(16, false);
        counter.set_value(0x1234);
        counter.set_count(7);
        assert_eq!(counter.read_port(0), 0x34);
        assert_eq!(counter.read_port(1), 0x12);
        assert_eq!(counter.read_port(4), 0xFF);
        assert_eq!(counter.register_value(1), Some(7));
    }
}
