//! Peripheral device capability contract.

use crate::Ticks;

/// A named register exposed for debugger display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterInfo {
    /// Display name, e.g. `"AF'"`.
    pub name: &'static str,
    /// Width in bits (8 or 16, or 8 for a bitfield such as flags).
    pub bits: u8,
    /// Display column hint.
    pub column: u8,
    /// Per-bit labels for bitfield registers, MSB first.
    pub bit_names: Option<&'static str>,
}

impl RegisterInfo {
    #[must_use]
    pub const fn new(name: &'static str, bits: u8) -> Self {
        Self {
            name,
            bits,
            column: 0,
            bit_names: None,
        }
    }

    #[must_use]
    pub const fn in_column(self, column: u8) -> Self {
        Self { column, ..self }
    }

    #[must_use]
    pub const fn with_bits(self, bit_names: &'static str) -> Self {
        Self {
            bit_names: Some(bit_names),
            ..self
        }
    }
}

/// A peripheral wired to the bus.
///
/// Every method has a neutral default so a device only implements the
/// capabilities it has: a sound chip has ports and a clock but no memory,
/// a RAM bank has memory but no ports.
///
/// Devices never fail. Reads of anything they do not decode return `0xFF`.
pub trait Device: Send {
    /// Human-readable device type, e.g. `"WD1770 Floppy Controller"`.
    fn name(&self) -> &str;

    /// Memory-mapped read.
    fn read_byte(&mut self, _address: u16) -> u8 {
        0xFF
    }

    /// Memory-mapped write. Returns the byte driven onto the bus.
    fn write_byte(&mut self, _address: u16, value: u8) -> u8 {
        value
    }

    /// I/O-mapped read. `port` is already decoded to the device's local
    /// register space by the port mapping.
    fn read_port(&mut self, _port: u16) -> u8 {
        0xFF
    }

    /// I/O-mapped write.
    fn write_port(&mut self, _port: u16, _value: u8) {}

    /// Advance one clock tick.
    fn cycle(&mut self) {}

    /// Advance several clock ticks. Must match calling `cycle()` `count` times.
    fn cycle_n(&mut self, count: Ticks) {
        for _ in 0..count.get() {
            self.cycle();
        }
    }

    /// Return to power-on state.
    fn reset(&mut self) {}

    /// Drive interrupt inputs of this device.
    fn set_interrupt(&mut self, _mask: u32) {}

    /// Release interrupt inputs of this device.
    fn clear_interrupt(&mut self, _mask: u32) {}

    /// Interrupt lines this device is currently asserting towards the CPU.
    fn interrupt_output(&self) -> u32 {
        0
    }

    /// Registers exposed for debugger display.
    fn registers(&self) -> &'static [RegisterInfo] {
        &[]
    }

    /// Value of register `index` in `registers()`, or `None` if out of range.
    fn register_value(&self, _index: usize) -> Option<u32> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ticker(u64);

    impl Device for Ticker {
        fn name(&self) -> &str {
            "ticker"
        }

        fn cycle(&mut self) {
            self.0 += 1;
        }
    }

    #[test]
    fn defaults_are_open_bus() {
        let mut dev = Ticker(0);
        assert_eq!(dev.read_byte(0x1234), 0xFF);
        assert_eq!(dev.read_port(0x00), 0xFF);
        assert_eq!(dev.write_byte(0x1234, 0x5A), 0x5A);
        assert!(dev.registers().is_empty());
        assert_eq!(dev.register_value(0), None);
        assert_eq!(dev.interrupt_output(), 0);
    }

    #[test]
    fn cycle_n_matches_repeated_cycle() {
        let mut dev = Ticker(0);
        dev.cycle_n(Ticks::new(7));
        assert_eq!(dev.0, 7);
    }
}
