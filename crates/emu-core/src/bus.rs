//! Memory and I/O bus interface.

use std::collections::HashMap;

/// Memory and I/O bus interface.
///
/// The CPU reaches memory, ports and the interrupt lines through this trait.
/// The bus handles address decoding and routing to the appropriate device.
/// None of these calls can fail: unmapped space reads back as `0xFF`.
pub trait Bus {
    /// Read a byte from the given address.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to the given address.
    ///
    /// Returns the byte that was actually driven onto the bus so call sites
    /// can chain the value.
    fn write(&mut self, address: u16, value: u8) -> u8;

    /// Read a byte from an I/O port.
    fn io_read(&mut self, port: u16) -> u8;

    /// Write a byte to an I/O port.
    fn io_write(&mut self, port: u16, value: u8);

    /// Advance every clocked device by one T-state.
    ///
    /// Called by the CPU after each T-state it consumes.
    fn cycle(&mut self) {}

    /// Mask of interrupt lines currently asserted.
    fn interrupt_pending(&self) -> u32 {
        0
    }

    /// Byte placed on the data bus during an interrupt acknowledge.
    fn interrupt_vector(&mut self) -> u8 {
        0xFF
    }

    /// Assert interrupt lines (OR into the pending mask).
    fn set_interrupt(&mut self, _mask: u32) {}

    /// Release interrupt lines (AND-NOT out of the pending mask).
    fn clear_interrupt(&mut self, _mask: u32) {}

    /// Read a little-endian word. The high byte address wraps at 0xFFFF.
    fn read_word(&mut self, address: u16) -> u16 {
        let lo = self.read(address);
        let hi = self.read(address.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// Write a little-endian word, low byte first.
    fn write_word(&mut self, address: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write(address, lo);
        self.write(address.wrapping_add(1), hi);
    }
}

/// Flat 64K RAM bus with recorded port traffic.
///
/// Handy for CPU tests: port reads come from a preset table (0xFF when
/// unset), port writes are logged in order, and the interrupt mask is a
/// plain register.
pub struct SimpleBus {
    pub memory: Box<[u8; 0x10000]>,
    pub inputs: HashMap<u16, u8>,
    pub outputs: Vec<(u16, u8)>,
    pub pending: u32,
    pub vector: u8,
    pub cycles: u64,
}

impl SimpleBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: Box::new([0; 0x10000]),
            inputs: HashMap::new(),
            outputs: Vec::new(),
            pending: 0,
            vector: 0xFF,
            cycles: 0,
        }
    }

    /// Copy `bytes` into memory starting at `address`, wrapping at 0xFFFF.
    pub fn load(&mut self, address: u16, bytes: &[u8]) {
        let mut addr = address;
        for &b in bytes {
            self.memory[addr as usize] = b;
            addr = addr.wrapping_add(1);
        }
    }
}

impl Default for SimpleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimpleBus {
    fn read(&mut self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    fn write(&mut self, address: u16, value: u8) -> u8 {
        self.memory[address as usize] = value;
        value
    }

    fn io_read(&mut self, port: u16) -> u8 {
        self.inputs.get(&port).copied().unwrap_or(0xFF)
    }

    fn io_write(&mut self, port: u16, value: u8) {
        self.outputs.push((port, value));
    }

    fn cycle(&mut self) {
        self.cycles += 1;
    }

    fn interrupt_pending(&self) -> u32 {
        self.pending
    }

    fn interrupt_vector(&mut self) -> u8 {
        self.vector
    }

    fn set_interrupt(&mut self, mask: u32) {
        self.pending |= mask;
    }

    fn clear_interrupt(&mut self, mask: u32) {
        self.pending &= !mask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_little_endian_and_wrap() {
        let mut bus = SimpleBus::new();
        bus.write_word(0xFFFF, 0x1234);
        assert_eq!(bus.memory[0xFFFF], 0x34);
        assert_eq!(bus.memory[0x0000], 0x12);
        assert_eq!(bus.read_word(0xFFFF), 0x1234);
    }

    #[test]
    fn unset_port_reads_open_bus() {
        let mut bus = SimpleBus::new();
        assert_eq!(bus.io_read(0x00FE), 0xFF);
        bus.inputs.insert(0x00FE, 0x1F);
        assert_eq!(bus.io_read(0x00FE), 0x1F);
    }

    #[test]
    fn interrupt_mask_sets_and_clears() {
        let mut bus = SimpleBus::new();
        bus.set_interrupt(0b0101);
        bus.clear_interrupt(0b0001);
        assert_eq!(bus.interrupt_pending(), 0b0100);
    }
}
