//! Machine bus: banked memory, port-mapped devices and interrupt lines.
//!
//! Devices are clocked in the order they were added, once per T-state,
//! after the CPU's bus access for that T-state. The order is part of the
//! machine's behaviour and never changes after construction.

use emu_core::{Bus, Device, Ticks};

use crate::memory::Memory;

/// Handle to a device added to a [`DeviceBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(usize);

/// Address decode for one port range.
///
/// A port belongs to the mapping when `port & mask == test`. The device
/// sees `port & select`: by default the low-byte bits outside `mask`, so a
/// controller at 0x20-0x27 gets register numbers 0-7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub mask: u16,
    pub test: u16,
    pub select: u16,
}

impl PortMapping {
    #[must_use]
    pub const fn new(mask: u16, test: u16) -> Self {
        Self {
            mask,
            test,
            select: !mask & 0x00FF,
        }
    }

    #[must_use]
    pub const fn with_select(self, select: u16) -> Self {
        Self { select, ..self }
    }

    #[must_use]
    pub const fn matches(&self, port: u16) -> bool {
        port & self.mask == self.test
    }

    #[must_use]
    pub const fn local(&self, port: u16) -> u16 {
        port & self.select
    }
}

pub struct DeviceBus {
    pub memory: Memory,
    devices: Vec<Box<dyn Device>>,
    inputs: Vec<(PortMapping, DeviceId)>,
    outputs: Vec<(PortMapping, DeviceId)>,
    /// Lines asserted from outside any device (front panel, tests).
    external: u32,
    vector: u8,
    ticks: Ticks,
}

impl DeviceBus {
    #[must_use]
    pub fn new(memory: Memory) -> Self {
        Self {
            memory,
            devices: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            external: 0,
            vector: 0xFF,
            ticks: Ticks::ZERO,
        }
    }

    /// Wire a device behind the bus. It is clocked after every device
    /// added before it.
    pub fn add_device(&mut self, device: Box<dyn Device>) -> DeviceId {
        log::debug!("bus: device {} = {}", self.devices.len(), device.name());
        self.devices.push(device);
        DeviceId(self.devices.len() - 1)
    }

    /// Route port reads matching `mapping` to `device`.
    pub fn map_input(&mut self, mapping: PortMapping, device: DeviceId) {
        self.inputs.push((mapping, device));
    }

    /// Route port writes matching `mapping` to `device`.
    pub fn map_output(&mut self, mapping: PortMapping, device: DeviceId) {
        self.outputs.push((mapping, device));
    }

    /// Map both directions at once.
    pub fn map_ports(&mut self, mapping: PortMapping, device: DeviceId) {
        self.map_input(mapping, device);
        self.map_output(mapping, device);
    }

    #[must_use]
    pub fn device(&self, id: DeviceId) -> Option<&dyn Device> {
        self.devices.get(id.0).map(|device| &**device)
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut (dyn Device + 'static)> {
        self.devices.get_mut(id.0).map(|device| &mut **device)
    }

    pub fn devices(&self) -> impl Iterator<Item = &dyn Device> {
        self.devices.iter().map(|device| &**device)
    }

    /// Byte supplied during an interrupt acknowledge (IM 0 opcode, IM 2
    /// table index).
    pub fn set_interrupt_vector(&mut self, vector: u8) {
        self.vector = vector;
    }

    /// T-states clocked through the bus since construction.
    #[must_use]
    pub fn ticks(&self) -> Ticks {
        self.ticks
    }

    /// Reset every device and drop external interrupt requests. Memory
    /// contents survive.
    pub fn reset(&mut self) {
        self.external = 0;
        for device in &mut self.devices {
            device.reset();
        }
    }
}

impl Bus for DeviceBus {
    fn read(&mut self, address: u16) -> u8 {
        self.memory.read_byte(address)
    }

    fn write(&mut self, address: u16, value: u8) -> u8 {
        self.memory.write_byte(address, value)
    }

    /// Every matching input is read and the results are ANDed, starting
    /// from an open bus of 0xFF.
    fn io_read(&mut self, port: u16) -> u8 {
        let mut result = 0xFF;
        for (mapping, id) in &self.inputs {
            if mapping.matches(port) {
                result &= self.devices[id.0].read_port(mapping.local(port));
            }
        }
        result
    }

    fn io_write(&mut self, port: u16, value: u8) {
        for (mapping, id) in &self.outputs {
            if mapping.matches(port) {
                self.devices[id.0].write_port(mapping.local(port), value);
            }
        }
    }

    fn cycle(&mut self) {
        self.ticks += Ticks::ONE;
        for device in &mut self.devices {
            device.cycle();
        }
    }

    fn interrupt_pending(&self) -> u32 {
        self.devices
            .iter()
            .fold(self.external, |lines, device| lines | device.interrupt_output())
    }

    fn interrupt_vector(&mut self) -> u8 {
        self.vector
    }

    fn set_interrupt(&mut self, mask: u32) {
        self.external |= mask;
    }

    fn clear_interrupt(&mut self, mask: u32) {
        self.external &= !mask;
    }
}
