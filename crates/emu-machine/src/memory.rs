//! Banked memory: a 64K address space in four 16K slots.
//!
//! Each slot shows one page, either RAM or ROM. Writes to a ROM page are
//! dropped but still return the value driven onto the bus.

use emu_core::Device;
use log::warn;

use crate::MachineError;

/// Bytes in one page (and one slot).
pub const PAGE_SIZE: usize = 0x4000;

/// Slots in the 64K address space.
pub const SLOTS: usize = 4;

/// A page that can be mapped into a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Ram(usize),
    Rom(usize),
}

pub struct Memory {
    ram: Vec<Box<[u8; PAGE_SIZE]>>,
    rom: Vec<Box<[u8; PAGE_SIZE]>>,
    slots: [Page; SLOTS],
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    /// Flat 64K of RAM: pages 0-3 mapped into slots 0-3.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ram: (0..SLOTS).map(|_| Box::new([0; PAGE_SIZE])).collect(),
            rom: Vec::new(),
            slots: [Page::Ram(0), Page::Ram(1), Page::Ram(2), Page::Ram(3)],
        }
    }

    /// Add a zeroed RAM page.
    pub fn add_ram(&mut self) -> Page {
        self.ram.push(Box::new([0; PAGE_SIZE]));
        Page::Ram(self.ram.len() - 1)
    }

    /// Add a ROM page. Images shorter than a page are padded with 0xFF.
    pub fn add_rom(&mut self, image: &[u8]) -> Result<Page, MachineError> {
        if image.is_empty() {
            return Err(MachineError::Rom("image is empty".to_string()));
        }
        if image.len() > PAGE_SIZE {
            return Err(MachineError::Rom(format!(
                "image is {} bytes, a page holds {PAGE_SIZE}",
                image.len()
            )));
        }
        let mut page = Box::new([0xFF; PAGE_SIZE]);
        page[..image.len()].copy_from_slice(image);
        self.rom.push(page);
        Ok(Page::Rom(self.rom.len() - 1))
    }

    /// Show `page` in `slot`. Returns false, leaving the map alone, if either
    /// does not exist.
    pub fn map(&mut self, slot: usize, page: Page) -> bool {
        let exists = match page {
            Page::Ram(index) => index < self.ram.len(),
            Page::Rom(index) => index < self.rom.len(),
        };
        if slot >= SLOTS || !exists {
            warn!("memory: cannot map {page:?} into slot {slot}");
            return false;
        }
        self.slots[slot] = page;
        true
    }

    #[must_use]
    pub fn mapping(&self, slot: usize) -> Option<Page> {
        self.slots.get(slot).copied()
    }

    fn split(address: u16) -> (usize, usize) {
        let address = usize::from(address);
        (address / PAGE_SIZE, address % PAGE_SIZE)
    }

    /// Read without side effects.
    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        let (slot, offset) = Self::split(address);
        match self.slots[slot] {
            Page::Ram(index) => self.ram[index][offset],
            Page::Rom(index) => self.rom[index][offset],
        }
    }

    /// Copy `bytes` into whatever is mapped at `address`, ROM included.
    /// Wraps at 0xFFFF.
    pub fn load(&mut self, address: u16, bytes: &[u8]) {
        let mut address = address;
        for &byte in bytes {
            let (slot, offset) = Self::split(address);
            match self.slots[slot] {
                Page::Ram(index) => self.ram[index][offset] = byte,
                Page::Rom(index) => self.rom[index][offset] = byte,
            }
            address = address.wrapping_add(1);
        }
    }
}

impl Device for Memory {
    fn name(&self) -> &str {
        "Banked Memory"
    }

    fn read_byte(&mut self, address: u16) -> u8 {
        self.peek(address)
    }

    fn write_byte(&mut self, address: u16, value: u8) -> u8 {
        let (slot, offset) = Self::split(address);
        if let Page::Ram(index) = self.slots[slot] {
            self.ram[index][offset] = value;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rom_writes_ignored_but_returned() {
        let mut mem = Memory::new();
        let rom = mem.add_rom(&[0xF3, 0xAF]).expect("fits");
        assert!(mem.map(0, rom));
        assert_eq!(mem.write_byte(0x0000, 0x00), 0x00);
        assert_eq!(mem.read_byte(0x0000), 0xF3);
        assert_eq!(mem.read_byte(0x0002), 0xFF);
    }

    #[test]
    fn pages_switch_per_slot() {
        let mut mem = Memory::new();
        mem.write_byte(0xC000, 0x11);
        let extra = mem.add_ram();
        assert!(mem.map(3, extra));
        assert_eq!(mem.read_byte(0xC000), 0x00);
        mem.write_byte(0xC000, 0x22);
        assert!(mem.map(3, Page::Ram(3)));
        assert_eq!(mem.read_byte(0xC000), 0x11);
        assert!(mem.map(1, extra));
        assert_eq!(mem.read_byte(0x4000), 0x22);
    }

    #[test]
    fn invalid_mappings_rejected() {
        let mut mem = Memory::new();
        assert!(!mem.map(4, Page::Ram(0)));
        assert!(!mem.map(0, Page::Rom(0)));
        assert_eq!(mem.mapping(0), Some(Page::Ram(0)));
    }

    #[test]
    fn oversized_rom_is_an_error() {
        let mut mem = Memory::new();
        assert!(matches!(
            mem.add_rom(&vec![0; PAGE_SIZE + 1]),
            Err(MachineError::Rom(_))
        ));
        assert!(mem.add_rom(&[]).is_err());
    }

    #[test]
    fn load_wraps_and_reaches_rom() {
        let mut mem = Memory::new();
        let rom = mem.add_rom(&[0; 4]).expect("fits");
        mem.map(0, rom);
        mem.load(0xFFFF, &[0xAA, 0xBB]);
        assert_eq!(mem.peek(0xFFFF), 0xAA);
        assert_eq!(mem.peek(0x0000), 0xBB);
    }
}
