//! Breakpoint table with a bitmap for the per-instruction fast path.

use std::collections::BTreeMap;

use log::debug;

use crate::breakpoint::{Breakpoint, BreakpointKind};

/// One bit per address in the 64K space.
const PRESENCE_BYTES: usize = 0x2000;

/// All breakpoints of a machine, keyed by address.
pub struct Breakpoints {
    presence: Box<[u8; PRESENCE_BYTES]>,
    entries: BTreeMap<u16, Vec<Breakpoint>>,
}

impl Default for Breakpoints {
    fn default() -> Self {
        Self::new()
    }
}

impl Breakpoints {
    #[must_use]
    pub fn new() -> Self {
        Self {
            presence: Box::new([0; PRESENCE_BYTES]),
            entries: BTreeMap::new(),
        }
    }

    fn mark(&mut self, address: u16, present: bool) {
        let byte = &mut self.presence[usize::from(address >> 3)];
        let bit = 1 << (address & 7);
        if present {
            *byte |= bit;
        } else {
            *byte &= !bit;
        }
    }

    /// Cheap check used before every instruction.
    #[must_use]
    pub fn is_set(&self, address: u16) -> bool {
        self.presence[usize::from(address >> 3)] & (1 << (address & 7)) != 0
    }

    /// Add a breakpoint. An existing one of the same kind at the same
    /// address is replaced.
    pub fn add(&mut self, breakpoint: Breakpoint) {
        debug!(
            "breakpoint: {} at {:#06X}",
            breakpoint.kind, breakpoint.address
        );
        let address = breakpoint.address;
        let list = self.entries.entry(address).or_default();
        list.retain(|bp| bp.kind != breakpoint.kind);
        list.push(breakpoint);
        self.mark(address, true);
    }

    /// Remove the breakpoint of `kind` at `address`. Returns it if present.
    pub fn remove(&mut self, address: u16, kind: BreakpointKind) -> Option<Breakpoint> {
        let list = self.entries.get_mut(&address)?;
        let index = list.iter().position(|bp| bp.kind == kind)?;
        let removed = list.remove(index);
        if list.is_empty() {
            self.entries.remove(&address);
            self.mark(address, false);
        }
        Some(removed)
    }

    /// Remove every breakpoint of `kind`.
    pub fn clear_kind(&mut self, kind: BreakpointKind) {
        let addresses: Vec<u16> = self
            .entries
            .iter()
            .filter(|(_, list)| list.iter().any(|bp| bp.kind == kind))
            .map(|(&address, _)| address)
            .collect();
        for address in addresses {
            self.remove(address, kind);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.presence.fill(0);
    }

    #[must_use]
    pub fn get(&self, address: u16, kind: BreakpointKind) -> Option<&Breakpoint> {
        self.entries
            .get(&address)?
            .iter()
            .find(|bp| bp.kind == kind)
    }

    pub fn get_mut(&mut self, address: u16, kind: BreakpointKind) -> Option<&mut Breakpoint> {
        self.entries
            .get_mut(&address)?
            .iter_mut()
            .find(|bp| bp.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.entries.values().flatten()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check `address` before executing there. Returns the kind of the first
    /// breakpoint whose condition holds. Step-over breakpoints at the
    /// address are consumed by a hit.
    pub fn hit(&mut self, address: u16) -> Option<BreakpointKind> {
        if !self.is_set(address) {
            return None;
        }
        let kind = self
            .entries
            .get(&address)?
            .iter()
            .find(|bp| bp.test_condition())
            .map(|bp| bp.kind)?;
        self.remove(address, BreakpointKind::StepOver);
        debug!("breakpoint: hit {kind} at {address:#06X}");
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Condition;

    #[test]
    fn presence_tracks_entries() {
        let mut table = Breakpoints::new();
        assert!(!table.is_set(0x8000));
        table.add(Breakpoint::new(0x8000, BreakpointKind::User));
        table.add(Breakpoint::new(0x8000, BreakpointKind::StepOver));
        assert!(table.is_set(0x8000));
        assert!(!table.is_set(0x8001));
        assert_eq!(table.len(), 2);

        table.remove(0x8000, BreakpointKind::User);
        assert!(table.is_set(0x8000));
        table.remove(0x8000, BreakpointKind::StepOver);
        assert!(!table.is_set(0x8000));
        assert!(table.is_empty());
    }

    #[test]
    fn step_over_consumed_on_hit() {
        let mut table = Breakpoints::new();
        table.add(Breakpoint::new(0x0003, BreakpointKind::StepOver));
        assert_eq!(table.hit(0x0003), Some(BreakpointKind::StepOver));
        assert_eq!(table.hit(0x0003), None);
        assert!(!table.is_set(0x0003));
    }

    #[test]
    fn user_breakpoint_persists() {
        let mut table = Breakpoints::new();
        table.add(Breakpoint::new(0xFFFF, BreakpointKind::User));
        assert_eq!(table.hit(0xFFFF), Some(BreakpointKind::User));
        assert_eq!(table.hit(0xFFFF), Some(BreakpointKind::User));
    }

    #[test]
    fn false_condition_does_not_hit() {
        let mut table = Breakpoints::new();
        let condition = Condition::compile("0").expect("compiles");
        table.add(Breakpoint::new(0x10, BreakpointKind::User).with_condition(condition));
        assert_eq!(table.hit(0x10), None);
        table
            .get_mut(0x10, BreakpointKind::User)
            .expect("present")
            .set_condition(None)
            .expect("clears");
        assert_eq!(table.hit(0x10), Some(BreakpointKind::User));
    }

    #[test]
    fn clear_kind_leaves_others() {
        let mut table = Breakpoints::new();
        table.add(Breakpoint::new(1, BreakpointKind::StepOver));
        table.add(Breakpoint::new(2, BreakpointKind::Assembler));
        table.add(Breakpoint::new(2, BreakpointKind::StepOver));
        table.clear_kind(BreakpointKind::StepOver);
        assert!(!table.is_set(1));
        assert!(table.is_set(2));
        assert_eq!(table.len(), 1);
        assert!(table.get(2, BreakpointKind::Assembler).is_some());
    }
}
