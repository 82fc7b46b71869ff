//! Z80 CPU core.

#![allow(clippy::cast_possible_truncation)] // Intentional truncation to the low byte.
#![allow(clippy::cast_possible_wrap)] // Intentional i8 casts for displacements.
#![allow(clippy::cast_sign_loss)] // Sign-extended displacement arithmetic.

mod execute;
mod execute_cb;
mod execute_ed;

use emu_core::{Bus, Cpu, Device, Observable, RegisterInfo, Ticks, Value};
use log::trace;

use crate::flags::{self, CF, HF, NF, PF, SF, XF, YF, ZF};
use crate::registers::{Reg8, Registers};

/// Which index register a DD/FD prefix selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    IX,
    IY,
}

impl Index {
    const fn from_prefix(op: u8) -> Option<Self> {
        match op {
            0xDD => Some(Self::IX),
            0xFD => Some(Self::IY),
            _ => None,
        }
    }
}

/// Z80 CPU.
///
/// The CPU does not own the bus. The bus is passed to `step()` so that it
/// (and the devices behind it) can be shared with the rest of the machine.
/// Every T-state is reported through `Bus::cycle()` as it happens.
pub struct Z80 {
    pub(crate) regs: Registers,
    /// Total T-states elapsed.
    cycles: Ticks,
    /// Interrupt latched during the last byte fetch; taken at the next step.
    int_ready: bool,
    /// NMI requested, taken at the next step regardless of IFF1.
    nmi_pending: bool,
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl Z80 {
    /// Create a Z80 in its reset state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::default(),
            cycles: Ticks::ZERO,
            int_ready: false,
            nmi_pending: false,
        }
    }

    // === Timing primitives ===
    // Each helper burns the documented number of T-states, calling
    // bus.cycle() once per T-state after any bus access in that state.

    fn tick<B: Bus>(&mut self, bus: &mut B) {
        self.cycles += Ticks::ONE;
        bus.cycle();
    }

    /// Internal operation cycles with no bus access.
    fn internal<B: Bus>(&mut self, bus: &mut B, count: u8) {
        for _ in 0..count {
            self.tick(bus);
        }
    }

    /// Sample the interrupt line. Runs after every byte fetched from PC.
    fn latch_interrupt<B: Bus>(&mut self, bus: &B) {
        self.int_ready = self.regs.iff1 && bus.interrupt_pending() != 0;
    }

    /// M1 cycle: 4 T-states, bumps R.
    fn fetch_opcode<B: Bus>(&mut self, bus: &mut B) -> u8 {
        self.tick(bus);
        let op = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.regs.inc_r();
        self.tick(bus);
        self.latch_interrupt(bus);
        self.tick(bus);
        self.tick(bus);
        op
    }

    /// Operand byte from PC: 3 T-states.
    fn fetch_byte<B: Bus>(&mut self, bus: &mut B) -> u8 {
        self.tick(bus);
        let value = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.latch_interrupt(bus);
        self.tick(bus);
        self.tick(bus);
        value
    }

    fn fetch_word<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch_byte(bus);
        let hi = self.fetch_byte(bus);
        u16::from_le_bytes([lo, hi])
    }

    /// Signed displacement byte from PC.
    fn fetch_disp<B: Bus>(&mut self, bus: &mut B) -> i8 {
        self.fetch_byte(bus) as i8
    }

    fn read_mem<B: Bus>(&mut self, bus: &mut B, addr: u16) -> u8 {
        self.tick(bus);
        let value = bus.read(addr);
        self.tick(bus);
        self.tick(bus);
        value
    }

    fn write_mem<B: Bus>(&mut self, bus: &mut B, addr: u16, value: u8) {
        self.tick(bus);
        bus.write(addr, value);
        self.tick(bus);
        self.tick(bus);
    }

    fn read_mem16<B: Bus>(&mut self, bus: &mut B, addr: u16) -> u16 {
        let lo = self.read_mem(bus, addr);
        let hi = self.read_mem(bus, addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    fn write_mem16<B: Bus>(&mut self, bus: &mut B, addr: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write_mem(bus, addr, lo);
        self.write_mem(bus, addr.wrapping_add(1), hi);
    }

    /// I/O read: 4 T-states including the automatic wait state.
    fn port_in<B: Bus>(&mut self, bus: &mut B, port: u16) -> u8 {
        self.internal(bus, 2);
        self.tick(bus);
        let value = bus.io_read(port);
        self.tick(bus);
        value
    }

    fn port_out<B: Bus>(&mut self, bus: &mut B, port: u16, value: u8) {
        self.internal(bus, 2);
        self.tick(bus);
        bus.io_write(port, value);
        self.tick(bus);
    }

    /// Push high byte first so the word sits little-endian below the old SP.
    fn push<B: Bus>(&mut self, bus: &mut B, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write_mem(bus, self.regs.sp, hi);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write_mem(bus, self.regs.sp, lo);
    }

    fn pop<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.read_mem(bus, self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = self.read_mem(bus, self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    // === Interrupts ===

    /// Step PC past a parked HALT.
    fn leave_halt(&mut self) {
        if self.regs.halted {
            self.regs.halted = false;
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }
    }

    fn accept_nmi<B: Bus>(&mut self, bus: &mut B) {
        self.nmi_pending = false;
        self.int_ready = false;
        self.leave_halt();
        self.regs.iff1 = false;
        self.regs.inc_r();
        self.internal(bus, 5);
        self.push(bus, self.regs.pc);
        self.regs.pc = 0x0066;
        self.regs.wz = 0x0066;
        trace!("z80: NMI accepted");
    }

    fn accept_interrupt<B: Bus>(&mut self, bus: &mut B) {
        self.int_ready = false;
        self.leave_halt();
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.regs.inc_r();
        // Acknowledge M1 with its two automatic wait states.
        self.internal(bus, 6);
        let vector = bus.interrupt_vector();
        trace!("z80: IM{} interrupt, vector {vector:#04X}", self.regs.im);

        match self.regs.im {
            0 => self.execute(bus, vector),
            1 => self.execute(bus, 0xFF),
            _ => {
                self.internal(bus, 1);
                self.push(bus, self.regs.pc);
                let table = (u16::from(self.regs.i) << 8) | u16::from(vector);
                self.regs.pc = self.read_mem16(bus, table);
                self.regs.wz = self.regs.pc;
            }
        }
    }

    // === Register access ===

    /// Flags register.
    #[must_use]
    pub fn f(&self) -> u8 {
        self.regs.f()
    }

    #[must_use]
    pub fn a(&self) -> u8 {
        self.regs.a()
    }

    #[must_use]
    pub fn bc(&self) -> u16 {
        self.regs.bc()
    }

    #[must_use]
    pub fn de(&self) -> u16 {
        self.regs.de()
    }

    #[must_use]
    pub fn hl(&self) -> u16 {
        self.regs.hl()
    }

    #[must_use]
    pub fn sp(&self) -> u16 {
        self.regs.sp
    }

    /// True if an interrupt was latched and will be taken at the next step.
    #[must_use]
    pub fn interrupt_ready(&self) -> bool {
        self.int_ready
    }

    /// Mutable register access for test setup.
    ///
    /// Only available in test builds.
    #[cfg(feature = "test-utils")]
    pub fn regs_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    /// Only available in test builds.
    #[cfg(feature = "test-utils")]
    pub fn set_pc(&mut self, value: u16) {
        self.regs.pc = value;
    }

    /// Only available in test builds.
    #[cfg(feature = "test-utils")]
    pub fn set_sp(&mut self, value: u16) {
        self.regs.sp = value;
    }

    /// Pop a return address into PC without burning T-states.
    ///
    /// Used by test harnesses to return from trapped system calls.
    /// Only available in test builds.
    #[cfg(feature = "test-utils")]
    pub fn force_ret<B: Bus>(&mut self, bus: &mut B) {
        let sp = self.regs.sp;
        self.regs.pc = bus.read_word(sp);
        self.regs.sp = sp.wrapping_add(2);
    }
}

impl Cpu for Z80 {
    type Registers = Registers;

    fn step<B: Bus>(&mut self, bus: &mut B) {
        if self.nmi_pending {
            self.accept_nmi(bus);
        } else if self.int_ready {
            self.accept_interrupt(bus);
        } else {
            let op = self.fetch_opcode(bus);
            self.execute(bus, op);
        }
    }

    fn step_over_target<B: Bus>(&self, bus: &mut B) -> Option<u16> {
        let pc = self.regs.pc;
        match bus.read(pc) {
            0x76 => Some(pc.wrapping_add(1)),
            0xC4 | 0xCC | 0xCD | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                Some(pc.wrapping_add(3))
            }
            0xED => match bus.read(pc.wrapping_add(1)) {
                0xB0..=0xB3 | 0xB8..=0xBB => Some(pc.wrapping_add(2)),
                _ => None,
            },
            _ => None,
        }
    }

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn cycles(&self) -> Ticks {
        self.cycles
    }

    fn registers(&self) -> Self::Registers {
        self.regs
    }

    fn is_halted(&self) -> bool {
        self.regs.halted
    }

    fn nmi(&mut self) {
        self.nmi_pending = true;
    }

    fn reset(&mut self) {
        self.regs = Registers::default();
        self.int_ready = false;
        self.nmi_pending = false;
    }
}

const Z80_REGISTERS: &[RegisterInfo] = &[
    RegisterInfo::new("Flags", 8).with_bits(flags::FLAG_NAMES),
    RegisterInfo::new("AF", 16),
    RegisterInfo::new("AF'", 16).in_column(1),
    RegisterInfo::new("HL", 16),
    RegisterInfo::new("HL'", 16).in_column(1),
    RegisterInfo::new("DE", 16),
    RegisterInfo::new("DE'", 16).in_column(1),
    RegisterInfo::new("BC", 16),
    RegisterInfo::new("BC'", 16).in_column(1),
    RegisterInfo::new("IX", 16),
    RegisterInfo::new("SP", 16).in_column(1),
    RegisterInfo::new("IY", 16),
    RegisterInfo::new("I", 8).in_column(1),
    RegisterInfo::new("PC", 16),
    RegisterInfo::new("R", 8).in_column(1),
];

/// Exposes the register file to debugger front ends. The CPU has no
/// memory or ports of its own, so every bus method keeps its default.
impl Device for Z80 {
    fn name(&self) -> &str {
        "Zilog Z80"
    }

    fn reset(&mut self) {
        Cpu::reset(self);
    }

    fn registers(&self) -> &'static [RegisterInfo] {
        Z80_REGISTERS
    }

    fn register_value(&self, index: usize) -> Option<u32> {
        let r = &self.regs;
        let value = match index {
            0 => u16::from(r.f()),
            1 => r.af(),
            2 => r.af_alt(),
            3 => r.hl(),
            4 => r.hl_alt(),
            5 => r.de(),
            6 => r.de_alt(),
            7 => r.bc(),
            8 => r.bc_alt(),
            9 => r.ix,
            10 => r.sp,
            11 => r.iy,
            12 => u16::from(r.i),
            13 => r.pc,
            14 => u16::from(r.refresh()),
            _ => return None,
        };
        Some(u32::from(value))
    }
}

const Z80_QUERY_PATHS: &[&str] = &[
    "a", "f", "b", "c", "d", "e", "h", "l",
    "af", "bc", "de", "hl",
    "af'", "bc'", "de'", "hl'",
    "ix", "iy", "sp", "pc", "i", "r", "wz",
    "flags", "flags.s", "flags.z", "flags.y", "flags.h",
    "flags.x", "flags.p", "flags.n", "flags.c",
    "iff1", "iff2", "im",
    "halted", "cycles",
];

impl Observable for Z80 {
    fn query(&self, path: &str) -> Option<Value> {
        let r = &self.regs;
        let flag = |mask: u8| Some(Value::Bool(r.f() & mask != 0));
        match path {
            "a" => Some(r.a().into()),
            "f" => Some(r.f().into()),
            "b" => Some(r.get(Reg8::B).into()),
            "c" => Some(r.get(Reg8::C).into()),
            "d" => Some(r.get(Reg8::D).into()),
            "e" => Some(r.get(Reg8::E).into()),
            "h" => Some(r.get(Reg8::H).into()),
            "l" => Some(r.get(Reg8::L).into()),
            "af" => Some(r.af().into()),
            "bc" => Some(r.bc().into()),
            "de" => Some(r.de().into()),
            "hl" => Some(r.hl().into()),
            "af'" => Some(r.af_alt().into()),
            "bc'" => Some(r.bc_alt().into()),
            "de'" => Some(r.de_alt().into()),
            "hl'" => Some(r.hl_alt().into()),
            "ix" => Some(r.ix.into()),
            "iy" => Some(r.iy.into()),
            "sp" => Some(r.sp.into()),
            "pc" => Some(r.pc.into()),
            "i" => Some(r.i.into()),
            "r" => Some(r.refresh().into()),
            "wz" => Some(r.wz.into()),
            "flags" => Some(Value::Text(flags::describe(r.f()))),
            "flags.s" => flag(SF),
            "flags.z" => flag(ZF),
            "flags.y" => flag(YF),
            "flags.h" => flag(HF),
            "flags.x" => flag(XF),
            "flags.p" => flag(PF),
            "flags.n" => flag(NF),
            "flags.c" => flag(CF),
            "iff1" => Some(r.iff1.into()),
            "iff2" => Some(r.iff2.into()),
            "im" => Some(r.im.into()),
            "halted" => Some(r.halted.into()),
            "cycles" => Some(self.cycles.get().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        Z80_QUERY_PATHS
    }
}
