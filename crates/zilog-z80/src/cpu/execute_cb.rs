//! CB-prefixed bit operations, including the DDCB/FDCB indexed forms.

use emu_core::Bus;

use super::{Index, Z80};
use crate::alu;
use crate::flags::{CF, HF, PF, SF, XY, ZF};
use crate::registers::Reg8;

impl Z80 {
    pub(super) fn execute_cb<B: Bus>(&mut self, bus: &mut B, op: u8) {
        let code = op & 7;
        let bit = (op >> 3) & 7;

        if code == 6 {
            let addr = self.regs.hl();
            let value = self.read_mem(bus, addr);
            self.internal(bus, 1);
            if op >> 6 == 1 {
                self.bit_test(bit, value, (self.regs.wz >> 8) as u8);
            } else {
                let result = self.bit_op(op, value);
                self.write_mem(bus, addr, result);
            }
        } else {
            let reg = Reg8::from_code(code);
            let value = self.regs.get(reg);
            if op >> 6 == 1 {
                self.bit_test(bit, value, value);
            } else {
                let result = self.bit_op(op, value);
                self.regs.set(reg, result);
            }
        }
    }

    /// DDCB d op / FDCB d op. The displacement comes before the opcode,
    /// and neither byte is an M1 fetch.
    ///
    /// Everything except BIT also copies the result into the register
    /// named by the low three bits, unless those bits select `(HL)`.
    pub(super) fn execute_index_cb<B: Bus>(&mut self, bus: &mut B, idx: Index) {
        let d = self.fetch_disp(bus);
        let op = self.fetch_byte(bus);
        self.internal(bus, 2);
        let addr = self.index_reg(idx).wrapping_add_signed(i16::from(d));
        self.regs.wz = addr;

        let value = self.read_mem(bus, addr);
        self.internal(bus, 1);
        if op >> 6 == 1 {
            self.bit_test((op >> 3) & 7, value, (addr >> 8) as u8);
        } else {
            let result = self.bit_op(op, value);
            self.write_mem(bus, addr, result);
            if op & 7 != 6 {
                self.regs.set(Reg8::from_code(op), result);
            }
        }
    }

    /// Rotate/shift (flags updated), RES or SET, by opcode bits 7-6.
    fn bit_op(&mut self, op: u8, value: u8) -> u8 {
        let bit = (op >> 3) & 7;
        match op >> 6 {
            0 => {
                let r = alu::shift_op(bit, value, self.regs.f());
                self.regs.set_f(r.flags);
                r.value
            }
            2 => value & !(1 << bit),
            _ => value | (1 << bit),
        }
    }

    /// BIT b: Z and PV report a clear bit, S a set bit 7. The undocumented
    /// bits come from `xy` (the register, or MEMPTR high for memory forms).
    fn bit_test(&mut self, bit: u8, value: u8, xy: u8) {
        let set = value & (1 << bit) != 0;
        let mut f = (self.regs.f() & CF) | HF | (xy & XY);
        if !set {
            f |= ZF | PF;
        } else if bit == 7 {
            f |= SF;
        }
        self.regs.set_f(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{NF, XF, YF};
    use emu_core::{Cpu, SimpleBus};

    #[test]
    fn bit_seven_sets_sign() {
        let mut bus = SimpleBus::new();
        // LD A,0x80 ; BIT 7,A
        bus.load(0, &[0x3E, 0x80, 0xCB, 0x7F]);
        let mut cpu = Z80::new();
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(cpu.f() & (SF | ZF | HF | NF), SF | HF);
        // Carry survives from reset F = 0xFF.
        assert_eq!(cpu.f() & CF, CF);
    }

    #[test]
    fn bit_memory_uses_memptr() {
        let mut bus = SimpleBus::new();
        // LD HL,0x0100 ; LD A,(0x2800) sets MEMPTR=0x2801 ; BIT 0,(HL)
        bus.load(0, &[0x21, 0x00, 0x01, 0x3A, 0x00, 0x28, 0xCB, 0x46]);
        let mut cpu = Z80::new();
        for _ in 0..3 {
            cpu.step(&mut bus);
        }
        assert_eq!(cpu.f() & (XF | YF), XF | YF);
        assert_eq!(cpu.f() & ZF, ZF);
        assert_eq!(cpu.cycles().get(), 10 + 13 + 12);
    }

    #[test]
    fn indexed_rotate_copies_into_register() {
        let mut bus = SimpleBus::new();
        // LD IX,0x0200 ; RLC (IX+1),B
        bus.load(0, &[0xDD, 0x21, 0x00, 0x02, 0xDD, 0xCB, 0x01, 0x00]);
        bus.memory[0x0201] = 0x81;
        let mut cpu = Z80::new();
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(bus.memory[0x0201], 0x03);
        assert_eq!(cpu.bc() >> 8, 0x03);
        assert_eq!(cpu.f() & CF, CF);
        assert_eq!(cpu.cycles().get(), 14 + 23);
        assert_eq!(cpu.pc(), 8);
    }

    #[test]
    fn indexed_set_and_res() {
        let mut bus = SimpleBus::new();
        // LD IY,0x0300 ; SET 3,(IY-1) ; RES 7,(IY-1)
        bus.load(
            0,
            &[0xFD, 0x21, 0x00, 0x03, 0xFD, 0xCB, 0xFF, 0xDE, 0xFD, 0xCB, 0xFF, 0xBE],
        );
        bus.memory[0x02FF] = 0x80;
        let mut cpu = Z80::new();
        for _ in 0..3 {
            cpu.step(&mut bus);
        }
        assert_eq!(bus.memory[0x02FF], 0x08);
    }
}
