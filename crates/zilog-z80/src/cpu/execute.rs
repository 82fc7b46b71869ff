//! Unprefixed and DD/FD-indexed instruction execution.
//!
//! Indexed forms reuse the unprefixed handlers: `idx` selects IX or IY in
//! place of HL, and any `(HL)` operand becomes `(IX+d)`/`(IY+d)` with the
//! effective address computed up front.

use emu_core::Bus;

use super::{Index, Z80};
use crate::alu;
use crate::flags::{CF, HF, NF, PF, SF, XY, ZF};
use crate::registers::{Pair, Reg8};

impl Z80 {
    /// Execute an opcode already fetched by an M1 cycle.
    ///
    /// DD/FD prefixes are followed here; a later prefix replaces an earlier
    /// one without ending the instruction.
    pub(super) fn execute<B: Bus>(&mut self, bus: &mut B, mut op: u8) {
        let mut idx = None;
        while let Some(selected) = Index::from_prefix(op) {
            idx = Some(selected);
            op = self.fetch_opcode(bus);
        }
        self.execute_base(bus, op, idx);
    }

    // === Operand helpers ===

    pub(super) fn index_reg(&self, idx: Index) -> u16 {
        match idx {
            Index::IX => self.regs.ix,
            Index::IY => self.regs.iy,
        }
    }

    fn set_index_reg(&mut self, idx: Index, value: u16) {
        match idx {
            Index::IX => self.regs.ix = value,
            Index::IY => self.regs.iy = value,
        }
    }

    /// HL, or the index register selected by the prefix.
    fn hl_or(&self, idx: Option<Index>) -> u16 {
        idx.map_or(self.regs.hl(), |i| self.index_reg(i))
    }

    fn set_hl_or(&mut self, idx: Option<Index>, value: u16) {
        match idx {
            Some(i) => self.set_index_reg(i, value),
            None => self.regs.set_hl(value),
        }
    }

    fn rp(&self, code: u8, idx: Option<Index>) -> u16 {
        match Pair::from_dd(code) {
            Pair::HL => self.hl_or(idx),
            pair => self.regs.pair(pair),
        }
    }

    fn set_rp(&mut self, code: u8, idx: Option<Index>, value: u16) {
        match Pair::from_dd(code) {
            Pair::HL => self.set_hl_or(idx, value),
            pair => self.regs.set_pair(pair, value),
        }
    }

    fn rp_qq(&self, code: u8, idx: Option<Index>) -> u16 {
        match Pair::from_qq(code) {
            Pair::HL => self.hl_or(idx),
            pair => self.regs.pair(pair),
        }
    }

    fn set_rp_qq(&mut self, code: u8, idx: Option<Index>, value: u16) {
        match Pair::from_qq(code) {
            Pair::HL => self.set_hl_or(idx, value),
            pair => self.regs.set_pair(pair, value),
        }
    }

    /// Register operand by 3-bit code. Under a prefix, H and L become the
    /// halves of the index register.
    fn reg8(&self, code: u8, idx: Option<Index>) -> u8 {
        match (code & 7, idx) {
            (4, Some(i)) => (self.index_reg(i) >> 8) as u8,
            (5, Some(i)) => self.index_reg(i) as u8,
            (c, _) => self.regs.get(Reg8::from_code(c)),
        }
    }

    fn set_reg8(&mut self, code: u8, idx: Option<Index>, value: u8) {
        match (code & 7, idx) {
            (4, Some(i)) => {
                let word = self.index_reg(i);
                self.set_index_reg(i, (word & 0x00FF) | (u16::from(value) << 8));
            }
            (5, Some(i)) => {
                let word = self.index_reg(i);
                self.set_index_reg(i, (word & 0xFF00) | u16::from(value));
            }
            (c, _) => self.regs.set(Reg8::from_code(c), value),
        }
    }

    /// Address of an `(HL)` operand: HL itself, or the index register plus
    /// a displacement read from the instruction stream (MEMPTR = result).
    fn operand_addr<B: Bus>(&mut self, bus: &mut B, idx: Option<Index>) -> u16 {
        match idx {
            None => self.regs.hl(),
            Some(i) => {
                let d = self.fetch_disp(bus);
                self.internal(bus, 5);
                let addr = self.index_reg(i).wrapping_add_signed(i16::from(d));
                self.regs.wz = addr;
                addr
            }
        }
    }

    /// Condition code from opcode bits 5-3: NZ, Z, NC, C, PO, PE, P, M.
    fn condition(&self, cc: u8) -> bool {
        let f = self.regs.f();
        match cc & 7 {
            0 => f & ZF == 0,
            1 => f & ZF != 0,
            2 => f & CF == 0,
            3 => f & CF != 0,
            4 => f & PF == 0,
            5 => f & PF != 0,
            6 => f & SF == 0,
            _ => f & SF != 0,
        }
    }

    fn alu_a(&mut self, op: u8, value: u8) {
        let r = alu::alu_op(op, self.regs.a(), value, self.regs.f());
        self.regs.set_a(r.value);
        self.regs.set_f(r.flags);
    }

    /// INC or DEC, carry preserved.
    fn inc_dec(&mut self, value: u8, decrement: bool) -> u8 {
        let r = if decrement {
            alu::dec8(value)
        } else {
            alu::inc8(value)
        };
        self.regs.set_f((self.regs.f() & CF) | r.flags);
        r.value
    }

    fn jump_relative(&mut self, e: i8) {
        self.regs.pc = self.regs.pc.wrapping_add_signed(i16::from(e));
        self.regs.wz = self.regs.pc;
    }

    /// Accumulator store: MEMPTR low = address+1, high = A.
    fn store_a<B: Bus>(&mut self, bus: &mut B, addr: u16) {
        let a = self.regs.a();
        self.write_mem(bus, addr, a);
        self.regs.wz = (addr.wrapping_add(1) & 0x00FF) | (u16::from(a) << 8);
    }

    fn load_a<B: Bus>(&mut self, bus: &mut B, addr: u16) {
        let value = self.read_mem(bus, addr);
        self.regs.set_a(value);
        self.regs.wz = addr.wrapping_add(1);
    }

    // === Dispatch ===

    #[allow(clippy::too_many_lines)] // One arm per opcode group.
    fn execute_base<B: Bus>(&mut self, bus: &mut B, op: u8, idx: Option<Index>) {
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;

        match op {
            // NOP
            0x00 => {}

            // EX AF,AF'
            0x08 => self.regs.ex_af(),

            // DJNZ e
            0x10 => {
                self.internal(bus, 1);
                let e = self.fetch_disp(bus);
                let b = self.regs.get(Reg8::B).wrapping_sub(1);
                self.regs.set(Reg8::B, b);
                if b != 0 {
                    self.internal(bus, 5);
                    self.jump_relative(e);
                }
            }

            // JR e
            0x18 => {
                let e = self.fetch_disp(bus);
                self.internal(bus, 5);
                self.jump_relative(e);
            }

            // JR NZ/Z/NC/C,e
            0x20 | 0x28 | 0x30 | 0x38 => {
                let e = self.fetch_disp(bus);
                if self.condition(y & 3) {
                    self.internal(bus, 5);
                    self.jump_relative(e);
                }
            }

            // LD rr,nn
            0x01 | 0x11 | 0x21 | 0x31 => {
                let nn = self.fetch_word(bus);
                self.set_rp(p, idx, nn);
            }

            // ADD HL,rr
            0x09 | 0x19 | 0x29 | 0x39 => {
                let hl = self.hl_or(idx);
                let rr = self.rp(p, idx);
                self.internal(bus, 7);
                let (value, flags) = alu::add16(hl, rr);
                self.regs
                    .set_f((self.regs.f() & (SF | ZF | PF)) | flags);
                self.regs.wz = hl.wrapping_add(1);
                self.set_hl_or(idx, value);
            }

            // LD (BC),A / LD (DE),A
            0x02 => self.store_a(bus, self.regs.bc()),
            0x12 => self.store_a(bus, self.regs.de()),

            // LD A,(BC) / LD A,(DE)
            0x0A => self.load_a(bus, self.regs.bc()),
            0x1A => self.load_a(bus, self.regs.de()),

            // LD (nn),HL
            0x22 => {
                let nn = self.fetch_word(bus);
                let hl = self.hl_or(idx);
                self.write_mem16(bus, nn, hl);
                self.regs.wz = nn.wrapping_add(1);
            }

            // LD HL,(nn)
            0x2A => {
                let nn = self.fetch_word(bus);
                let value = self.read_mem16(bus, nn);
                self.set_hl_or(idx, value);
                self.regs.wz = nn.wrapping_add(1);
            }

            // LD (nn),A
            0x32 => {
                let nn = self.fetch_word(bus);
                self.store_a(bus, nn);
            }

            // LD A,(nn)
            0x3A => {
                let nn = self.fetch_word(bus);
                self.load_a(bus, nn);
            }

            // INC rr
            0x03 | 0x13 | 0x23 | 0x33 => {
                self.internal(bus, 2);
                let value = self.rp(p, idx).wrapping_add(1);
                self.set_rp(p, idx, value);
            }

            // DEC rr
            0x0B | 0x1B | 0x2B | 0x3B => {
                self.internal(bus, 2);
                let value = self.rp(p, idx).wrapping_sub(1);
                self.set_rp(p, idx, value);
            }

            // INC r / DEC r / INC (HL) / DEC (HL)
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C | 0x05 | 0x0D | 0x15
            | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let decrement = z == 5;
                if y == 6 {
                    let addr = self.operand_addr(bus, idx);
                    let value = self.read_mem(bus, addr);
                    self.internal(bus, 1);
                    let result = self.inc_dec(value, decrement);
                    self.write_mem(bus, addr, result);
                } else {
                    let value = self.reg8(y, idx);
                    let result = self.inc_dec(value, decrement);
                    self.set_reg8(y, idx, result);
                }
            }

            // LD (HL),n
            0x36 => {
                let addr = match idx {
                    None => self.regs.hl(),
                    Some(i) => {
                        let d = self.fetch_disp(bus);
                        let addr = self.index_reg(i).wrapping_add_signed(i16::from(d));
                        self.regs.wz = addr;
                        addr
                    }
                };
                let n = self.fetch_byte(bus);
                if idx.is_some() {
                    self.internal(bus, 2);
                }
                self.write_mem(bus, addr, n);
            }

            // LD r,n
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x3E => {
                let n = self.fetch_byte(bus);
                self.set_reg8(y, idx, n);
            }

            // RLCA / RRCA / RLA / RRA
            0x07 | 0x0F | 0x17 | 0x1F => {
                let r = alu::rotate_acc(y, self.regs.a(), self.regs.f());
                self.regs.set_a(r.value);
                self.regs.set_f(r.flags);
            }

            // DAA
            0x27 => {
                let r = alu::daa(self.regs.a(), self.regs.f());
                self.regs.set_a(r.value);
                self.regs.set_f(r.flags);
            }

            // CPL
            0x2F => {
                let a = !self.regs.a();
                self.regs.set_a(a);
                self.regs
                    .set_f((self.regs.f() & (SF | ZF | PF | CF)) | HF | NF | (a & XY));
            }

            // SCF
            0x37 => {
                let f = self.regs.f();
                self.regs
                    .set_f((f & (SF | ZF | PF)) | (self.regs.a() & XY) | CF);
            }

            // CCF: H takes the old carry.
            0x3F => {
                let f = self.regs.f();
                let carry = f & CF != 0;
                let mut new = (f & (SF | ZF | PF)) | (self.regs.a() & XY);
                if carry {
                    new |= HF;
                } else {
                    new |= CF;
                }
                self.regs.set_f(new);
            }

            // HALT: park on the opcode until an interrupt.
            0x76 => {
                self.regs.halted = true;
                self.regs.pc = self.regs.pc.wrapping_sub(1);
            }

            // LD r,r' / LD r,(HL) / LD (HL),r
            0x40..=0x7F => {
                if z == 6 {
                    let addr = self.operand_addr(bus, idx);
                    let value = self.read_mem(bus, addr);
                    self.regs.set(Reg8::from_code(y), value);
                } else if y == 6 {
                    let addr = self.operand_addr(bus, idx);
                    let value = self.regs.get(Reg8::from_code(z));
                    self.write_mem(bus, addr, value);
                } else {
                    let value = self.reg8(z, idx);
                    self.set_reg8(y, idx, value);
                }
            }

            // ADD/ADC/SUB/SBC/AND/XOR/OR/CP A,r
            0x80..=0xBF => {
                let value = if z == 6 {
                    let addr = self.operand_addr(bus, idx);
                    self.read_mem(bus, addr)
                } else {
                    self.reg8(z, idx)
                };
                self.alu_a(y, value);
            }

            // RET cc
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                self.internal(bus, 1);
                if self.condition(y) {
                    self.regs.pc = self.pop(bus);
                    self.regs.wz = self.regs.pc;
                }
            }

            // POP qq
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let value = self.pop(bus);
                self.set_rp_qq(p, idx, value);
            }

            // PUSH qq
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                self.internal(bus, 1);
                let value = self.rp_qq(p, idx);
                self.push(bus, value);
            }

            // RET
            0xC9 => {
                self.regs.pc = self.pop(bus);
                self.regs.wz = self.regs.pc;
            }

            // EXX
            0xD9 => self.regs.exx(),

            // JP (HL)
            0xE9 => self.regs.pc = self.hl_or(idx),

            // LD SP,HL
            0xF9 => {
                self.internal(bus, 2);
                self.regs.sp = self.hl_or(idx);
            }

            // JP cc,nn
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
                let nn = self.fetch_word(bus);
                self.regs.wz = nn;
                if self.condition(y) {
                    self.regs.pc = nn;
                }
            }

            // JP nn
            0xC3 => {
                let nn = self.fetch_word(bus);
                self.regs.wz = nn;
                self.regs.pc = nn;
            }

            // CB prefix
            0xCB => match idx {
                None => {
                    let op = self.fetch_opcode(bus);
                    self.execute_cb(bus, op);
                }
                Some(i) => self.execute_index_cb(bus, i),
            },

            // OUT (n),A
            0xD3 => {
                let n = self.fetch_byte(bus);
                let a = self.regs.a();
                self.port_out(bus, (u16::from(a) << 8) | u16::from(n), a);
                self.regs.wz = u16::from(n.wrapping_add(1)) | (u16::from(a) << 8);
            }

            // IN A,(n)
            0xDB => {
                let n = self.fetch_byte(bus);
                let port = (u16::from(self.regs.a()) << 8) | u16::from(n);
                let value = self.port_in(bus, port);
                self.regs.set_a(value);
                self.regs.wz = port.wrapping_add(1);
            }

            // EX (SP),HL
            0xE3 => {
                let sp = self.regs.sp;
                let lo = self.read_mem(bus, sp);
                let hi = self.read_mem(bus, sp.wrapping_add(1));
                self.internal(bus, 1);
                let [old_lo, old_hi] = self.hl_or(idx).to_le_bytes();
                self.write_mem(bus, sp.wrapping_add(1), old_hi);
                self.write_mem(bus, sp, old_lo);
                self.internal(bus, 2);
                let value = u16::from_le_bytes([lo, hi]);
                self.set_hl_or(idx, value);
                self.regs.wz = value;
            }

            // EX DE,HL (never affected by a prefix)
            0xEB => {
                let de = self.regs.de();
                self.regs.set_de(self.regs.hl());
                self.regs.set_hl(de);
            }

            // DI
            0xF3 => {
                self.regs.iff1 = false;
                self.regs.iff2 = false;
                self.int_ready = false;
            }

            // EI: interrupts are sampled again from the next fetch on.
            0xFB => {
                self.regs.iff1 = true;
                self.regs.iff2 = true;
                self.int_ready = false;
            }

            // CALL cc,nn
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                let nn = self.fetch_word(bus);
                self.regs.wz = nn;
                if self.condition(y) {
                    self.internal(bus, 1);
                    self.push(bus, self.regs.pc);
                    self.regs.pc = nn;
                }
            }

            // CALL nn
            0xCD => {
                let nn = self.fetch_word(bus);
                self.regs.wz = nn;
                self.internal(bus, 1);
                self.push(bus, self.regs.pc);
                self.regs.pc = nn;
            }

            // ED prefix; a preceding DD/FD has no effect.
            0xED => {
                let op = self.fetch_opcode(bus);
                self.execute_ed(bus, op);
            }

            // Prefix chains are consumed by execute().
            0xDD | 0xFD => {}

            // ALU A,n
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let n = self.fetch_byte(bus);
                self.alu_a(y, n);
            }

            // RST p
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.internal(bus, 1);
                self.push(bus, self.regs.pc);
                self.regs.pc = u16::from(op & 0x38);
                self.regs.wz = self.regs.pc;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{XF, YF};
    use emu_core::{Cpu, SimpleBus};

    fn run(program: &[u8], steps: usize) -> (Z80, SimpleBus) {
        let mut bus = SimpleBus::new();
        bus.load(0, program);
        let mut cpu = Z80::new();
        for _ in 0..steps {
            cpu.step(&mut bus);
        }
        (cpu, bus)
    }

    #[test]
    fn index_halves() {
        // LD IX,0x1234 ; LD IXH,0x56 ; LD A,IXL
        let (cpu, _) = run(&[0xDD, 0x21, 0x34, 0x12, 0xDD, 0x26, 0x56, 0xDD, 0x7D], 3);
        assert_eq!(cpu.regs.ix, 0x5634);
        assert_eq!(cpu.a(), 0x34);
        // H and L untouched.
        assert_eq!(cpu.hl(), 0xFFFF);
    }

    #[test]
    fn indexed_load_uses_plain_h() {
        // LD IX,0x0100 ; LD H,(IX+2)
        let mut program = vec![0xDD, 0x21, 0x00, 0x01, 0xDD, 0x66, 0x02];
        program.resize(0x102, 0);
        program.push(0xAB);
        let (cpu, _) = run(&program, 2);
        assert_eq!(cpu.hl(), 0xABFF);
        assert_eq!(cpu.regs.wz, 0x0102);
    }

    #[test]
    fn negative_displacement() {
        // LD IY,0x0110 ; LD (IY-16),0x77
        let (_, bus) = run(&[0xFD, 0x21, 0x10, 0x01, 0xFD, 0x36, 0xF0, 0x77], 2);
        assert_eq!(bus.memory[0x0100], 0x77);
    }

    #[test]
    fn chained_prefix_switches_register() {
        // DD FD 21 nn: the FD wins.
        let (cpu, _) = run(&[0xDD, 0xFD, 0x21, 0xEF, 0xBE], 1);
        assert_eq!(cpu.regs.iy, 0xBEEF);
        assert_eq!(cpu.regs.ix, 0xFFFF);
    }

    #[test]
    fn scf_ccf_take_xy_from_a() {
        // XOR A ; LD A,0x28 ; SCF ; CCF
        let (cpu, _) = run(&[0xAF, 0x3E, 0x28, 0x37, 0x3F], 4);
        assert_eq!(cpu.f() & (XF | YF), XF | YF);
        assert_eq!(cpu.f() & (HF | CF), HF);
    }

    #[test]
    fn store_a_memptr() {
        // LD A,0x12 ; LD (0x4000),A
        let (cpu, bus) = run(&[0x3E, 0x12, 0x32, 0x00, 0x40], 2);
        assert_eq!(bus.memory[0x4000], 0x12);
        assert_eq!(cpu.regs.wz, 0x1201);
    }

    #[test]
    fn conditional_call_skipped() {
        // XOR A (Z set) ; CALL NZ,0x1234
        let (cpu, _) = run(&[0xAF, 0xC4, 0x34, 0x12], 2);
        assert_eq!(cpu.pc(), 4);
        assert_eq!(cpu.cycles().get(), 4 + 10);
    }
}
