//! ED-prefixed instructions: 16-bit arithmetic, port I/O through C,
//! interrupt control and the block transfer group.

use emu_core::Bus;

use super::Z80;
use crate::alu;
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, parity, sz53, sz53p};
use crate::registers::{Pair, Reg8};

impl Z80 {
    pub(super) fn execute_ed<B: Bus>(&mut self, bus: &mut B, op: u8) {
        let y = (op >> 3) & 7;
        let p = y >> 1;

        match op {
            // IN r,(C); code 6 only sets flags.
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                let bc = self.regs.bc();
                let value = self.port_in(bus, bc);
                self.regs.set_f((self.regs.f() & CF) | sz53p(value));
                if y != 6 {
                    self.regs.set(Reg8::from_code(y), value);
                }
                self.regs.wz = bc.wrapping_add(1);
            }

            // OUT (C),r; code 6 outputs zero.
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => {
                let bc = self.regs.bc();
                let value = if y == 6 {
                    0
                } else {
                    self.regs.get(Reg8::from_code(y))
                };
                self.port_out(bus, bc, value);
                self.regs.wz = bc.wrapping_add(1);
            }

            // SBC HL,rr
            0x42 | 0x52 | 0x62 | 0x72 => {
                let hl = self.regs.hl();
                let rr = self.regs.pair(Pair::from_dd(p));
                self.internal(bus, 7);
                let (value, flags) = alu::sbc16(hl, rr, self.regs.f() & CF != 0);
                self.regs.set_hl(value);
                self.regs.set_f(flags);
                self.regs.wz = hl.wrapping_add(1);
            }

            // ADC HL,rr
            0x4A | 0x5A | 0x6A | 0x7A => {
                let hl = self.regs.hl();
                let rr = self.regs.pair(Pair::from_dd(p));
                self.internal(bus, 7);
                let (value, flags) = alu::adc16(hl, rr, self.regs.f() & CF != 0);
                self.regs.set_hl(value);
                self.regs.set_f(flags);
                self.regs.wz = hl.wrapping_add(1);
            }

            // LD (nn),rr
            0x43 | 0x53 | 0x63 | 0x73 => {
                let nn = self.fetch_word(bus);
                let value = self.regs.pair(Pair::from_dd(p));
                self.write_mem16(bus, nn, value);
                self.regs.wz = nn.wrapping_add(1);
            }

            // LD rr,(nn)
            0x4B | 0x5B | 0x6B | 0x7B => {
                let nn = self.fetch_word(bus);
                let value = self.read_mem16(bus, nn);
                self.regs.set_pair(Pair::from_dd(p), value);
                self.regs.wz = nn.wrapping_add(1);
            }

            // NEG
            0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => {
                let r = alu::sub8(0, self.regs.a(), false);
                self.regs.set_a(r.value);
                self.regs.set_f(r.flags);
            }

            // RETN / RETI: both restore IFF1 from IFF2.
            0x45 | 0x4D | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {
                self.regs.iff1 = self.regs.iff2;
                self.regs.pc = self.pop(bus);
                self.regs.wz = self.regs.pc;
            }

            // IM 0 / IM 1 / IM 2
            0x46 | 0x4E | 0x66 | 0x6E => self.regs.im = 0,
            0x56 | 0x76 => self.regs.im = 1,
            0x5E | 0x7E => self.regs.im = 2,

            // LD I,A
            0x47 => {
                self.internal(bus, 1);
                self.regs.i = self.regs.a();
            }

            // LD R,A
            0x4F => {
                self.internal(bus, 1);
                let a = self.regs.a();
                self.regs.r = a & 0x7F;
                self.regs.r7 = a & 0x80;
            }

            // LD A,I / LD A,R: PV reports IFF2.
            0x57 | 0x5F => {
                self.internal(bus, 1);
                let value = if op == 0x57 {
                    self.regs.i
                } else {
                    self.regs.refresh()
                };
                self.regs.set_a(value);
                let pv = if self.regs.iff2 { PF } else { 0 };
                self.regs.set_f((self.regs.f() & CF) | sz53(value) | pv);
            }

            // RRD / RLD
            0x67 | 0x6F => {
                let hl = self.regs.hl();
                let mem = self.read_mem(bus, hl);
                self.internal(bus, 4);
                let a = self.regs.a();
                let (new_a, new_mem) = if op == 0x67 {
                    ((a & 0xF0) | (mem & 0x0F), (a << 4) | (mem >> 4))
                } else {
                    ((a & 0xF0) | (mem >> 4), (mem << 4) | (a & 0x0F))
                };
                self.regs.set_a(new_a);
                self.write_mem(bus, hl, new_mem);
                self.regs.set_f((self.regs.f() & CF) | sz53p(new_a));
                self.regs.wz = hl.wrapping_add(1);
            }

            // LDI / LDD / LDIR / LDDR
            0xA0 | 0xA8 | 0xB0 | 0xB8 => self.block_load(bus, op),

            // CPI / CPD / CPIR / CPDR
            0xA1 | 0xA9 | 0xB1 | 0xB9 => self.block_compare(bus, op),

            // INI / IND / INIR / INDR
            0xA2 | 0xAA | 0xB2 | 0xBA => self.block_in(bus, op),

            // OUTI / OUTD / OTIR / OTDR
            0xA3 | 0xAB | 0xB3 | 0xBB => self.block_out(bus, op),

            // Everything else behaves as an 8 T-state NOP.
            _ => {}
        }
    }

    /// Address step for a block instruction: bit 3 selects decrement.
    const fn block_delta(op: u8) -> i16 {
        if op & 0x08 == 0 { 1 } else { -1 }
    }

    /// Bit 4 selects the repeating form.
    const fn block_repeats(op: u8) -> bool {
        op & 0x10 != 0
    }

    /// Rewind PC onto the ED prefix so the next step runs the instruction
    /// again.
    fn block_repeat<B: Bus>(&mut self, bus: &mut B) {
        self.internal(bus, 5);
        self.regs.pc = self.regs.pc.wrapping_sub(2);
        self.regs.wz = self.regs.pc.wrapping_add(1);
    }

    fn block_load<B: Bus>(&mut self, bus: &mut B, op: u8) {
        let delta = Self::block_delta(op);
        let hl = self.regs.hl();
        let de = self.regs.de();
        let value = self.read_mem(bus, hl);
        self.write_mem(bus, de, value);
        self.internal(bus, 2);

        self.regs.set_hl(hl.wrapping_add_signed(delta));
        self.regs.set_de(de.wrapping_add_signed(delta));
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);

        let n = value.wrapping_add(self.regs.a());
        let mut f = (self.regs.f() & (SF | ZF | CF)) | (n & XF) | ((n << 4) & YF);
        if bc != 0 {
            f |= PF;
        }
        self.regs.set_f(f);

        if Self::block_repeats(op) && bc != 0 {
            self.block_repeat(bus);
        }
    }

    fn block_compare<B: Bus>(&mut self, bus: &mut B, op: u8) {
        let delta = Self::block_delta(op);
        let hl = self.regs.hl();
        let value = self.read_mem(bus, hl);
        self.internal(bus, 5);

        let a = self.regs.a();
        let result = a.wrapping_sub(value);
        let half = (a & 0x0F) < (value & 0x0F);
        let n = result.wrapping_sub(u8::from(half));

        self.regs.set_hl(hl.wrapping_add_signed(delta));
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);
        self.regs.wz = self.regs.wz.wrapping_add_signed(delta);

        let mut f = (self.regs.f() & CF) | NF | (result & SF) | (n & XF) | ((n << 4) & YF);
        if result == 0 {
            f |= ZF;
        }
        if half {
            f |= HF;
        }
        if bc != 0 {
            f |= PF;
        }
        self.regs.set_f(f);

        if Self::block_repeats(op) && bc != 0 && result != 0 {
            self.block_repeat(bus);
        }
    }

    /// Flags shared by the block I/O group. `k` is the transferred byte
    /// plus the adjusted C (input) or the new L (output).
    fn block_io_flags(&mut self, value: u8, k: u16) {
        let b = self.regs.get(Reg8::B);
        let mut f = sz53(b);
        if value & 0x80 != 0 {
            f |= NF;
        }
        if k > 0xFF {
            f |= HF | CF;
        }
        if parity((k as u8 & 7) ^ b) {
            f |= PF;
        }
        self.regs.set_f(f);
    }

    fn block_in<B: Bus>(&mut self, bus: &mut B, op: u8) {
        let delta = Self::block_delta(op);
        self.internal(bus, 1);
        let bc = self.regs.bc();
        let value = self.port_in(bus, bc);
        let hl = self.regs.hl();
        self.write_mem(bus, hl, value);

        self.regs.wz = bc.wrapping_add_signed(delta);
        let b = self.regs.get(Reg8::B).wrapping_sub(1);
        self.regs.set(Reg8::B, b);
        self.regs.set_hl(hl.wrapping_add_signed(delta));

        let c = self.regs.get(Reg8::C).wrapping_add_signed(delta as i8);
        self.block_io_flags(value, u16::from(value) + u16::from(c));

        if Self::block_repeats(op) && b != 0 {
            self.block_repeat(bus);
        }
    }

    fn block_out<B: Bus>(&mut self, bus: &mut B, op: u8) {
        let delta = Self::block_delta(op);
        self.internal(bus, 1);
        let hl = self.regs.hl();
        let value = self.read_mem(bus, hl);
        let b = self.regs.get(Reg8::B).wrapping_sub(1);
        self.regs.set(Reg8::B, b);
        let bc = self.regs.bc();
        self.port_out(bus, bc, value);

        self.regs.set_hl(hl.wrapping_add_signed(delta));
        self.regs.wz = bc.wrapping_add_signed(delta);

        let l = self.regs.get(Reg8::L);
        self.block_io_flags(value, u16::from(value) + u16::from(l));

        if Self::block_repeats(op) && b != 0 {
            self.block_repeat(bus);
        }
    }
}
