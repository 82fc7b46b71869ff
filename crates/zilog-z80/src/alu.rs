//! Z80 arithmetic and logic.
//!
//! Every function is pure: it takes operands (and the incoming carry where
//! relevant) and returns the result with a complete flag byte. Callers that
//! preserve some flags mask them in themselves.

#![allow(clippy::cast_possible_truncation)] // Intentional truncation to the low byte.

use crate::flags::{CF, HF, NF, PF, SF, XY, ZF, sz53, sz53p};

/// Result of an 8-bit ALU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    pub flags: u8,
}

impl AluResult {
    const fn new(value: u8, flags: u8) -> Self {
        Self { value, flags }
    }
}

/// ADD/ADC.
#[must_use]
pub fn add8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let wide = u16::from(a) + u16::from(b) + u16::from(c);
    let value = wide as u8;

    let mut flags = sz53(value);
    if (a & 0x0F) + (b & 0x0F) + c > 0x0F {
        flags |= HF;
    }
    if (a ^ b) & 0x80 == 0 && (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if wide > 0xFF {
        flags |= CF;
    }
    AluResult::new(value, flags)
}

/// SUB/SBC.
#[must_use]
pub fn sub8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let value = a.wrapping_sub(b).wrapping_sub(c);

    let mut flags = sz53(value) | NF;
    if (a & 0x0F) < (b & 0x0F) + c {
        flags |= HF;
    }
    if (a ^ b) & 0x80 != 0 && (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if u16::from(a) < u16::from(b) + u16::from(c) {
        flags |= CF;
    }
    AluResult::new(value, flags)
}

/// AND: H always set, PV is parity.
#[must_use]
pub fn and8(a: u8, b: u8) -> AluResult {
    let value = a & b;
    AluResult::new(value, sz53p(value) | HF)
}

#[must_use]
pub fn or8(a: u8, b: u8) -> AluResult {
    let value = a | b;
    AluResult::new(value, sz53p(value))
}

#[must_use]
pub fn xor8(a: u8, b: u8) -> AluResult {
    let value = a ^ b;
    AluResult::new(value, sz53p(value))
}

/// CP: flags of `a - b`, undocumented bits taken from the operand.
/// The returned value is `a` unchanged.
#[must_use]
pub fn cp8(a: u8, b: u8) -> AluResult {
    let diff = sub8(a, b, false);
    AluResult::new(a, (diff.flags & !XY) | (b & XY))
}

/// One of the eight accumulator operations selected by opcode bits 5-3:
/// ADD, ADC, SUB, SBC, AND, XOR, OR, CP.
#[must_use]
pub fn alu_op(op: u8, a: u8, b: u8, f: u8) -> AluResult {
    let carry = f & CF != 0;
    match op & 7 {
        0 => add8(a, b, false),
        1 => add8(a, b, carry),
        2 => sub8(a, b, false),
        3 => sub8(a, b, carry),
        4 => and8(a, b),
        5 => xor8(a, b),
        6 => or8(a, b),
        _ => cp8(a, b),
    }
}

/// INC: carry is not produced, the caller keeps the old CF.
#[must_use]
pub fn inc8(a: u8) -> AluResult {
    let value = a.wrapping_add(1);
    let mut flags = sz53(value);
    if a & 0x0F == 0x0F {
        flags |= HF;
    }
    if a == 0x7F {
        flags |= PF;
    }
    AluResult::new(value, flags)
}

/// DEC: carry is not produced, the caller keeps the old CF.
#[must_use]
pub fn dec8(a: u8) -> AluResult {
    let value = a.wrapping_sub(1);
    let mut flags = sz53(value) | NF;
    if a & 0x0F == 0 {
        flags |= HF;
    }
    if a == 0x80 {
        flags |= PF;
    }
    AluResult::new(value, flags)
}

fn shifted(value: u8, carry_out: bool) -> AluResult {
    AluResult::new(value, sz53p(value) | if carry_out { CF } else { 0 })
}

#[must_use]
pub fn rlc8(a: u8) -> AluResult {
    shifted(a.rotate_left(1), a & 0x80 != 0)
}

#[must_use]
pub fn rrc8(a: u8) -> AluResult {
    shifted(a.rotate_right(1), a & 1 != 0)
}

#[must_use]
pub fn rl8(a: u8, carry: bool) -> AluResult {
    shifted((a << 1) | u8::from(carry), a & 0x80 != 0)
}

#[must_use]
pub fn rr8(a: u8, carry: bool) -> AluResult {
    shifted((a >> 1) | (u8::from(carry) << 7), a & 1 != 0)
}

#[must_use]
pub fn sla8(a: u8) -> AluResult {
    shifted(a << 1, a & 0x80 != 0)
}

#[must_use]
pub fn sra8(a: u8) -> AluResult {
    shifted((a >> 1) | (a & 0x80), a & 1 != 0)
}

/// Undocumented SLL: shifts a 1 into bit 0.
#[must_use]
pub fn sll8(a: u8) -> AluResult {
    shifted((a << 1) | 1, a & 0x80 != 0)
}

#[must_use]
pub fn srl8(a: u8) -> AluResult {
    shifted(a >> 1, a & 1 != 0)
}

/// CB-prefix rotate/shift selected by opcode bits 5-3:
/// RLC, RRC, RL, RR, SLA, SRA, SLL, SRL.
#[must_use]
pub fn shift_op(op: u8, a: u8, f: u8) -> AluResult {
    let carry = f & CF != 0;
    match op & 7 {
        0 => rlc8(a),
        1 => rrc8(a),
        2 => rl8(a, carry),
        3 => rr8(a, carry),
        4 => sla8(a),
        5 => sra8(a),
        6 => sll8(a),
        _ => srl8(a),
    }
}

/// RLCA, RRCA, RLA, RRA (selected by opcode bits 4-3).
///
/// Same rotation as the CB forms but S, Z and PV survive, H and N clear,
/// and the undocumented bits come from the new accumulator.
#[must_use]
pub fn rotate_acc(op: u8, a: u8, f: u8) -> AluResult {
    let r = match op & 3 {
        0 => rlc8(a),
        1 => rrc8(a),
        2 => rl8(a, f & CF != 0),
        _ => rr8(a, f & CF != 0),
    };
    AluResult::new(r.value, (f & (SF | ZF | PF)) | (r.value & XY) | (r.flags & CF))
}

/// DAA: decimal adjust after an add or subtract, as selected by NF.
#[must_use]
pub fn daa(a: u8, f: u8) -> AluResult {
    let subtract = f & NF != 0;
    let half = f & HF != 0;
    let mut carry = f & CF != 0;

    let mut correction = 0u8;
    if half || a & 0x0F > 9 {
        correction |= 0x06;
    }
    if carry || a > 0x99 {
        correction |= 0x60;
        carry = true;
    }

    let value = if subtract {
        a.wrapping_sub(correction)
    } else {
        a.wrapping_add(correction)
    };
    let new_half = if subtract {
        half && a & 0x0F < 6
    } else {
        a & 0x0F > 9
    };

    let mut flags = sz53p(value) | (f & NF);
    if carry {
        flags |= CF;
    }
    if new_half {
        flags |= HF;
    }
    AluResult::new(value, flags)
}

/// ADD HL,rr (and IX/IY): only H, C and the undocumented bits change.
/// Returns the sum and those four flag bits.
#[must_use]
pub fn add16(a: u16, b: u16) -> (u16, u8) {
    let wide = u32::from(a) + u32::from(b);
    let value = wide as u16;

    let mut flags = ((value >> 8) as u8) & XY;
    if (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF {
        flags |= HF;
    }
    if wide > 0xFFFF {
        flags |= CF;
    }
    (value, flags)
}

/// ADC HL,rr with the full flag byte.
#[must_use]
pub fn adc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let wide = u32::from(a) + u32::from(b) + u32::from(c);
    let value = wide as u16;

    let mut flags = word_flags(value);
    if (a & 0x0FFF) + (b & 0x0FFF) + c > 0x0FFF {
        flags |= HF;
    }
    if (a ^ b) & 0x8000 == 0 && (a ^ value) & 0x8000 != 0 {
        flags |= PF;
    }
    if wide > 0xFFFF {
        flags |= CF;
    }
    (value, flags)
}

/// SBC HL,rr with the full flag byte.
#[must_use]
pub fn sbc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let value = a.wrapping_sub(b).wrapping_sub(c);

    let mut flags = word_flags(value) | NF;
    if (a & 0x0FFF) < (b & 0x0FFF) + c {
        flags |= HF;
    }
    if (a ^ b) & 0x8000 != 0 && (a ^ value) & 0x8000 != 0 {
        flags |= PF;
    }
    if u32::from(a) < u32::from(b) + u32::from(c) {
        flags |= CF;
    }
    (value, flags)
}

fn word_flags(value: u16) -> u8 {
    let mut f = ((value >> 8) as u8) & (SF | XY);
    if value == 0 {
        f |= ZF;
    }
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{XF, YF};

    #[test]
    fn add_overflow_and_half_carry() {
        let r = add8(0x7F, 0x01, false);
        assert_eq!(r.value, 0x80);
        assert_eq!(r.flags, SF | HF | PF);

        let r = add8(0xFF, 0x01, false);
        assert_eq!(r.value, 0);
        assert_eq!(r.flags, ZF | HF | CF);
    }

    #[test]
    fn sub_borrow() {
        let r = sub8(0x00, 0x01, false);
        assert_eq!(r.value, 0xFF);
        assert_eq!(r.flags, SF | YF | HF | XF | NF | CF);

        let r = sub8(0x80, 0x01, false);
        assert_eq!(r.value, 0x7F);
        assert_eq!(r.flags & PF, PF);
    }

    #[test]
    fn cp_takes_undocumented_bits_from_operand() {
        let r = cp8(0x00, 0x28);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.flags & XY, 0x28);
    }

    #[test]
    fn daa_after_bcd_add() {
        // 0x15 + 0x27 = 0x3C, adjusted to 0x42.
        let sum = add8(0x15, 0x27, false);
        let r = daa(sum.value, sum.flags);
        assert_eq!(r.value, 0x42);
        assert_eq!(r.flags & CF, 0);

        // 0x99 + 0x01 = 0x9A, adjusted to 0x00 with carry.
        let sum = add8(0x99, 0x01, false);
        let r = daa(sum.value, sum.flags);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.flags & (ZF | CF), ZF | CF);
    }

    #[test]
    fn daa_after_bcd_subtract() {
        // 0x42 - 0x15 = 0x2D, adjusted to 0x27.
        let diff = sub8(0x42, 0x15, false);
        let r = daa(diff.value, diff.flags);
        assert_eq!(r.value, 0x27);
        assert_eq!(r.flags & NF, NF);
    }

    #[test]
    fn rotate_accumulator_keeps_szp() {
        let r = rotate_acc(0, 0x80, SF | ZF | PF | HF | NF);
        assert_eq!(r.value, 0x01);
        assert_eq!(r.flags, SF | ZF | PF | CF);
    }

    #[test]
    fn sll_sets_bit_zero() {
        let r = sll8(0x80);
        assert_eq!(r.value, 0x01);
        assert_eq!(r.flags & CF, CF);
    }

    #[test]
    fn sixteen_bit_flags() {
        assert_eq!(add16(0x0FFF, 0x0001), (0x1000, HF));
        assert_eq!(adc16(0xFFFF, 0x0000, true), (0x0000, ZF | HF | CF));
        let (v, f) = sbc16(0x8000, 0x0001, false);
        assert_eq!(v, 0x7FFF);
        assert_eq!(f & (PF | NF | HF), PF | NF | HF);
    }
}
