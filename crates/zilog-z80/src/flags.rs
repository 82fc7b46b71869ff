//! Z80 flag register bits and the lookup helpers built on them.

/// Sign (bit 7).
pub const SF: u8 = 0b1000_0000;
/// Zero (bit 6).
pub const ZF: u8 = 0b0100_0000;
/// Undocumented copy of result bit 5.
pub const YF: u8 = 0b0010_0000;
/// Half carry out of bit 3 (bit 11 for 16-bit ops).
pub const HF: u8 = 0b0001_0000;
/// Undocumented copy of result bit 3.
pub const XF: u8 = 0b0000_1000;
/// Parity or overflow, depending on the instruction.
pub const PF: u8 = 0b0000_0100;
/// Set by subtractions, read by DAA.
pub const NF: u8 = 0b0000_0010;
/// Carry out of bit 7.
pub const CF: u8 = 0b0000_0001;

/// Both undocumented bits.
pub const XY: u8 = YF | XF;

/// Per-bit labels for flag display, MSB first.
pub const FLAG_NAMES: &str = "SZ5H3PNC";

/// True when `value` has an even number of set bits.
#[must_use]
pub const fn parity(value: u8) -> bool {
    value.count_ones().is_multiple_of(2)
}

/// S, Z and the two undocumented bits for a result.
#[must_use]
pub const fn sz53(value: u8) -> u8 {
    let mut f = value & (SF | XY);
    if value == 0 {
        f |= ZF;
    }
    f
}

/// [`sz53`] plus parity in PV.
#[must_use]
pub const fn sz53p(value: u8) -> u8 {
    let mut f = sz53(value);
    if parity(value) {
        f |= PF;
    }
    f
}

/// Render a flag byte as `SZ5H3PNC` letters with `-` for clear bits.
#[must_use]
pub fn describe(f: u8) -> String {
    FLAG_NAMES
        .chars()
        .enumerate()
        .map(|(i, c)| if f & (0x80 >> i) != 0 { c } else { '-' })
        .collect()
}
