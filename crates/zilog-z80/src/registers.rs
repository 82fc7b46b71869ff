//! Z80 register file.

#![allow(clippy::cast_possible_truncation)] // Intentional truncation to the low byte.

/// 8-bit registers, main set followed by the alternate set.
///
/// The first eight follow the 3-bit operand encoding used by the
/// instruction set, with F standing in the slot that encodes `(HL)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg8 {
    B,
    C,
    D,
    E,
    H,
    L,
    F,
    A,
    B2,
    C2,
    D2,
    E2,
    H2,
    L2,
    F2,
    A2,
}

impl Reg8 {
    const MAIN: [Self; 8] = [
        Self::B,
        Self::C,
        Self::D,
        Self::E,
        Self::H,
        Self::L,
        Self::F,
        Self::A,
    ];

    /// Register for a 3-bit operand field. Code 6 (memory) maps to F.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        Self::MAIN[(code & 7) as usize]
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// 16-bit register pairs addressable by instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pair {
    BC,
    DE,
    HL,
    AF,
    SP,
}

impl Pair {
    /// The `dd` encoding (bits 5-4) used by LD rr,nn / INC rr / ADD HL,rr.
    #[must_use]
    pub const fn from_dd(code: u8) -> Self {
        match code & 3 {
            0 => Self::BC,
            1 => Self::DE,
            2 => Self::HL,
            _ => Self::SP,
        }
    }

    /// The `qq` encoding (bits 5-4) used by PUSH and POP.
    #[must_use]
    pub const fn from_qq(code: u8) -> Self {
        match code & 3 {
            0 => Self::BC,
            1 => Self::DE,
            2 => Self::HL,
            _ => Self::AF,
        }
    }
}

/// Complete Z80 register state. Also serves as the inspection snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)] // Mirrors the CPU's flip-flops.
pub struct Registers {
    bank: [u8; 16],
    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
    pub i: u8,
    /// Refresh counter. Only the low 7 bits count; see [`Self::refresh`].
    pub r: u8,
    /// Bit 7 of R as last written by `LD R,A`.
    pub r7: u8,
    pub im: u8,
    /// Internal MEMPTR register, visible through BIT n,(HL) flags.
    pub wz: u16,
    pub iff1: bool,
    pub iff2: bool,
    pub halted: bool,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            bank: [0xFF; 16],
            ix: 0xFFFF,
            iy: 0xFFFF,
            sp: 0xFFFF,
            pc: 0,
            i: 0,
            r: 0,
            r7: 0,
            im: 0,
            wz: 0,
            iff1: false,
            iff2: false,
            halted: false,
        }
    }
}

const fn join(hi: u8, lo: u8) -> u16 {
    (hi as u16) << 8 | lo as u16
}

impl Registers {
    #[must_use]
    pub const fn get(&self, reg: Reg8) -> u8 {
        self.bank[reg.index()]
    }

    pub fn set(&mut self, reg: Reg8, value: u8) {
        self.bank[reg.index()] = value;
    }

    #[must_use]
    pub const fn a(&self) -> u8 {
        self.get(Reg8::A)
    }

    #[must_use]
    pub const fn f(&self) -> u8 {
        self.get(Reg8::F)
    }

    pub fn set_a(&mut self, value: u8) {
        self.set(Reg8::A, value);
    }

    pub fn set_f(&mut self, value: u8) {
        self.set(Reg8::F, value);
    }

    #[must_use]
    pub const fn af(&self) -> u16 {
        join(self.a(), self.f())
    }

    #[must_use]
    pub const fn bc(&self) -> u16 {
        join(self.get(Reg8::B), self.get(Reg8::C))
    }

    #[must_use]
    pub const fn de(&self) -> u16 {
        join(self.get(Reg8::D), self.get(Reg8::E))
    }

    #[must_use]
    pub const fn hl(&self) -> u16 {
        join(self.get(Reg8::H), self.get(Reg8::L))
    }

    #[must_use]
    pub const fn af_alt(&self) -> u16 {
        join(self.get(Reg8::A2), self.get(Reg8::F2))
    }

    #[must_use]
    pub const fn bc_alt(&self) -> u16 {
        join(self.get(Reg8::B2), self.get(Reg8::C2))
    }

    #[must_use]
    pub const fn de_alt(&self) -> u16 {
        join(self.get(Reg8::D2), self.get(Reg8::E2))
    }

    #[must_use]
    pub const fn hl_alt(&self) -> u16 {
        join(self.get(Reg8::H2), self.get(Reg8::L2))
    }

    fn set_halves(&mut self, hi: Reg8, lo: Reg8, value: u16) {
        self.set(hi, (value >> 8) as u8);
        self.set(lo, value as u8);
    }

    pub fn set_af(&mut self, value: u16) {
        self.set_halves(Reg8::A, Reg8::F, value);
    }

    pub fn set_bc(&mut self, value: u16) {
        self.set_halves(Reg8::B, Reg8::C, value);
    }

    pub fn set_de(&mut self, value: u16) {
        self.set_halves(Reg8::D, Reg8::E, value);
    }

    pub fn set_hl(&mut self, value: u16) {
        self.set_halves(Reg8::H, Reg8::L, value);
    }

    #[must_use]
    pub const fn pair(&self, pair: Pair) -> u16 {
        match pair {
            Pair::BC => self.bc(),
            Pair::DE => self.de(),
            Pair::HL => self.hl(),
            Pair::AF => self.af(),
            Pair::SP => self.sp,
        }
    }

    pub fn set_pair(&mut self, pair: Pair, value: u16) {
        match pair {
            Pair::BC => self.set_bc(value),
            Pair::DE => self.set_de(value),
            Pair::HL => self.set_hl(value),
            Pair::AF => self.set_af(value),
            Pair::SP => self.sp = value,
        }
    }

    /// EX AF,AF'.
    pub fn ex_af(&mut self) {
        self.bank.swap(Reg8::A.index(), Reg8::A2.index());
        self.bank.swap(Reg8::F.index(), Reg8::F2.index());
    }

    /// EXX: swap BC, DE and HL with their shadows.
    pub fn exx(&mut self) {
        for reg in 0..6 {
            self.bank.swap(reg, reg + 8);
        }
    }

    /// R as software sees it: seven counting bits plus the stored bit 7.
    #[must_use]
    pub const fn refresh(&self) -> u8 {
        (self.r & 0x7F) | self.r7
    }

    /// Count one M1 cycle.
    pub fn inc_r(&mut self) {
        self.r = self.r.wrapping_add(1) & 0x7F;
    }
}
