//! Zilog Z80 CPU emulator.
//!
//! Each call to `step()` executes one instruction (or one interrupt
//! acknowledge). Every T-state the instruction consumes is reported to the
//! bus through `Bus::cycle()`, so devices stay locked to the CPU clock.

pub mod alu;
mod cpu;
pub mod flags;
mod registers;

pub use cpu::{Index, Z80};
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
pub use registers::{Pair, Reg8, Registers};
