//! CPU core trait.

use crate::{Bus, Ticks};

/// A CPU core.
///
/// CPUs execute whole instructions and access memory through a bus passed
/// in by reference, so the bus (and every device behind it) can be shared
/// with the rest of the machine. Each T-state an instruction consumes is
/// reported to the bus through [`Bus::cycle`].
pub trait Cpu {
    /// The type used for register inspection.
    type Registers;

    /// Execute one instruction, or one interrupt acknowledge sequence.
    fn step<B: Bus>(&mut self, bus: &mut B);

    /// Address at which a step-over of the next instruction completes, or
    /// `None` when a step-over is just a single step.
    fn step_over_target<B: Bus>(&self, bus: &mut B) -> Option<u16>;

    /// Returns the current program counter.
    fn pc(&self) -> u16;

    /// Total T-states executed since reset.
    fn cycles(&self) -> Ticks;

    /// Returns a snapshot of all registers for inspection.
    fn registers(&self) -> Self::Registers;

    /// Returns true if the CPU is parked on a HALT.
    fn is_halted(&self) -> bool;

    /// Request a non-maskable interrupt, taken at the next step.
    fn nmi(&mut self);

    /// Reset the CPU to its initial state.
    fn reset(&mut self);
}
