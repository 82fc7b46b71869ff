//! Debugger support: breakpoints and their conditions.
//!
//! A condition is a whitespace-separated reverse-Polish expression over
//! integer constants (`1 2 +`, `0x10 $0F &`). It is compiled once into a
//! token stream that is guaranteed to evaluate without stack faults.

mod breakpoint;
mod condition;
mod table;

pub use breakpoint::{Breakpoint, BreakpointKind};
pub use condition::{Condition, ConditionError, STACK_SIZE, Token};
pub use table::Breakpoints;
