//! Core traits and types for cycle-driven emulation.
//!
//! The CPU owns the clock. Every T-state it consumes is forwarded to the
//! bus, which fans it out to the devices wired behind it.

mod bus;
mod clock;
mod cpu;
mod device;
mod observable;
mod ticks;
mod timer;

pub use bus::{Bus, SimpleBus};
pub use clock::MasterClock;
pub use cpu::Cpu;
pub use device::{Device, RegisterInfo};
pub use observable::{Observable, Value};
pub use ticks::Ticks;
pub use timer::TimerSource;
