//! A complete Z80 machine around the chip crates.
//!
//! [`DeviceBus`] ties banked memory, port-mapped devices and interrupt
//! lines together. [`Machine`] adds the run loop: breakpoints, frame
//! boundaries and real-time pacing. [`Controller`] moves a machine onto
//! its own thread and drives it with start/stop/step commands.

mod bus;
mod config;
mod control;
mod counter;
mod error;
mod machine;
mod memory;
mod pacing;
mod psg;

pub use bus::{DeviceBus, DeviceId, PortMapping};
pub use config::MachineConfig;
pub use control::{Command, Controller, Status};
pub use counter::Counter;
pub use error::MachineError;
pub use machine::{Machine, StopHandle, StopReason};
pub use memory::{Memory, PAGE_SIZE, Page, SLOTS};
pub use pacing::{Pace, Pacer, WallClock};
pub use psg::PsgPorts;
