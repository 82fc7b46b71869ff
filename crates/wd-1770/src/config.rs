//! Controller timing, in CPU clock ticks.

use serde::{Deserialize, Serialize};

/// Timing parameters for a [`Wd1770`](crate::Wd1770).
///
/// Defaults assume the controller is clocked at the CPU rate of a 2-4 MHz
/// machine, matching the WD1770's 6/12/20/30 ms step rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Wd1770Config {
    /// Ticks per head step, selected by command bits 0-1.
    pub step_rates: [u32; 4],
    /// Head settle time added when a command sets its settle/verify bit.
    pub settle: u32,
    /// Spin-up delay before a command executes with the motor off.
    pub motor_on_delay: u32,
    /// Idle time after a command before the motor turns off.
    pub motor_off_delay: u32,
    /// Ticks between data bytes during a sector transfer.
    pub drq_interval: u32,
}

impl Default for Wd1770Config {
    fn default() -> Self {
        Self {
            step_rates: [6000, 12000, 20000, 30000],
            settle: 30000,
            motor_on_delay: 500_000,
            motor_off_delay: 1_500_000,
            drq_interval: 50,
        }
    }
}
