//! Master clock configuration.

use crate::Ticks;

/// Master clock configuration for a system.
///
/// The CPU clock drives all timing. Devices that run slower divide it down
/// internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterClock {
    /// Crystal frequency in Hz (e.g., `4_000_000` for a 4 MHz Z80).
    pub frequency_hz: u64,
}

impl MasterClock {
    #[must_use]
    pub const fn new(frequency_hz: u64) -> Self {
        Self { frequency_hz }
    }

    /// Ticks per frame at the given frame rate (integer division).
    #[must_use]
    pub const fn ticks_per_frame(&self, frames_per_second: u64) -> Ticks {
        Ticks::new(self.frequency_hz / frames_per_second)
    }

    /// Wall-clock milliseconds represented by `ticks`, rounded to nearest.
    #[must_use]
    pub const fn millis(&self, ticks: Ticks) -> u64 {
        (ticks.get() * 2000 / self.frequency_hz).div_ceil(2)
    }
}
