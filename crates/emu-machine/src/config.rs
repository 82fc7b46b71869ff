//! Machine configuration.

use std::fs;
use std::path::Path;

use emu_core::{MasterClock, Ticks};
use serde::{Deserialize, Serialize};

use crate::MachineError;

/// Clock, frame rate and pacing parameters of a machine.
///
/// Every field has a default, so a JSON file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// CPU clock in Hz.
    pub cpu_hz: u64,
    /// Display frames per second. Pacing happens once per frame.
    pub frames_per_second: u64,
    /// Consecutive late frames tolerated before a hard resync.
    pub max_frame_skip: u32,
    /// Longest wait, in milliseconds, for a lagging timer before resyncing it.
    pub max_resync_ms: u64,
    /// Allowed jitter in milliseconds when no external timer is attached.
    pub deviation_ms: u64,
    /// Pace against the wall clock. When false the machine runs flat out.
    pub real_time: bool,
    /// Emit per-frame pacing records on the `emu_machine::timing` log target.
    pub trace_timing: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            cpu_hz: 4_000_000,
            frames_per_second: 50,
            max_frame_skip: 20,
            max_resync_ms: 200,
            deviation_ms: 200,
            real_time: true,
            trace_timing: false,
        }
    }
}

impl MachineConfig {
    pub fn from_json(text: &str) -> Result<Self, MachineError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, MachineError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    #[must_use]
    pub fn clock(&self) -> MasterClock {
        MasterClock::new(self.cpu_hz.max(1))
    }

    /// CPU ticks in one display frame.
    #[must_use]
    pub fn ticks_per_frame(&self) -> Ticks {
        let ticks = self.clock().ticks_per_frame(self.frames_per_second.max(1));
        Ticks::new(ticks.get().max(1))
    }
}
