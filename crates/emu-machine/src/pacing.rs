//! Real-time pacing.
//!
//! Once per emulated frame the harness compares how far emulation has got
//! with how far the timer has moved:
//!
//! - far ahead (beyond twice the deviation): re-anchor on the timer;
//! - behind: skip rendering, up to `max_frame_skip` frames in a row, then
//!   give up catching up and resync the timer;
//! - otherwise: sleep in 1 ms slices until the timer catches up, resyncing
//!   a timer that stalls for longer than `max_resync_ms`.

use std::thread;
use std::time::{Duration, Instant};

use emu_core::{MasterClock, Ticks, TimerSource};
use log::{debug, trace, warn};

use crate::MachineConfig;

const TIMING: &str = "emu_machine::timing";

/// Millisecond wall clock used when no audio timer paces the machine.
pub struct WallClock {
    start: Instant,
    updates: u64,
    deviation: u64,
}

impl WallClock {
    #[must_use]
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            start: Instant::now(),
            updates: 1000 / config.frames_per_second.max(1),
            deviation: config.deviation_ms,
        }
    }
}

impl TimerSource for WallClock {
    fn count(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn updates(&self) -> u64 {
        self.updates
    }

    fn deviation(&self) -> u64 {
        self.deviation
    }

    fn rate(&self) -> u64 {
        1000
    }

    fn resync(&mut self) {
        self.start = Instant::now();
    }
}

/// Outcome of pacing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Emulation was ahead or level; waited for the timer.
    OnTime,
    /// Emulation is late; this frame should not be rendered.
    Behind,
    /// Too late for too long, or the timer stalled: timer re-anchored.
    Resynced,
    /// Emulation ran far ahead of the timer: reference time moved back.
    Reanchored,
}

pub struct Pacer {
    timer: Option<Box<dyn TimerSource>>,
    epoch: Instant,
    clock: MasterClock,
    start_time: u64,
    start_cycles: Ticks,
    frame_skip: u32,
    max_frame_skip: u32,
    max_resync: Duration,
    deviation: u64,
    trace: bool,
}

impl Pacer {
    #[must_use]
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            timer: None,
            epoch: Instant::now(),
            clock: config.clock(),
            start_time: 0,
            start_cycles: Ticks::ZERO,
            frame_skip: 0,
            max_frame_skip: config.max_frame_skip,
            max_resync: Duration::from_millis(config.max_resync_ms),
            deviation: config.deviation_ms,
            trace: config.trace_timing,
        }
    }

    /// Pace against `timer` instead of emulated-cycle milliseconds.
    pub fn set_timer(&mut self, timer: Box<dyn TimerSource>) {
        self.timer = Some(timer);
    }

    fn now(&self) -> u64 {
        match &self.timer {
            Some(timer) => timer.count(),
            None => self.epoch.elapsed().as_millis() as u64,
        }
    }

    /// Anchor the reference point at the start of a run.
    pub fn start(&mut self, cycles: Ticks) {
        self.start_cycles = cycles;
        self.start_time = self.now();
        self.frame_skip = 0;
    }

    /// Consecutive frames that came in late. Zero means the frame is
    /// worth rendering.
    #[must_use]
    pub fn frame_skip(&self) -> u32 {
        self.frame_skip
    }

    /// Pace the frame that ends at `cycles`.
    pub fn frame(&mut self, cycles: Ticks) -> Pace {
        let (count, deviation) = match &self.timer {
            Some(timer) => (timer.updates(), timer.deviation()),
            None => (
                self.clock.millis(cycles.since(self.start_cycles)),
                self.deviation,
            ),
        };
        self.start_time += count;
        self.start_cycles = cycles;
        let time = self.now();
        if self.trace {
            trace!(
                target: TIMING,
                "frame: expected {} now {time} deviation {deviation} cycles {cycles}",
                self.start_time
            );
        }

        if time < self.start_time.saturating_sub(deviation * 2) {
            debug!(
                target: TIMING,
                "ahead by {}ms, re-anchoring",
                self.start_time - time
            );
            self.frame_skip = 0;
            self.start_time = time;
            Pace::Reanchored
        } else if time > self.start_time {
            if self.frame_skip >= self.max_frame_skip {
                warn!(
                    "timing: {} frames late, resynchronising ({}ms behind)",
                    self.frame_skip,
                    time - self.start_time
                );
                self.resync();
                Pace::Resynced
            } else {
                self.frame_skip += 1;
                if self.trace {
                    trace!(target: TIMING, "skip {}", self.frame_skip);
                }
                Pace::Behind
            }
        } else {
            self.frame_skip = 0;
            self.wait()
        }
    }

    fn resync(&mut self) {
        self.frame_skip = 0;
        if let Some(timer) = &mut self.timer {
            timer.resync();
        }
        self.start_time = self.now();
    }

    fn wait(&mut self) -> Pace {
        let started = Instant::now();
        let mut slices = 0u32;
        while self.now() < self.start_time {
            if self.timer.is_some() && started.elapsed() > self.max_resync {
                warn!("timing: timer stalled for {:?}, resynchronising", self.max_resync);
                self.resync();
                return Pace::Resynced;
            }
            thread::sleep(Duration::from_millis(1));
            slices += 1;
        }
        if self.trace {
            trace!(target: TIMING, "waited {slices} slices");
        }
        Pace::OnTime
    }
}
