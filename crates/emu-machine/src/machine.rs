//! A CPU, its bus and the run loop that drives them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use emu_core::{Cpu, Ticks, TimerSource};
use emu_debug::{Breakpoint, BreakpointKind, Breakpoints};
use log::{debug, info};

use crate::bus::DeviceBus;
use crate::config::MachineConfig;
use crate::pacing::Pacer;

/// Why a run, step or reset returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// About to execute at a breakpoint whose condition held.
    Breakpoint { address: u16, kind: BreakpointKind },
    /// Reached the address given to `run_to`.
    Address(u16),
    /// A stop was requested through a [`StopHandle`].
    Requested,
    /// The requested number of frames completed.
    Frames,
    /// A single step completed.
    Step,
    Reset,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Breakpoint { address, kind } => write!(f, "{kind} breakpoint at {address:#06X}"),
            Self::Address(address) => write!(f, "reached {address:#06X}"),
            Self::Requested => f.write_str("stopped"),
            Self::Frames => f.write_str("frames complete"),
            Self::Step => f.write_str("step"),
            Self::Reset => f.write_str("reset"),
        }
    }
}

/// Requests a running machine to stop at the next instruction boundary.
/// Safe to use from any thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Withdraw a request that nobody consumed.
    pub fn cancel(&self) {
        self.0.store(false, Ordering::Release);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

type FrameCallback<C> = Box<dyn FnMut(&C, &DeviceBus) + Send>;

/// A machine: CPU, bus, breakpoints and the frame/pacing harness.
///
/// All emulation happens on the thread that owns the machine. Other threads
/// interact through a [`StopHandle`] or the [`crate::Controller`].
pub struct Machine<C: Cpu> {
    cpu: C,
    bus: DeviceBus,
    config: MachineConfig,
    breakpoints: Breakpoints,
    pacer: Pacer,
    stop: StopHandle,
    ticks_per_frame: Ticks,
    next_frame: Ticks,
    frames: u64,
    on_frame: Option<FrameCallback<C>>,
}

impl<C: Cpu> Machine<C> {
    pub fn new(cpu: C, bus: DeviceBus, config: MachineConfig) -> Self {
        let ticks_per_frame = config.ticks_per_frame();
        let next_frame = cpu.cycles() + ticks_per_frame;
        Self {
            cpu,
            bus,
            pacer: Pacer::new(&config),
            config,
            breakpoints: Breakpoints::new(),
            stop: StopHandle::default(),
            ticks_per_frame,
            next_frame,
            frames: 0,
            on_frame: None,
        }
    }

    /// Pace against an external timer, typically the audio device.
    #[must_use]
    pub fn with_timer(mut self, timer: Box<dyn TimerSource>) -> Self {
        self.pacer.set_timer(timer);
        self
    }

    /// Called at the end of every frame that is not skipped.
    pub fn on_frame(&mut self, callback: impl FnMut(&C, &DeviceBus) + Send + 'static) {
        self.on_frame = Some(Box::new(callback));
    }

    #[must_use]
    pub fn cpu(&self) -> &C {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut C {
        &mut self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &DeviceBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut DeviceBus {
        &mut self.bus
    }

    #[must_use]
    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    pub fn breakpoints_mut(&mut self) -> &mut Breakpoints {
        &mut self.breakpoints
    }

    #[must_use]
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Frames completed since construction.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Reset the CPU and every device. Memory is kept.
    pub fn reset(&mut self) -> StopReason {
        info!("machine: reset");
        self.cpu.reset();
        self.bus.reset();
        StopReason::Reset
    }

    /// Execute one instruction (or interrupt acknowledge).
    pub fn step(&mut self) -> StopReason {
        self.cpu.step(&mut self.bus);
        self.end_of_frame(false);
        debug!("machine: step to {:#06X}", self.cpu.pc());
        StopReason::Step
    }

    /// Step over calls, halts and block repeats: run until the instruction
    /// after the current one. Anything else is a single step.
    pub fn step_over(&mut self) -> StopReason {
        let Some(target) = self.cpu.step_over_target(&mut self.bus) else {
            return self.step();
        };
        self.breakpoints
            .add(Breakpoint::new(target, BreakpointKind::StepOver));
        let reason = self.execute(None, None);
        // Gone already if it was the one that stopped us.
        self.breakpoints.remove(target, BreakpointKind::StepOver);
        reason
    }

    /// Run until a breakpoint fires or a stop is requested.
    pub fn run(&mut self) -> StopReason {
        self.execute(None, None)
    }

    /// Run until the program counter reaches `address`. Returns at once if
    /// it is already there.
    pub fn run_to(&mut self, address: u16) -> StopReason {
        self.execute(Some(address), None)
    }

    /// Run `count` whole frames.
    pub fn run_frames(&mut self, count: u64) -> StopReason {
        if count == 0 {
            return StopReason::Frames;
        }
        self.execute(None, Some(count))
    }

    fn execute(&mut self, target: Option<u16>, frame_limit: Option<u64>) -> StopReason {
        info!("machine: run from {:#06X}", self.cpu.pc());
        self.pacer.start(self.cpu.cycles());
        let mut frames_run = 0;
        let mut first = true;
        let reason = loop {
            if self.stop.take() {
                break StopReason::Requested;
            }
            let pc = self.cpu.pc();
            if target == Some(pc) {
                break StopReason::Address(pc);
            }
            // The instruction we start on never re-triggers its own breakpoint.
            if !first && let Some(kind) = self.breakpoints.hit(pc) {
                break StopReason::Breakpoint { address: pc, kind };
            }
            first = false;

            self.cpu.step(&mut self.bus);
            if self.end_of_frame(true) {
                frames_run += 1;
                if frame_limit == Some(frames_run) {
                    break StopReason::Frames;
                }
            }
        };
        info!(
            "machine: {reason} at {:#06X} after {}",
            self.cpu.pc(),
            self.cpu.cycles()
        );
        reason
    }

    /// Close the frame if the CPU has passed its boundary. Pacing only
    /// applies while running freely.
    fn end_of_frame(&mut self, pace: bool) -> bool {
        let cycles = self.cpu.cycles();
        if cycles < self.next_frame {
            return false;
        }
        while self.next_frame <= cycles {
            self.next_frame += self.ticks_per_frame;
        }
        self.frames += 1;
        if pace && self.config.real_time {
            self.pacer.frame(cycles);
        }
        if self.pacer.frame_skip() == 0
            && let Some(callback) = &mut self.on_frame
        {
            callback(&self.cpu, &self.bus);
        }
        true
    }
}
