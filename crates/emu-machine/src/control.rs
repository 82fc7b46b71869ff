//! Emulation thread and its command channel.
//!
//! The machine lives on its own thread and executes one command at a time.
//! Every command is answered with exactly one [`Status`]. A stop sets the
//! machine's stop flag and blocks until the running command has answered,
//! so the next command always starts at an instruction boundary.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use emu_core::{Cpu, Ticks};
use log::{debug, warn};

use crate::MachineError;
use crate::machine::{Machine, StopHandle, StopReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Run,
    RunTo(u16),
    Step,
    StepOver,
    Reset,
    Shutdown,
}

/// Answer to a command: why it ended and where the CPU is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub reason: StopReason,
    pub pc: u16,
    pub cycles: Ticks,
}

fn serve<C: Cpu>(
    mut machine: Machine<C>,
    commands: &Receiver<Command>,
    acks: &Sender<Status>,
) -> Machine<C> {
    while let Ok(command) = commands.recv() {
        debug!("control: {command:?}");
        let reason = match command {
            Command::Run => machine.run(),
            Command::RunTo(address) => machine.run_to(address),
            Command::Step => machine.step(),
            Command::StepOver => machine.step_over(),
            Command::Reset => machine.reset(),
            Command::Shutdown => break,
        };
        let status = Status {
            reason,
            pc: machine.cpu().pc(),
            cycles: machine.cpu().cycles(),
        };
        if acks.send(status).is_err() {
            break;
        }
    }
    machine
}

/// Owns the emulation thread and drives it with start/stop/step commands.
pub struct Controller<C: Cpu + Send + 'static> {
    commands: Sender<Command>,
    acks: Receiver<Status>,
    stop: StopHandle,
    running: bool,
    thread: Option<JoinHandle<Machine<C>>>,
}

impl<C: Cpu + Send + 'static> Controller<C> {
    /// Move `machine` onto a new emulation thread. It waits idle for the
    /// first command.
    pub fn spawn(machine: Machine<C>) -> Result<Self, MachineError> {
        let (commands, command_rx) = mpsc::channel();
        let (ack_tx, acks) = mpsc::channel();
        let stop = machine.stop_handle();
        let thread = thread::Builder::new()
            .name("emulation".to_string())
            .spawn(move || serve(machine, &command_rx, &ack_tx))?;
        Ok(Self {
            commands,
            acks,
            stop,
            running: false,
            thread: Some(thread),
        })
    }

    fn send(&self, command: Command) -> Result<(), MachineError> {
        self.commands
            .send(command)
            .map_err(|_| MachineError::ControlClosed)
    }

    fn receive(&self) -> Result<Status, MachineError> {
        self.acks.recv().map_err(|_| MachineError::ControlClosed)
    }

    /// True between `start` and the matching answer being collected.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start running freely. Returns without waiting.
    pub fn start(&mut self) -> Result<(), MachineError> {
        self.begin(Command::Run)
    }

    /// Start running until the program counter reaches `address`.
    pub fn run_to(&mut self, address: u16) -> Result<(), MachineError> {
        self.begin(Command::RunTo(address))
    }

    fn begin(&mut self, command: Command) -> Result<(), MachineError> {
        self.stop()?;
        self.send(command)?;
        self.running = true;
        Ok(())
    }

    /// Stop a run and wait for the machine to halt. Returns the run's
    /// status, or `None` if nothing was running.
    pub fn stop(&mut self) -> Result<Option<Status>, MachineError> {
        if !self.running {
            return Ok(None);
        }
        self.stop.stop();
        let status = self.receive();
        // The run may have ended on its own before seeing the flag.
        self.stop.cancel();
        self.running = false;
        let status = status?;
        debug!("control: stopped, {} at {:#06X}", status.reason, status.pc);
        Ok(Some(status))
    }

    /// Block until the current run ends by itself (breakpoint, target
    /// address). Returns `None` if nothing was running.
    pub fn wait(&mut self) -> Result<Option<Status>, MachineError> {
        if !self.running {
            return Ok(None);
        }
        let status = self.receive();
        self.running = false;
        status.map(Some)
    }

    fn execute(&mut self, command: Command) -> Result<Status, MachineError> {
        self.stop()?;
        self.send(command)?;
        self.receive()
    }

    pub fn step(&mut self) -> Result<Status, MachineError> {
        self.execute(Command::Step)
    }

    pub fn step_over(&mut self) -> Result<Status, MachineError> {
        self.execute(Command::StepOver)
    }

    /// Reset the machine, resuming the run if one was in progress.
    pub fn reset(&mut self) -> Result<Status, MachineError> {
        let was_running = self.running;
        let status = self.execute(Command::Reset)?;
        if was_running {
            self.start()?;
        }
        Ok(status)
    }

    /// Stop the emulation thread and take the machine back.
    pub fn shutdown(mut self) -> Result<Machine<C>, MachineError> {
        self.close()?.ok_or(MachineError::ControlClosed)
    }

    fn close(&mut self) -> Result<Option<Machine<C>>, MachineError> {
        let Some(thread) = self.thread.take() else {
            return Ok(None);
        };
        self.stop()?;
        self.send(Command::Shutdown)?;
        thread
            .join()
            .map(Some)
            .map_err(|_| MachineError::ControlClosed)
    }
}

impl<C: Cpu + Send + 'static> Drop for Controller<C> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("control: emulation thread did not shut down cleanly: {err}");
        }
    }
}
