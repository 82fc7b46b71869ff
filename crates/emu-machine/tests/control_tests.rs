//! Driving a machine on its emulation thread.

use std::thread;
use std::time::Duration;

use emu_core::{Cpu, Ticks};
use emu_debug::{Breakpoint, BreakpointKind};
use emu_machine::{Controller, DeviceBus, Machine, MachineConfig, Memory, StopReason};
use zilog_z80::Z80;

fn nop_machine() -> Machine<Z80> {
    let config = MachineConfig {
        real_time: false,
        ..MachineConfig::default()
    };
    Machine::new(Z80::new(), DeviceBus::new(Memory::new()), config)
}

#[test]
fn stop_when_idle_is_a_no_op() {
    let mut control = Controller::spawn(nop_machine()).expect("spawn");
    assert!(!control.is_running());
    assert_eq!(control.stop().expect("stop"), None);
    assert_eq!(control.wait().expect("wait"), None);
}

#[test]
fn start_then_stop_waits_for_the_machine() {
    let mut control = Controller::spawn(nop_machine()).expect("spawn");
    control.start().expect("start");
    assert!(control.is_running());
    thread::sleep(Duration::from_millis(10));

    let status = control.stop().expect("stop").expect("was running");
    assert_eq!(status.reason, StopReason::Requested);
    assert!(status.cycles > Ticks::ZERO);
    assert!(!control.is_running());

    let machine = control.shutdown().expect("shutdown");
    assert_eq!(machine.cpu().cycles(), status.cycles);
}

#[test]
fn step_answers_with_new_state() {
    let mut control = Controller::spawn(nop_machine()).expect("spawn");
    let status = control.step().expect("step");
    assert_eq!(status.reason, StopReason::Step);
    assert_eq!(status.pc, 1);
    assert_eq!(status.cycles, Ticks::new(4));

    let status = control.step_over().expect("step over");
    assert_eq!(status.pc, 2);
}

#[test]
fn run_to_finishes_on_its_own() {
    let mut control = Controller::spawn(nop_machine()).expect("spawn");
    control.run_to(0x0100).expect("run to");
    let status = control.wait().expect("wait").expect("was running");
    assert_eq!(status.reason, StopReason::Address(0x0100));
    assert_eq!(status.pc, 0x0100);
    assert!(!control.is_running());
}

#[test]
fn breakpoint_ends_run_and_stop_collects_it() {
    let mut machine = nop_machine();
    machine
        .breakpoints_mut()
        .add(Breakpoint::new(0x0040, BreakpointKind::User));
    let mut control = Controller::spawn(machine).expect("spawn");
    control.start().expect("start");
    thread::sleep(Duration::from_millis(50));

    // The run already ended at the breakpoint; stop just collects it.
    let status = control.stop().expect("stop").expect("was running");
    assert_eq!(
        status.reason,
        StopReason::Breakpoint {
            address: 0x0040,
            kind: BreakpointKind::User
        }
    );

    // The leftover stop request must not cut the next step short.
    let status = control.step().expect("step");
    assert_eq!(status.pc, 0x0041);
}

#[test]
fn reset_while_stopped() {
    let mut control = Controller::spawn(nop_machine()).expect("spawn");
    control.step().expect("step");
    control.step().expect("step");
    let status = control.reset().expect("reset");
    assert_eq!(status.reason, StopReason::Reset);
    assert_eq!(status.pc, 0);
    assert!(!control.is_running());
}

#[test]
fn reset_while_running_resumes() {
    let mut control = Controller::spawn(nop_machine()).expect("spawn");
    control.start().expect("start");
    let status = control.reset().expect("reset");
    assert_eq!(status.reason, StopReason::Reset);
    assert!(control.is_running());
    let status = control.stop().expect("stop").expect("was running");
    assert_eq!(status.reason, StopReason::Requested);
}

#[test]
fn dropping_the_controller_joins_the_thread() {
    let mut control = Controller::spawn(nop_machine()).expect("spawn");
    control.start().expect("start");
    drop(control);
}
