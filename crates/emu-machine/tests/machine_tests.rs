//! End-to-end behaviour of a Z80 machine built on the device bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use emu_core::{Bus, Cpu, Device, Observable, Ticks, Value};
use emu_debug::{Breakpoint, BreakpointKind};
use emu_machine::{DeviceBus, Machine, MachineConfig, Memory, PortMapping, StopReason};
use wd_1770::{Wd1770, Wd1770Config};
use zilog_z80::Z80;

/// Raises interrupt line 0 after a number of ticks; any port write
/// acknowledges it.
struct IrqAfter {
    remaining: u32,
    asserted: bool,
}

impl Device for IrqAfter {
    fn name(&self) -> &str {
        "irq-after"
    }

    fn write_port(&mut self, _port: u16, _value: u8) {
        self.asserted = false;
    }

    fn cycle(&mut self) {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.asserted = self.remaining == 0;
        }
    }

    fn interrupt_output(&self) -> u32 {
        u32::from(self.asserted)
    }
}

fn flat_out() -> MachineConfig {
    MachineConfig {
        real_time: false,
        ..MachineConfig::default()
    }
}

fn machine_with(program: &[u8], at: u16) -> Machine<Z80> {
    let mut memory = Memory::new();
    memory.load(at, program);
    Machine::new(Z80::new(), DeviceBus::new(memory), flat_out())
}

#[test]
fn nop_step_advances_pc_and_cycles() {
    let mut machine = machine_with(&[0x00], 0);
    let flags = machine.cpu().f();
    assert_eq!(machine.step(), StopReason::Step);
    assert_eq!(machine.cpu().pc(), 1);
    assert_eq!(machine.cpu().cycles(), Ticks::new(4));
    assert_eq!(machine.cpu().f(), flags);
    assert_eq!(machine.bus().ticks(), Ticks::new(4));
}

#[test]
fn push_pop_wraps_stack_at_zero() {
    // LD BC,0x1234 / PUSH BC / POP DE
    let mut machine = machine_with(&[0x01, 0x34, 0x12, 0xC5, 0xD1], 0);
    machine.cpu_mut().set_sp(0x0000);
    machine.step();
    machine.step();
    assert_eq!(machine.cpu().sp(), 0xFFFE);
    assert_eq!(machine.bus().memory.peek(0xFFFF), 0x12);
    assert_eq!(machine.bus().memory.peek(0xFFFE), 0x34);
    machine.step();
    assert_eq!(machine.cpu().de(), 0x1234);
    assert_eq!(machine.cpu().sp(), 0x0000);
}

#[test]
fn unmapped_port_reads_ff() {
    // LD A,0 / IN A,(0x50)
    let mut machine = machine_with(&[0x3E, 0x00, 0xDB, 0x50], 0);
    machine.step();
    assert_eq!(machine.cpu().a(), 0x00);
    machine.step();
    assert_eq!(machine.cpu().a(), 0xFF);
}

#[test]
fn rom_is_write_protected_from_the_cpu() {
    let mut memory = Memory::new();
    // LD A,0x55 / LD (0x0010),A
    let rom = memory
        .add_rom(&[0x3E, 0x55, 0x32, 0x10, 0x00])
        .expect("rom fits");
    assert!(memory.map(0, rom));
    let mut machine = Machine::new(Z80::new(), DeviceBus::new(memory), flat_out());
    machine.step();
    machine.step();
    assert_eq!(machine.bus().memory.peek(0x0010), 0xFF);
}

#[test]
fn device_interrupt_takes_im1() {
    // IM 1 / EI / JR $
    let mut machine = machine_with(&[0xED, 0x56, 0xFB, 0x18, 0xFE], 0);
    machine.cpu_mut().set_sp(0x8000);
    let irq = machine.bus_mut().add_device(Box::new(IrqAfter {
        remaining: 100,
        asserted: false,
    }));
    machine
        .bus_mut()
        .map_output(PortMapping::new(0x00FF, 0x0060), irq);

    assert_eq!(machine.run_to(0x0038), StopReason::Address(0x0038));
    assert_eq!(machine.cpu().query("iff1"), Some(Value::Bool(false)));
    assert_eq!(machine.cpu().sp(), 0x7FFE);
    assert_eq!(machine.bus().memory.peek(0x7FFE), 0x03);
    assert_eq!(machine.bus().memory.peek(0x7FFF), 0x00);

    machine.bus_mut().io_write(0x0060, 0);
    assert_eq!(machine.bus().interrupt_pending(), 0);
}

#[test]
fn run_stops_at_breakpoints_and_resumes_past_them() {
    let mut machine = machine_with(&[], 0);
    machine
        .breakpoints_mut()
        .add(Breakpoint::new(0x0005, BreakpointKind::User));
    machine
        .breakpoints_mut()
        .add(Breakpoint::new(0x0008, BreakpointKind::User).with_condition(
            emu_debug::Condition::compile("1 1 -").expect("valid condition"),
        ));
    machine
        .breakpoints_mut()
        .add(Breakpoint::new(0x0010, BreakpointKind::User));

    assert_eq!(
        machine.run(),
        StopReason::Breakpoint {
            address: 0x0005,
            kind: BreakpointKind::User
        }
    );
    assert_eq!(machine.cpu().pc(), 0x0005);

    // Resuming does not re-trigger 0x0005, and the false condition at
    // 0x0008 lets execution through.
    assert_eq!(
        machine.run(),
        StopReason::Breakpoint {
            address: 0x0010,
            kind: BreakpointKind::User
        }
    );
}

#[test]
fn run_to_current_address_returns_immediately() {
    let mut machine = machine_with(&[], 0);
    assert_eq!(machine.run_to(0x0000), StopReason::Address(0));
    assert_eq!(machine.cpu().cycles(), Ticks::ZERO);
    assert_eq!(machine.run_to(0x0004), StopReason::Address(4));
    assert_eq!(machine.cpu().cycles(), Ticks::new(16));
}

#[test]
fn step_over_runs_through_call() {
    let mut machine = machine_with(&[0xCD, 0x10, 0x00], 0);
    machine.bus_mut().memory.load(0x0010, &[0x00, 0x00, 0xC9]);
    machine.cpu_mut().set_sp(0x8000);

    assert_eq!(
        machine.step_over(),
        StopReason::Breakpoint {
            address: 0x0003,
            kind: BreakpointKind::StepOver
        }
    );
    assert_eq!(machine.cpu().pc(), 0x0003);
    assert_eq!(machine.cpu().sp(), 0x8000);
    assert!(machine.breakpoints().is_empty());
}

#[test]
fn step_over_plain_instruction_is_a_step() {
    let mut machine = machine_with(&[0x00], 0);
    assert_eq!(machine.step_over(), StopReason::Step);
    assert_eq!(machine.cpu().pc(), 1);
}

#[test]
fn frames_are_counted_on_cycle_boundaries() {
    let config = MachineConfig {
        cpu_hz: 4000,
        frames_per_second: 50,
        real_time: false,
        ..MachineConfig::default()
    };
    let mut machine = Machine::new(Z80::new(), DeviceBus::new(Memory::new()), config);
    let seen = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&seen);
    machine.on_frame(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // 80 ticks per frame, 20 NOPs each.
    assert_eq!(machine.run_frames(3), StopReason::Frames);
    assert_eq!(machine.frames(), 3);
    assert_eq!(machine.cpu().cycles(), Ticks::new(240));
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[test]
fn pending_stop_request_halts_before_first_instruction() {
    let mut machine = machine_with(&[], 0);
    machine.stop_handle().stop();
    assert_eq!(machine.run(), StopReason::Requested);
    assert_eq!(machine.cpu().pc(), 0);
    // The request was consumed.
    assert_eq!(machine.run_to(0x0002), StopReason::Address(2));
}

#[test]
fn reset_keeps_memory() {
    let mut machine = machine_with(&[0x00, 0x00, 0x76], 0);
    machine.step();
    machine.step();
    assert_eq!(machine.reset(), StopReason::Reset);
    assert_eq!(machine.cpu().pc(), 0);
    assert_eq!(machine.bus().memory.peek(0x0002), 0x76);
}

#[test]
fn floppy_seek_through_the_bus() {
    let mut machine = machine_with(&[], 0);
    let fdc = machine
        .bus_mut()
        .add_device(Box::new(Wd1770::new(Wd1770Config::default())));
    machine
        .bus_mut()
        .map_ports(PortMapping::new(0x00F8, 0x0020), fdc);

    let bus = machine.bus_mut();
    bus.io_write(0x0023, 5);
    bus.io_write(0x0020, 0x18);
    assert_eq!(bus.io_read(0x0020) & wd_1770::BUSY, wd_1770::BUSY);

    for _ in 0..(5 * 6000 - 1) {
        bus.cycle();
    }
    assert_eq!(bus.io_read(0x0020) & wd_1770::BUSY, wd_1770::BUSY);
    bus.cycle();
    assert_eq!(bus.io_read(0x0020) & wd_1770::BUSY, 0);
    assert_eq!(bus.io_read(0x0021), 5);
}
