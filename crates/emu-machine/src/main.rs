//! Headless Z80 machine runner.
//!
//! Builds a machine with banked memory, a WD1770 floppy controller, an
//! AY-3-8910 and a free-running counter, runs it for a number of frames or
//! until a breakpoint, and prints the CPU registers.

use std::fs;
use std::path::PathBuf;
use std::process;

use emu_core::{Cpu, Device};
use emu_debug::{Breakpoint, BreakpointKind};
use emu_machine::{
    Counter, DeviceBus, Machine, MachineConfig, MachineError, Memory, PortMapping, PsgPorts,
};
use gi_ay_3_8910::Ay3_8910;
use log::{LevelFilter, Log, Metadata, Record};
use wd_1770::{SectorImage, Wd1770, Wd1770Config};
use zilog_z80::Z80;

/// Port decode of the board: controller at 0x20-0x27, sound at 0x30-0x31,
/// counter at 0x40-0x43.
const FDC_PORTS: PortMapping = PortMapping::new(0x00F8, 0x0020);
const PSG_PORTS: PortMapping = PortMapping::new(0x00FE, 0x0030);
const COUNTER_PORTS: PortMapping = PortMapping::new(0x00FC, 0x0040);

/// CPU ticks per AY tick.
const PSG_DIVIDER: u32 = 4;
const SAMPLE_RATE: u32 = 44_100;

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:5}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

struct CliArgs {
    rom_path: Option<PathBuf>,
    load_path: Option<PathBuf>,
    load_address: u16,
    config_path: Option<PathBuf>,
    disk_path: Option<PathBuf>,
    frames: u64,
    breakpoints: Vec<(u16, Option<String>)>,
    fast: bool,
    verbose: u8,
}

fn parse_number(text: &str) -> Option<u16> {
    let text = text.trim();
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .or_else(|| text.strip_prefix('$'))
        .or_else(|| text.strip_prefix('&'))
    {
        u16::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{message}");
    process::exit(1);
}

fn usage() -> ! {
    eprintln!("Usage: emu-machine [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --rom <file>          ROM image (up to 16K) mapped at 0x0000");
    eprintln!("  --load <file>         Binary loaded into memory");
    eprintln!("  --at <addr>           Load address for --load [default: 0x0000]");
    eprintln!("  --config <file>       Machine configuration (JSON)");
    eprintln!("  --disk <file>         Raw sector floppy image for the WD1770");
    eprintln!("  --frames <n>          Frames to run [default: 50]");
    eprintln!("  --break <addr[:cond]> Breakpoint, optional RPN condition");
    eprintln!("  --fast                Do not pace against the wall clock");
    eprintln!("  -v                    More logging (repeatable)");
    process::exit(0);
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        rom_path: None,
        load_path: None,
        load_address: 0,
        config_path: None,
        disk_path: None,
        frames: 50,
        breakpoints: Vec::new(),
        fast: false,
        verbose: 0,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rom" => {
                i += 1;
                cli.rom_path = args.get(i).map(PathBuf::from);
            }
            "--load" => {
                i += 1;
                cli.load_path = args.get(i).map(PathBuf::from);
            }
            "--at" => {
                i += 1;
                cli.load_address = args
                    .get(i)
                    .and_then(|s| parse_number(s))
                    .unwrap_or_else(|| fail("--at needs an address"));
            }
            "--config" => {
                i += 1;
                cli.config_path = args.get(i).map(PathBuf::from);
            }
            "--disk" => {
                i += 1;
                cli.disk_path = args.get(i).map(PathBuf::from);
            }
            "--frames" => {
                i += 1;
                cli.frames = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| fail("--frames needs a count"));
            }
            "--break" => {
                i += 1;
                let Some(arg) = args.get(i) else {
                    fail("--break needs an address");
                };
                let (address, condition) = match arg.split_once(':') {
                    Some((address, condition)) => (address, Some(condition.to_string())),
                    None => (arg.as_str(), None),
                };
                let address = parse_number(address)
                    .unwrap_or_else(|| fail(&format!("bad breakpoint address: {address}")));
                cli.breakpoints.push((address, condition));
            }
            "--fast" => cli.fast = true,
            "-v" => cli.verbose += 1,
            "-vv" => cli.verbose += 2,
            "-h" | "--help" => usage(),
            other => fail(&format!("Unknown argument: {other}")),
        }
        i += 1;
    }

    cli
}

// ---------------------------------------------------------------------------
// Machine assembly
// ---------------------------------------------------------------------------

fn make_machine(cli: &CliArgs) -> Result<Machine<Z80>, MachineError> {
    let mut config = match &cli.config_path {
        Some(path) => MachineConfig::load(path)?,
        None => MachineConfig::default(),
    };
    if cli.fast {
        config.real_time = false;
    }

    let mut memory = Memory::new();
    if let Some(path) = &cli.rom_path {
        let rom = memory.add_rom(&fs::read(path)?)?;
        memory.map(0, rom);
    }
    if let Some(path) = &cli.load_path {
        memory.load(cli.load_address, &fs::read(path)?);
    }

    let mut fdc = Wd1770::new(Wd1770Config::default());
    if let Some(path) = &cli.disk_path {
        let image = SectorImage::new(fs::read(path)?);
        log::info!(
            "disk: {} ({} side(s))",
            path.display(),
            image.sides()
        );
        fdc.insert_disk(Box::new(image));
    }
    let psg_clock = (config.cpu_hz / u64::from(PSG_DIVIDER)) as u32;
    let psg = PsgPorts::new(Ay3_8910::new(psg_clock, SAMPLE_RATE), PSG_DIVIDER);

    let mut bus = DeviceBus::new(memory);
    let fdc = bus.add_device(Box::new(fdc));
    bus.map_ports(FDC_PORTS, fdc);
    let psg = bus.add_device(Box::new(psg));
    bus.map_ports(PSG_PORTS, psg);
    let counter = bus.add_device(Box::new(Counter::new(16, false)));
    bus.map_input(COUNTER_PORTS, counter);

    let mut machine = Machine::new(Z80::new(), bus, config);
    for (address, condition) in &cli.breakpoints {
        let mut breakpoint = Breakpoint::new(*address, BreakpointKind::User);
        if let Err(err) = breakpoint.set_condition(condition.as_deref()) {
            fail(&format!("bad condition for {address:#06X}: {err}"));
        }
        machine.breakpoints_mut().add(breakpoint);
    }
    Ok(machine)
}

fn print_registers(cpu: &Z80) {
    let registers = Device::registers(cpu);
    let mut line = String::new();
    for (index, info) in registers.iter().enumerate() {
        let Some(value) = cpu.register_value(index) else {
            continue;
        };
        if info.column == 0 && !line.is_empty() {
            println!("{line}");
            line.clear();
        }
        let text = match (info.bit_names, info.bits) {
            (Some(names), _) => names
                .chars()
                .enumerate()
                .map(|(bit, name)| if value & (0x80 >> bit) != 0 { name } else { '-' })
                .collect(),
            (None, 8) => format!("{value:02X}"),
            (None, _) => format!("{value:04X}"),
        };
        line.push_str(&format!("{:>6} {text:<10}", info.name));
    }
    if !line.is_empty() {
        println!("{line}");
    }
}

fn main() -> Result<(), MachineError> {
    let cli = parse_args();
    init_logging(cli.verbose);

    let mut machine = make_machine(&cli)?;
    machine.reset();
    let reason = machine.run_frames(cli.frames);

    println!(
        "{reason}: {} frames, {} at PC {:04X}",
        machine.frames(),
        machine.cpu().cycles(),
        machine.cpu().pc()
    );
    print_registers(machine.cpu());
    Ok(())
}
