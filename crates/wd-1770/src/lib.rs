//! Western Digital WD1770 floppy disk controller.
//!
//! The WD1770 sits behind five I/O registers: status/command, track,
//! sector and data, plus a board-level control latch selecting the side.
//! It is clocked from the CPU: every [`Device::cycle`] advances the motor,
//! head-step and byte-transfer timers by one tick.
//!
//! # State machine
//!
//! Idle → Spin-up (motor off and `h` clear) → Execute → Spin-down → Idle.
//!
//! Type I commands (restore, seek, step) spend the execute phase moving the
//! head. Type II/III commands (sector and address transfers) hand bytes to
//! the CPU through the data register, raising DRQ once per byte. Every
//! command ends by raising INTRQ.

pub mod config;
pub mod image;

pub use config::Wd1770Config;
pub use image::{DiskImage, SectorImage};

use emu_core::{Device, RegisterInfo};

/// Motor running.
pub const MOTOR_ON: u8 = 0x80;
/// Disk is write protected.
pub const WRITE_PROTECT: u8 = 0x40;
/// Spin-up complete (type I) or deleted data mark (type II/III).
pub const SPIN_UP: u8 = 0x20;
/// Seek error or record not found.
pub const NOT_FOUND: u8 = 0x10;
/// CRC error.
pub const CRC_ERROR: u8 = 0x08;
/// Head on track 0 (type I).
pub const TRACK0: u8 = 0x04;
/// CPU missed a DRQ (type II/III).
pub const LOST_DATA: u8 = 0x04;
/// Data request (type II/III).
pub const DRQ: u8 = 0x02;
/// Command in progress.
pub const BUSY: u8 = 0x01;

/// Highest head position the stepper can reach.
const MAX_HEAD: i32 = 255;

/// Controller activity, driven by countdown timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No command; motor off.
    Idle,
    /// Waiting for the motor to come up to speed.
    SpinUp,
    /// Stepping the head or transferring bytes.
    Execute,
    /// Command finished; motor still running until the timeout.
    SpinDown,
}

/// Command classes, from the top nibble of the command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    /// Restore, seek and step.
    One,
    /// Read and write sector.
    Two,
    /// Read address, read track and write track.
    Three,
    /// Force interrupt.
    Four,
}

impl CommandType {
    #[must_use]
    pub fn of(command: u8) -> Self {
        match command >> 4 {
            0x0..=0x7 => Self::One,
            0x8..=0xB => Self::Two,
            0xD => Self::Four,
            _ => Self::Three,
        }
    }
}

/// Progress of a type II/III byte transfer.
#[derive(Default)]
enum Transfer {
    /// Execute delay still running; nothing located yet.
    #[default]
    Pending,
    /// Bytes going to the CPU (read sector, read address).
    Outgoing { bytes: Vec<u8>, offset: usize },
    /// Bytes coming from the CPU (write sector).
    Incoming { bytes: Vec<u8>, offset: usize },
}

/// WD1770 floppy disk controller with a single drive.
pub struct Wd1770 {
    config: Wd1770Config,
    status: u8,
    track: u8,
    sector: u8,
    data: u8,
    command: u8,
    phase: Phase,
    /// Ticks left in the current phase.
    countdown: u32,
    /// Execute phase length, started once spin-up completes.
    execute_delay: u32,
    /// Physical head position.
    head: u8,
    step_out: bool,
    side: u8,
    transfer: Transfer,
    /// Rotating position for read address.
    id_index: usize,
    drq: bool,
    intrq: bool,
    intrq_line: u32,
    drq_line: u32,
    disk: Option<Box<dyn DiskImage>>,
}

impl Wd1770 {
    /// A controller with no disk, INTRQ on interrupt line 0 and DRQ unwired.
    #[must_use]
    pub fn new(config: Wd1770Config) -> Self {
        Self {
            config,
            status: 0,
            track: 0,
            sector: 0,
            data: 0,
            command: 0,
            phase: Phase::Idle,
            countdown: 0,
            execute_delay: 0,
            head: 0,
            step_out: false,
            side: 0,
            transfer: Transfer::Pending,
            id_index: 0,
            drq: false,
            intrq: false,
            intrq_line: 1,
            drq_line: 0,
            disk: None,
        }
    }

    /// Route INTRQ and DRQ to the given interrupt masks (0 leaves a line unwired).
    #[must_use]
    pub fn with_lines(mut self, intrq: u32, drq: u32) -> Self {
        self.intrq_line = intrq;
        self.drq_line = drq;
        self
    }

    pub fn insert_disk(&mut self, image: Box<dyn DiskImage>) {
        self.disk = Some(image);
    }

    pub fn eject_disk(&mut self) -> Option<Box<dyn DiskImage>> {
        self.disk.take()
    }

    #[must_use]
    pub fn disk(&self) -> Option<&dyn DiskImage> {
        self.disk.as_deref()
    }

    /// Status register, without the read side effect of clearing INTRQ.
    #[must_use]
    pub fn status(&self) -> u8 {
        self.status
    }

    #[must_use]
    pub fn track(&self) -> u8 {
        self.track
    }

    #[must_use]
    pub fn sector(&self) -> u8 {
        self.sector
    }

    #[must_use]
    pub fn head_position(&self) -> u8 {
        self.head
    }

    #[must_use]
    pub fn side(&self) -> u8 {
        self.side
    }

    pub fn set_side(&mut self, side: u8) {
        self.side = side & 1;
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn intrq(&self) -> bool {
        self.intrq
    }

    #[must_use]
    pub fn drq(&self) -> bool {
        self.drq
    }

    fn busy(&self) -> bool {
        self.status & BUSY != 0
    }

    fn set_drq(&mut self, drq: bool) {
        self.drq = drq;
        if drq {
            self.status |= DRQ;
        } else {
            self.status &= !DRQ;
        }
    }

    fn write_command(&mut self, value: u8) {
        if CommandType::of(value) == CommandType::Four {
            self.force_interrupt(value);
            return;
        }
        if self.busy() {
            log::debug!("WD1770: command {value:02X} ignored while busy");
            return;
        }

        log::debug!(
            "WD1770: command {value:02X} track={} sector={} data={} head={}",
            self.track,
            self.sector,
            self.data,
            self.head
        );
        self.command = value;
        self.intrq = false;
        self.set_drq(false);
        self.transfer = Transfer::Pending;
        self.status = (self.status & MOTOR_ON) | BUSY;

        self.execute_delay = match CommandType::of(value) {
            CommandType::One => self.start_head_move(value),
            _ if value & 0x04 != 0 => self.config.settle,
            _ => 1,
        };

        if value & 0x08 == 0 && self.status & MOTOR_ON == 0 {
            self.phase = Phase::SpinUp;
            self.countdown = self.config.motor_on_delay;
        } else {
            self.status |= MOTOR_ON;
            self.phase = Phase::Execute;
            self.countdown = self.execute_delay;
        }
    }

    /// Move the head for a type I command; returns the time the move takes.
    fn start_head_move(&mut self, value: u8) -> u32 {
        let head = i32::from(self.head);
        let target = match value >> 5 {
            // Restore or seek.
            0 if value & 0x10 == 0 => 0,
            0 => head + i32::from(self.data) - i32::from(self.track),
            1 => head + if self.step_out { -1 } else { 1 },
            2 => {
                self.step_out = false;
                head + 1
            }
            _ => {
                self.step_out = true;
                head - 1
            }
        }
        .clamp(0, MAX_HEAD);

        self.head = target as u8;
        let steps = (target - head).unsigned_abs();
        let mut delay = steps * self.config.step_rates[(value & 0x03) as usize];
        if value & 0x04 != 0 {
            delay += self.config.settle;
        }
        delay
    }

    fn finish_head_move(&mut self) {
        let value = self.command;
        match value >> 5 {
            0 if value & 0x10 == 0 => self.track = 0,
            0 => self.track = self.data,
            _ if value & 0x10 != 0 => {
                self.track = if self.step_out {
                    self.track.wrapping_sub(1)
                } else {
                    self.track.wrapping_add(1)
                };
            }
            _ => {}
        }

        if self.head == 0 {
            self.status |= TRACK0;
        }
        if self.disk.as_ref().is_some_and(|d| d.is_write_protected()) {
            self.status |= WRITE_PROTECT;
        }
        // Verify: an ID field on this track must carry the track register.
        if value & 0x04 != 0 {
            let verified = self.disk.as_deref().is_some_and(|disk| {
                (0..disk.sector_count(self.head, self.side)).any(|i| {
                    disk.sector_id(self.head, self.side, i)
                        .is_some_and(|id| id[0] == self.track)
                })
            });
            if !verified {
                self.status |= NOT_FOUND;
            }
        }
        self.complete();
    }

    fn force_interrupt(&mut self, value: u8) {
        log::debug!("WD1770: force interrupt {value:02X}");
        if self.busy() {
            self.status &= !BUSY;
        } else {
            self.status &= MOTOR_ON;
            if self.head == 0 {
                self.status |= TRACK0;
            }
        }
        self.command = value;
        self.transfer = Transfer::Pending;
        self.set_drq(false);
        if value & 0x08 != 0 {
            self.intrq = true;
        }
        if self.status & MOTOR_ON != 0 {
            self.phase = Phase::SpinDown;
            self.countdown = self.config.motor_off_delay;
        } else {
            self.phase = Phase::Idle;
        }
    }

    fn complete(&mut self) {
        self.status &= !BUSY;
        self.set_drq(false);
        self.transfer = Transfer::Pending;
        self.intrq = true;
        self.phase = Phase::SpinDown;
        self.countdown = self.config.motor_off_delay;
        log::debug!(
            "WD1770: command {:02X} done, status={:02X} track={} head={}",
            self.command,
            self.status,
            self.track,
            self.head
        );
    }

    fn fail(&mut self, bits: u8) {
        self.status |= bits;
        self.complete();
    }

    /// Locate the sector or ID field for a type II/III command.
    fn begin_transfer(&mut self) {
        let (head, side, sector) = (self.head, self.side, self.sector);
        let interval = self.config.drq_interval;
        match self.command >> 4 {
            0x8 | 0x9 => {
                let found = self
                    .disk
                    .as_deref()
                    .and_then(|d| d.read_sector(head, side, sector))
                    .map(<[u8]>::to_vec);
                match found {
                    Some(bytes) => {
                        self.transfer = Transfer::Outgoing { bytes, offset: 0 };
                        self.countdown = interval;
                    }
                    None => self.fail(NOT_FOUND),
                }
            }
            0xA | 0xB => {
                let Some(disk) = self.disk.as_deref() else {
                    self.fail(NOT_FOUND);
                    return;
                };
                if disk.is_write_protected() {
                    self.fail(WRITE_PROTECT);
                    return;
                }
                match disk.read_sector(head, side, sector).map(<[u8]>::len) {
                    Some(len) => {
                        self.transfer = Transfer::Incoming {
                            bytes: vec![0; len],
                            offset: 0,
                        };
                        self.set_drq(true);
                        self.countdown = interval;
                    }
                    None => self.fail(NOT_FOUND),
                }
            }
            0xC => {
                let id = self.disk.as_deref().and_then(|d| {
                    let count = d.sector_count(head, side);
                    if count == 0 {
                        return None;
                    }
                    d.sector_id(head, side, self.id_index % count)
                });
                let Some(id) = id else {
                    self.fail(NOT_FOUND);
                    return;
                };
                self.id_index = self.id_index.wrapping_add(1);
                // The ID field's track number lands in the sector register.
                self.sector = id[0];
                let crc = id_crc(&id);
                let mut bytes = id.to_vec();
                bytes.extend_from_slice(&crc.to_be_bytes());
                self.transfer = Transfer::Outgoing { bytes, offset: 0 };
                self.countdown = interval;
            }
            0xF => {
                if self.disk.as_ref().is_some_and(|d| d.is_write_protected()) {
                    self.fail(WRITE_PROTECT);
                } else {
                    // Formatting is accepted; sector images keep their geometry.
                    self.complete();
                }
            }
            // Read track needs raw track data, which sector images lack.
            _ => self.fail(NOT_FOUND),
        }
    }

    fn multi_sector(&self) -> bool {
        CommandType::of(self.command) == CommandType::Two && self.command & 0x10 != 0
    }

    fn transfer_step(&mut self) {
        let interval = self.config.drq_interval;
        match std::mem::take(&mut self.transfer) {
            Transfer::Pending => self.begin_transfer(),
            Transfer::Outgoing { bytes, offset } => {
                if offset < bytes.len() {
                    if self.drq {
                        self.status |= LOST_DATA;
                    }
                    self.data = bytes[offset];
                    self.set_drq(true);
                    self.transfer = Transfer::Outgoing {
                        bytes,
                        offset: offset + 1,
                    };
                    self.countdown = interval;
                } else if self.multi_sector() {
                    self.sector = self.sector.wrapping_add(1);
                    self.begin_transfer();
                } else {
                    self.complete();
                }
            }
            Transfer::Incoming { mut bytes, offset } => {
                bytes[offset] = if self.drq {
                    self.status |= LOST_DATA;
                    0
                } else {
                    self.data
                };
                let offset = offset + 1;
                if offset < bytes.len() {
                    self.set_drq(true);
                    self.transfer = Transfer::Incoming { bytes, offset };
                    self.countdown = interval;
                    return;
                }
                let (head, side, sector) = (self.head, self.side, self.sector);
                let written = self
                    .disk
                    .as_deref_mut()
                    .is_some_and(|d| d.write_sector(head, side, sector, &bytes));
                if !written {
                    self.fail(NOT_FOUND);
                } else if self.multi_sector() {
                    self.sector = self.sector.wrapping_add(1);
                    self.begin_transfer();
                } else {
                    self.complete();
                }
            }
        }
    }

    fn tick(&mut self) -> bool {
        self.countdown = self.countdown.saturating_sub(1);
        self.countdown == 0
    }
}

/// CRC-CCITT of an ID field, including the three A1 sync bytes and the
/// FE address mark.
#[must_use]
pub fn id_crc(id: &[u8; 4]) -> u16 {
    crc16(&[0xA1, 0xA1, 0xA1, 0xFE, id[0], id[1], id[2], id[3]])
}

fn crc16(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0xFFFF, |crc, &b| {
        let mut crc = crc ^ (u16::from(b) << 8);
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
        crc
    })
}

static REGISTERS: [RegisterInfo; 7] = [
    RegisterInfo::new("Status", 8).with_bits("MWSRCTDB"),
    RegisterInfo::new("Track", 8),
    RegisterInfo::new("Sector", 8),
    RegisterInfo::new("Data", 8),
    RegisterInfo::new("Command", 8).in_column(1),
    RegisterInfo::new("Head", 8).in_column(1),
    RegisterInfo::new("Side", 8).in_column(1),
];

impl Device for Wd1770 {
    fn name(&self) -> &str {
        "WD1770 Floppy Controller"
    }

    fn read_port(&mut self, port: u16) -> u8 {
        match port {
            0 => {
                self.intrq = false;
                self.status
            }
            1 => self.track,
            2 => self.sector,
            3 => {
                self.set_drq(false);
                self.data
            }
            _ => 0xFF,
        }
    }

    fn write_port(&mut self, port: u16, value: u8) {
        match port {
            0 => self.write_command(value),
            1 if !self.busy() => self.track = value,
            2 if !self.busy() => self.sector = value,
            3 => {
                self.data = value;
                self.set_drq(false);
            }
            4 => self.set_side(value >> 4),
            _ => {}
        }
    }

    fn cycle(&mut self) {
        match self.phase {
            Phase::Idle => {}
            Phase::SpinUp => {
                if self.tick() {
                    self.status |= MOTOR_ON;
                    if CommandType::of(self.command) == CommandType::One {
                        self.status |= SPIN_UP;
                    }
                    self.phase = Phase::Execute;
                    self.countdown = self.execute_delay;
                }
            }
            Phase::Execute => {
                if self.tick() {
                    if CommandType::of(self.command) == CommandType::One {
                        self.finish_head_move();
                    } else {
                        self.transfer_step();
                    }
                }
            }
            Phase::SpinDown => {
                if self.tick() {
                    self.status &= !MOTOR_ON;
                    self.phase = Phase::Idle;
                }
            }
        }
    }

    fn reset(&mut self) {
        self.status = 0;
        self.track = 0;
        self.sector = 0;
        self.data = 0;
        self.command = 0;
        self.phase = Phase::Idle;
        self.countdown = 0;
        self.transfer = Transfer::Pending;
        self.drq = false;
        self.intrq = false;
        self.side = 0;
    }

    fn interrupt_output(&self) -> u32 {
        let mut lines = 0;
        if self.intrq {
            lines |= self.intrq_line;
        }
        if self.drq {
            lines |= self.drq_line;
        }
        lines
    }

    fn registers(&self) -> &'static [RegisterInfo] {
        &REGISTERS
    }

    fn register_value(&self, index: usize) -> Option<u32> {
        let value = match index {
            0 => self.status,
            1 => self.track,
            2 => self.sector,
            3 => self.data,
            4 => self.command,
            5 => self.head,
            6 => self.side,
            _ => return None,
        };
        Some(u32::from(value))
    }
}
