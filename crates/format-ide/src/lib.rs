//! Sparse hard-disk image container.
//!
//! An image holds up to 2^28 sectors of 512 bytes, but only stores the
//! sectors that have been written. Layout, in 512-byte blocks:
//!
//! - Block 0: header (identifier, version, capacity, blank pattern, text
//!   metadata).
//! - Block 1: root map.
//! - Everything else: maps and sector data, allocated on demand.
//!
//! A map is 128 little-endian `u32` entries. An LBA is split into four
//! 7-bit indices (bits 27-21, 20-14, 13-7, 6-0) walking root → level 1 →
//! level 2 → level 3. A level-3 entry is either a data block number or a
//! fill pattern `0xFFFF_0000 | pattern` for sectors made of one repeated
//! 16-bit value. Zero entries are unallocated and read back as the blank
//! pattern from the header.
//!
//! Freed blocks go on a free list. When the list fills, and when the image
//! is closed, blocks at the end of the file are moved into the holes and
//! the file is truncated.
//!
//! # Header
//!
//! ```text
//! 0000  identifier "BITWISE DRIVE IMAGE FILE" (24 bytes)
//! 0018  version major, minor, release (u32 each)
//! 0024  capacity in sectors (u32)
//! 0028  blank pattern (u32, low 16 bits used)
//! 0030  creation time (16 bytes)
//! 0040  creator (64 bytes)
//! 0080  author (64 bytes)
//! 00C0  description (64 bytes)
//! ```

mod storage;

pub use storage::Storage;

use std::io::{self, Read, Seek, SeekFrom, Write};

use thiserror::Error;

pub const IDENTIFIER: &[u8; 24] = b"BITWISE DRIVE IMAGE FILE";
pub const VERSION: (u32, u32, u32) = (1, 0, 0);
pub const SECTOR_SIZE: usize = 512;
/// Default capacity in sectors (128 GiB).
pub const MAX_SECTORS: u32 = 0x1000_0000;
/// Default pattern for unwritten sectors.
pub const BLANK_PATTERN: u16 = 0xFFFF;
/// Map entries at or above this value hold a fill pattern.
pub const FILL_TAG: u32 = 0xFFFF_0000;
pub const MAP_ENTRIES: usize = 128;
pub const MAP_DEPTH: usize = 4;
/// Freed blocks held before a compaction pass.
pub const FREE_LIST_MAX: usize = 128;

const ROOT_BLOCK: u32 = 1;
const BLOCK_BYTES: u64 = SECTOR_SIZE as u64;

type Block = [u8; SECTOR_SIZE];

#[derive(Debug, Error)]
pub enum IdeError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("not a drive image file")]
    InvalidFile,
    #[error("unsupported drive image version {0}")]
    UnsupportedVersion(u32),
    #[error("drive image is read-only")]
    ReadOnly,
    #[error("sector {lba} beyond capacity of {capacity} sectors")]
    OutOfRange { lba: u32, capacity: u32 },
    #[error("compaction left {0} free blocks unfilled")]
    FreeListNotCleared(usize),
}

/// Text metadata written into a new image's header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Creation timestamp, free-form (16 bytes stored).
    pub created: String,
    pub creator: String,
    pub author: String,
    pub description: String,
}

impl Default for ImageInfo {
    fn default() -> Self {
        Self {
            created: String::new(),
            creator: concat!("format-ide ", env!("CARGO_PKG_VERSION")).to_string(),
            author: String::new(),
            description: "Emulated IDE drive".to_string(),
        }
    }
}

/// An open drive image.
///
/// Call [`IdeImage::close`] when done so freed space is reclaimed.
pub struct IdeImage<S: Storage> {
    storage: S,
    read_only: bool,
    header: Block,
    /// Block number of the map held in `cache` at each depth; 0 when empty.
    cached: [u32; MAP_DEPTH],
    cache: Box<[Block; MAP_DEPTH]>,
    free_list: Vec<u32>,
    /// First block past the end of the file.
    next_free: u32,
}

impl<S: Storage> IdeImage<S> {
    /// Format empty storage as a new image.
    pub fn create(mut storage: S, info: &ImageInfo) -> Result<Self, IdeError> {
        let mut header = [0; SECTOR_SIZE];
        header[..IDENTIFIER.len()].copy_from_slice(IDENTIFIER);
        put_u32(&mut header, 0x18, VERSION.0);
        put_u32(&mut header, 0x1C, VERSION.1);
        put_u32(&mut header, 0x20, VERSION.2);
        put_u32(&mut header, 0x24, MAX_SECTORS);
        put_u32(&mut header, 0x28, u32::from(BLANK_PATTERN));
        put_str(&mut header, 0x30, 0x10, &info.created);
        put_str(&mut header, 0x40, 0x40, &info.creator);
        put_str(&mut header, 0x80, 0x40, &info.author);
        put_str(&mut header, 0xC0, 0x40, &info.description);

        storage.set_len(0)?;
        write_block(&mut storage, 0, &header)?;
        write_block(&mut storage, ROOT_BLOCK, &[0; SECTOR_SIZE])?;
        log::info!("IDE: created image, {MAX_SECTORS} sectors");

        Ok(Self {
            storage,
            read_only: false,
            header,
            cached: [ROOT_BLOCK, 0, 0, 0],
            cache: Box::new([[0; SECTOR_SIZE]; MAP_DEPTH]),
            free_list: Vec::with_capacity(FREE_LIST_MAX + MAP_DEPTH),
            next_free: ROOT_BLOCK + 1,
        })
    }

    /// Open an existing image, validating its header.
    pub fn open(mut storage: S, read_only: bool) -> Result<Self, IdeError> {
        let len = storage.byte_len()?;
        if len < 2 * BLOCK_BYTES {
            return Err(IdeError::InvalidFile);
        }
        let mut header = [0; SECTOR_SIZE];
        read_block(&mut storage, 0, &mut header)?;
        if &header[..IDENTIFIER.len()] != IDENTIFIER {
            return Err(IdeError::InvalidFile);
        }
        let major = get_u32(&header, 0x18);
        if major == 0 || major > VERSION.0 {
            return Err(IdeError::UnsupportedVersion(major));
        }

        let mut cache = Box::new([[0; SECTOR_SIZE]; MAP_DEPTH]);
        read_block(&mut storage, ROOT_BLOCK, &mut cache[0])?;
        let next_free = u32::try_from(len / BLOCK_BYTES).map_err(|_| IdeError::InvalidFile)?;
        log::info!(
            "IDE: opened image, {} sectors, {next_free} blocks{}",
            get_u32(&header, 0x24),
            if read_only { ", read-only" } else { "" }
        );

        Ok(Self {
            storage,
            read_only,
            header,
            cached: [ROOT_BLOCK, 0, 0, 0],
            cache,
            free_list: Vec::with_capacity(FREE_LIST_MAX + MAP_DEPTH),
            next_free,
        })
    }

    /// Open writable, formatting the storage first if it is empty.
    pub fn open_or_create(mut storage: S, info: &ImageInfo) -> Result<Self, IdeError> {
        if storage.byte_len()? == 0 {
            Self::create(storage, info)
        } else {
            Self::open(storage, false)
        }
    }

    /// Compact and hand back the storage.
    pub fn close(mut self) -> Result<S, IdeError> {
        if !self.read_only {
            self.compact()?;
            self.storage.flush()?;
        }
        Ok(self.storage)
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// `(major, minor, release)` from the header.
    #[must_use]
    pub fn version(&self) -> (u32, u32, u32) {
        (
            get_u32(&self.header, 0x18),
            get_u32(&self.header, 0x1C),
            get_u32(&self.header, 0x20),
        )
    }

    /// Capacity in sectors.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        get_u32(&self.header, 0x24)
    }

    #[must_use]
    pub fn blank_pattern(&self) -> u16 {
        get_u32(&self.header, 0x28) as u16
    }

    #[must_use]
    pub fn info(&self) -> ImageInfo {
        ImageInfo {
            created: get_str(&self.header, 0x30, 0x10),
            creator: get_str(&self.header, 0x40, 0x40),
            author: get_str(&self.header, 0x80, 0x40),
            description: get_str(&self.header, 0xC0, 0x40),
        }
    }

    /// Blocks currently waiting on the free list.
    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.free_list.len()
    }

    fn check_range(&self, lba: u32) -> Result<[usize; MAP_DEPTH], IdeError> {
        let capacity = self.capacity();
        if lba >= capacity {
            return Err(IdeError::OutOfRange { lba, capacity });
        }
        Ok([
            (lba >> 21) as usize & 0x7F,
            (lba >> 14) as usize & 0x7F,
            (lba >> 7) as usize & 0x7F,
            lba as usize & 0x7F,
        ])
    }

    /// Make `block` the cached map at `depth`.
    fn load_map(&mut self, block: u32, depth: usize) -> Result<(), IdeError> {
        if self.cached[depth] != block {
            read_block(&mut self.storage, block, &mut self.cache[depth])?;
            self.cached[depth] = block;
        }
        Ok(())
    }

    /// Walk existing maps for `path`; returns the level-3 entry, or 0 when
    /// a map on the way is missing.
    fn lookup(&mut self, path: &[usize; MAP_DEPTH]) -> Result<u32, IdeError> {
        let mut entry = map_entry(&self.cache[0], path[0]);
        for depth in 1..MAP_DEPTH {
            if entry == 0 {
                return Ok(0);
            }
            self.load_map(entry, depth)?;
            entry = map_entry(&self.cache[depth], path[depth]);
        }
        Ok(entry)
    }

    /// Read sector `lba` into `buffer`.
    pub fn read_sector(&mut self, lba: u32, buffer: &mut Block) -> Result<(), IdeError> {
        let path = self.check_range(lba)?;
        match self.lookup(&path)? {
            0 => fill(buffer, self.blank_pattern()),
            entry if entry >= FILL_TAG => fill(buffer, entry as u16),
            block => read_block(&mut self.storage, block, buffer)?,
        }
        Ok(())
    }

    /// Write sector `lba`.
    ///
    /// Sectors of the blank pattern release their storage; other uniform
    /// sectors are kept as a fill pattern in the map.
    pub fn write_sector(&mut self, lba: u32, data: &Block) -> Result<(), IdeError> {
        if self.read_only {
            return Err(IdeError::ReadOnly);
        }
        let path = self.check_range(lba)?;
        match uniform_pattern(data) {
            Some(pattern) if pattern == self.blank_pattern() => self.erase(&path)?,
            pattern => self.store(&path, data, pattern)?,
        }
        if self.free_list.len() >= FREE_LIST_MAX {
            self.compact()?;
        }
        Ok(())
    }

    fn store(
        &mut self,
        path: &[usize; MAP_DEPTH],
        data: &Block,
        pattern: Option<u16>,
    ) -> Result<(), IdeError> {
        for depth in 1..MAP_DEPTH {
            match map_entry(&self.cache[depth - 1], path[depth - 1]) {
                0 => self.new_map(depth, path[depth - 1])?,
                block => self.load_map(block, depth)?,
            }
        }
        let last = MAP_DEPTH - 1;
        let value = match pattern {
            Some(pattern) => FILL_TAG | u32::from(pattern),
            None => {
                let prev = map_entry(&self.cache[last], path[last]);
                let block = if prev == 0 || prev >= FILL_TAG {
                    self.allocate()
                } else {
                    prev
                };
                write_block(&mut self.storage, block, data)?;
                block
            }
        };
        self.set_entry(last, path[last], value)
    }

    /// Clear the sector's entry and unlink maps left empty.
    fn erase(&mut self, path: &[usize; MAP_DEPTH]) -> Result<(), IdeError> {
        if self.lookup(path)? == 0 {
            return Ok(());
        }
        let mut depth = MAP_DEPTH - 1;
        self.set_entry(depth, path[depth], 0)?;
        while depth > 0 && is_zero(&self.cache[depth]) {
            depth -= 1;
            self.set_entry(depth, path[depth], 0)?;
        }
        Ok(())
    }

    /// Allocate a zeroed map at `depth` and link it from its parent.
    fn new_map(&mut self, depth: usize, parent_index: usize) -> Result<(), IdeError> {
        let block = self.allocate();
        self.cache[depth] = [0; SECTOR_SIZE];
        write_block(&mut self.storage, block, &self.cache[depth])?;
        self.cached[depth] = block;
        self.set_entry(depth - 1, parent_index, block)
    }

    /// Update an entry of the cached map at `depth`, writing through and
    /// freeing any block the entry used to own.
    fn set_entry(&mut self, depth: usize, index: usize, value: u32) -> Result<(), IdeError> {
        let prev = map_entry(&self.cache[depth], index);
        if prev == value {
            return Ok(());
        }
        put_u32(&mut self.cache[depth], index * 4, value);
        write_block(&mut self.storage, self.cached[depth], &self.cache[depth])?;

        let owned_block = prev != 0 && prev < FILL_TAG;
        let releases = value == 0 || value >= FILL_TAG;
        if owned_block && releases {
            if depth + 1 < MAP_DEPTH && self.cached[depth + 1] == prev {
                self.cached[depth + 1] = 0;
            }
            self.free_list.push(prev);
        }
        Ok(())
    }

    fn allocate(&mut self) -> u32 {
        self.free_list.pop().unwrap_or_else(|| {
            let block = self.next_free;
            self.next_free += 1;
            block
        })
    }

    /// Move live blocks from the end of the file into freed holes and
    /// truncate.
    pub fn compact(&mut self) -> Result<(), IdeError> {
        if self.free_list.is_empty() {
            return Ok(());
        }
        let end = self.next_free - self.free_list.len() as u32;
        let mut holes: Vec<u32> = self.free_list.drain(..).filter(|&b| b < end).collect();
        log::info!(
            "IDE: compacting {} blocks to {end}, {} holes",
            self.next_free,
            holes.len()
        );

        if !holes.is_empty() {
            // Maps below the root may move.
            self.cached[1..].fill(0);
            let mut root = self.cache[0];
            self.compact_map(ROOT_BLOCK, &mut root, 0, end, &mut holes)?;
            self.cache[0] = root;
        }
        if !holes.is_empty() {
            log::warn!("IDE: {} holes left after compaction", holes.len());
            let left = holes.len();
            self.free_list = holes;
            return Err(IdeError::FreeListNotCleared(left));
        }

        self.storage.set_len(u64::from(end) * BLOCK_BYTES)?;
        self.next_free = end;
        Ok(())
    }

    fn compact_map(
        &mut self,
        block: u32,
        map: &mut Block,
        depth: usize,
        end: u32,
        holes: &mut Vec<u32>,
    ) -> Result<(), IdeError> {
        let is_leaf = depth + 1 == MAP_DEPTH;
        let mut modified = false;
        for index in (0..MAP_ENTRIES).rev() {
            if holes.is_empty() {
                break;
            }
            let mut entry = map_entry(map, index);
            if entry == 0 || entry >= FILL_TAG || (is_leaf && entry < end) {
                continue;
            }
            let mut child = [0; SECTOR_SIZE];
            read_block(&mut self.storage, entry, &mut child)?;
            if entry >= end {
                let Some(hole) = holes.pop() else { break };
                write_block(&mut self.storage, hole, &child)?;
                entry = hole;
                put_u32(map, index * 4, entry);
                modified = true;
            }
            if !is_leaf {
                self.compact_map(entry, &mut child, depth + 1, end, holes)?;
            }
        }
        if modified {
            write_block(&mut self.storage, block, map)?;
        }
        Ok(())
    }
}

fn read_block<S: Storage>(storage: &mut S, block: u32, buffer: &mut Block) -> io::Result<()> {
    storage.seek(SeekFrom::Start(u64::from(block) * BLOCK_BYTES))?;
    storage.read_exact(buffer)
}

fn write_block<S: Storage>(storage: &mut S, block: u32, data: &Block) -> io::Result<()> {
    storage.seek(SeekFrom::Start(u64::from(block) * BLOCK_BYTES))?;
    storage.write_all(data)
}

fn map_entry(map: &Block, index: usize) -> u32 {
    get_u32(map, index * 4)
}

fn get_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn put_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_str(bytes: &mut [u8], offset: usize, max: usize, text: &str) {
    let len = text.len().min(max);
    bytes[offset..offset + len].copy_from_slice(&text.as_bytes()[..len]);
}

fn get_str(bytes: &[u8], offset: usize, max: usize) -> String {
    let field = &bytes[offset..offset + max];
    let len = field.iter().position(|&b| b == 0).unwrap_or(max);
    String::from_utf8_lossy(&field[..len]).into_owned()
}

fn fill(buffer: &mut Block, pattern: u16) {
    for pair in buffer.chunks_exact_mut(2) {
        pair.copy_from_slice(&pattern.to_le_bytes());
    }
}

/// The repeated 16-bit value if every pair of bytes in `data` matches.
fn uniform_pattern(data: &Block) -> Option<u16> {
    let first = [data[0], data[1]];
    data.chunks_exact(2)
        .all(|pair| pair == first)
        .then_some(u16::from_le_bytes(first))
}

fn is_zero(map: &Block) -> bool {
    map.iter().all(|&b| b == 0)
}
