//! Disk images as seen by the controller.
//!
//! The controller only needs sector-level access. Container formats are
//! parsed elsewhere and handed over as a [`DiskImage`].

/// Sector-addressable disk contents.
///
/// Track and head are physical positions; `sector` is the sector ID the
/// controller searches for.
pub trait DiskImage: Send {
    /// Sector data, or `None` if no such sector exists on the track.
    fn read_sector(&self, track: u8, head: u8, sector: u8) -> Option<&[u8]>;

    /// Overwrite a sector. Returns `false` if the sector does not exist or
    /// the image refuses the write.
    fn write_sector(&mut self, track: u8, head: u8, sector: u8, data: &[u8]) -> bool;

    /// ID field `[C, H, R, N]` of the `index`th sector passing the head.
    fn sector_id(&self, track: u8, head: u8, index: usize) -> Option<[u8; 4]>;

    /// Sectors on the given track, zero if the track does not exist.
    fn sector_count(&self, track: u8, head: u8) -> usize;

    fn is_write_protected(&self) -> bool {
        false
    }
}

/// Tracks per side on a [`SectorImage`].
pub const TRACKS: usize = 80;
/// Sectors per track on a [`SectorImage`].
pub const SECTORS: usize = 16;
/// Bytes per sector on a [`SectorImage`].
pub const SECTOR_SIZE: usize = 256;

const SIDE_SIZE: usize = TRACKS * SECTORS * SECTOR_SIZE;

/// Raw sector dump: 80 tracks of 16 × 256-byte sectors, one or two sides.
///
/// Sectors are stored track-major, then head, then sector. Images larger
/// than one side's worth of data are double-sided. Short images are padded
/// with zeros.
pub struct SectorImage {
    data: Vec<u8>,
    sides: u8,
    write_protected: bool,
}

impl SectorImage {
    /// Wrap a raw dump.
    #[must_use]
    pub fn new(mut data: Vec<u8>) -> Self {
        let sides: u8 = if data.len() > SIDE_SIZE { 2 } else { 1 };
        data.resize(SIDE_SIZE * sides as usize, 0);
        Self {
            data,
            sides,
            write_protected: false,
        }
    }

    /// A formatted, zero-filled image.
    #[must_use]
    pub fn blank(sides: u8) -> Self {
        let sides = sides.clamp(1, 2);
        Self {
            data: vec![0; SIDE_SIZE * sides as usize],
            sides,
            write_protected: false,
        }
    }

    #[must_use]
    pub fn sides(&self) -> u8 {
        self.sides
    }

    pub fn set_write_protected(&mut self, protected: bool) {
        self.write_protected = protected;
    }

    /// The whole image, for saving back to disk.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn offset(&self, track: u8, head: u8, sector: u8) -> Option<usize> {
        let (track, head, sector) = (track as usize, head as usize, sector as usize);
        if track >= TRACKS || head >= self.sides as usize || sector >= SECTORS {
            return None;
        }
        Some(((track * self.sides as usize + head) * SECTORS + sector) * SECTOR_SIZE)
    }
}

impl DiskImage for SectorImage {
    fn read_sector(&self, track: u8, head: u8, sector: u8) -> Option<&[u8]> {
        let start = self.offset(track, head, sector)?;
        Some(&self.data[start..start + SECTOR_SIZE])
    }

    fn write_sector(&mut self, track: u8, head: u8, sector: u8, data: &[u8]) -> bool {
        if self.write_protected {
            return false;
        }
        let Some(start) = self.offset(track, head, sector) else {
            return false;
        };
        let len = data.len().min(SECTOR_SIZE);
        self.data[start..start + len].copy_from_slice(&data[..len]);
        true
    }

    fn sector_id(&self, track: u8, head: u8, index: usize) -> Option<[u8; 4]> {
        if index >= self.sector_count(track, head) {
            return None;
        }
        // Size code 1 = 256 bytes.
        Some([track, head, index as u8, 1])
    }

    fn sector_count(&self, track: u8, head: u8) -> usize {
        if (track as usize) < TRACKS && head < self.sides {
            SECTORS
        } else {
            0
        }
    }

    fn is_write_protected(&self) -> bool {
        self.write_protected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_count_follows_length() {
        assert_eq!(SectorImage::new(vec![0; SIDE_SIZE]).sides(), 1);
        assert_eq!(SectorImage::new(vec![0; SIDE_SIZE + 1]).sides(), 2);
        assert_eq!(SectorImage::new(Vec::new()).as_bytes().len(), SIDE_SIZE);
    }

    #[test]
    fn interleaved_layout() {
        let mut raw = vec![0; SIDE_SIZE * 2];
        // Track 1, head 1, sector 2.
        raw[((SECTORS * 2 + SECTORS + 2) * SECTOR_SIZE)] = 0xA5;
        let image = SectorImage::new(raw);
        assert_eq!(image.read_sector(1, 1, 2).map(|s| s[0]), Some(0xA5));
        assert_eq!(image.read_sector(1, 0, 2).map(|s| s[0]), Some(0));
    }

    #[test]
    fn out_of_range_sectors_are_absent() {
        let image = SectorImage::blank(1);
        assert!(image.read_sector(80, 0, 0).is_none());
        assert!(image.read_sector(0, 0, 16).is_none());
        assert!(image.read_sector(0, 1, 0).is_none());
        assert_eq!(image.sector_count(0, 1), 0);
        assert_eq!(image.sector_count(79, 0), 16);
        assert_eq!(image.sector_id(3, 0, 5), Some([3, 0, 5, 1]));
        assert_eq!(image.sector_id(3, 0, 16), None);
    }

    #[test]
    fn write_protect_blocks_writes() {
        let mut image = SectorImage::blank(2);
        assert!(image.write_sector(10, 1, 4, &[1, 2, 3]));
        assert_eq!(&image.read_sector(10, 1, 4).expect("sector")[..4], &[1, 2, 3, 0]);
        image.set_write_protected(true);
        assert!(!image.write_sector(10, 1, 4, &[9]));
        assert!(image.is_write_protected());
    }
}
