//! Disk-image geometry (C5, §4.5.1), grounded on the original server's
//! `diskimgs.c`/`diskimgs.h`: piecewise-linear logical-block-address
//! functions per disk type, plus the static per-type tables used for
//! identification, BAM layout, and REL-file sizing.

use crate::error::XdError;

/// A supported Commodore disk image type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskType {
    D64,
    D71,
    D80,
    D81,
    D82,
}

/// Static geometry facts for one disk type (`diskimgs.c`'s `Disk_Image_t`
/// table initializers).
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub disk_type: DiskType,
    pub dos_version: &'static str,
    pub tracks: u8,
    pub max_sectors: u8,
    pub sides: u8,
    pub bam_blocks: u8,
    pub bam_offset: u8,
    pub tracks_per_bam: u8,
    pub dir_interleave: u8,
    pub dat_interleave: u8,
    pub has_ssb: bool,
    pub blocks: u32,
    pub rel_blocks: u32,
    pub dir_track: u8,
    /// Up to four BAM block (track, sector) pairs, padded with zeros.
    pub bamts: [u8; 8],
}

pub const D64: Geometry = Geometry {
    disk_type: DiskType::D64,
    dos_version: "2A",
    tracks: 35,
    max_sectors: 21,
    sides: 1,
    bam_blocks: 1,
    bam_offset: 4,
    tracks_per_bam: 35,
    dir_interleave: 3,
    dat_interleave: 10,
    has_ssb: false,
    blocks: 683,
    rel_blocks: 706,
    dir_track: 18,
    bamts: [18, 0, 0, 0, 0, 0, 0, 0],
};

pub const D71: Geometry = Geometry {
    disk_type: DiskType::D71,
    dos_version: "2A",
    tracks: 35,
    max_sectors: 21,
    sides: 2,
    bam_blocks: 2,
    bam_offset: 4,
    tracks_per_bam: 35,
    dir_interleave: 3,
    dat_interleave: 6,
    has_ssb: false,
    blocks: 1366,
    rel_blocks: 706,
    dir_track: 18,
    bamts: [18, 0, 53, 0, 0, 0, 0, 0],
};

pub const D80: Geometry = Geometry {
    disk_type: DiskType::D80,
    dos_version: "2C",
    tracks: 77,
    max_sectors: 29,
    sides: 1,
    bam_blocks: 2,
    bam_offset: 6,
    tracks_per_bam: 50,
    dir_interleave: 3,
    dat_interleave: 5,
    has_ssb: false,
    blocks: 2083,
    rel_blocks: 726,
    dir_track: 39,
    bamts: [38, 0, 38, 3, 0, 0, 0, 0],
};

pub const D81: Geometry = Geometry {
    disk_type: DiskType::D81,
    dos_version: "3D",
    tracks: 80,
    max_sectors: 40,
    sides: 1,
    bam_blocks: 2,
    bam_offset: 16,
    tracks_per_bam: 40,
    dir_interleave: 1,
    dat_interleave: 1,
    has_ssb: true,
    blocks: 3200,
    rel_blocks: 3026,
    dir_track: 40,
    bamts: [40, 1, 40, 2, 0, 0, 0, 0],
};

pub const D82: Geometry = Geometry {
    disk_type: DiskType::D82,
    dos_version: "2C",
    tracks: 77,
    max_sectors: 29,
    sides: 2,
    bam_blocks: 4,
    bam_offset: 6,
    tracks_per_bam: 50,
    dir_interleave: 3,
    dat_interleave: 5,
    has_ssb: true,
    blocks: 4166,
    rel_blocks: 4126,
    dir_track: 39,
    bamts: [38, 0, 38, 3, 38, 6, 38, 9],
};

/// Last valid sector number for a D64/D71 (first-side) track, or -1.
fn lsec64(t: i32) -> i32 {
    if t < 1 {
        -1
    } else if t <= 17 {
        21
    } else if t <= 24 {
        19
    } else if t <= 30 {
        18
    } else if t <= 35 {
        17
    } else {
        -1
    }
}

fn lba64(t: i32, s: i32) -> i32 {
    if s < 0 || t < 1 {
        return -1;
    }
    if t <= 17 {
        return if s >= 21 { -1 } else { s + (t - 1) * 21 };
    }
    if t <= 24 {
        return if s >= 19 { -1 } else { s + 17 * 21 + (t - 18) * 19 };
    }
    if t <= 30 {
        return if s >= 18 {
            -1
        } else {
            s + 17 * 21 + 7 * 19 + (t - 25) * 18
        };
    }
    if t <= 35 {
        return if s >= 17 {
            -1
        } else {
            s + 17 * 21 + 7 * 19 + 6 * 18 + (t - 31) * 17
        };
    }
    -1
}

fn lba71(t: i32, s: i32) -> i32 {
    if t < 36 {
        return lba64(t, s);
    }
    let lba = lba64(t - 35, s);
    if lba < 0 {
        -1
    } else {
        683 + lba
    }
}

fn lba80(t: i32, s: i32) -> i32 {
    if s < 0 || t < 1 {
        return -1;
    }
    if t <= 39 {
        return if s >= 29 { -1 } else { s + (t - 1) * 29 };
    }
    if t <= 53 {
        return if s >= 27 { -1 } else { s + 39 * 29 + (t - 40) * 27 };
    }
    if t <= 64 {
        return if s >= 25 {
            -1
        } else {
            s + 39 * 29 + 14 * 27 + (t - 54) * 25
        };
    }
    if t <= 77 {
        return if s >= 23 {
            -1
        } else {
            s + 39 * 29 + 14 * 27 + 11 * 25 + (t - 65) * 23
        };
    }
    -1
}

fn lba82(t: i32, s: i32) -> i32 {
    if t < 78 {
        return lba80(t, s);
    }
    let lba = lba80(t - 77, s);
    if lba < 0 {
        -1
    } else {
        2083 + lba
    }
}

fn lba81(t: i32, s: i32) -> i32 {
    if s < 0 || s > 39 || t < 1 || t > 80 {
        return -1;
    }
    s + (t - 1) * 40
}

impl Geometry {
    /// Logical block address of (track, sector), or `None` for an
    /// illegal pair.
    pub fn lba(&self, track: u8, sector: u8) -> Option<u32> {
        let (t, s) = (track as i32, sector as i32);
        let raw = match self.disk_type {
            DiskType::D64 => lba64(t, s),
            DiskType::D71 => lba71(t, s),
            DiskType::D80 => lba80(t, s),
            DiskType::D81 => lba81(t, s),
            DiskType::D82 => lba82(t, s),
        };
        if raw < 0 {
            None
        } else {
            Some(raw as u32)
        }
    }

    /// Highest legal sector number on `track`, or `None` if the track
    /// is out of range.
    pub fn last_sector(&self, track: u8) -> Option<u8> {
        let t = track as i32;
        let raw = match self.disk_type {
            DiskType::D64 => lsec64(t),
            DiskType::D71 => lsec64(if t > 35 { t - 35 } else { t }),
            DiskType::D81 => {
                if t < 1 || t > 80 {
                    -1
                } else {
                    40
                }
            }
            DiskType::D80 | DiskType::D82 => {
                let t = if t > 77 { t - 77 } else { t };
                if t < 1 {
                    -1
                } else if t <= 39 {
                    29
                } else if t <= 53 {
                    27
                } else if t <= 64 {
                    25
                } else if t <= 77 {
                    23
                } else {
                    -1
                }
            }
        };
        if raw < 0 {
            None
        } else {
            Some(raw as u8)
        }
    }

    pub fn lba_checked(&self, track: u8, sector: u8) -> Result<u32, XdError> {
        self.lba(track, sector)
            .ok_or(XdError::IllegalTrackSector { track, sector })
    }

    /// The (track, sector) of the header/BAM sector used for the disk
    /// name, ID and DOS version (extracted from `imgtool.c`'s
    /// `catalog()`, not part of the original `Disk_Image_t` table).
    pub fn header_location(&self) -> (u8, u8) {
        match self.disk_type {
            DiskType::D64 | DiskType::D71 => (18, 0),
            DiskType::D80 | DiskType::D82 => (39, 0),
            DiskType::D81 => (40, 0),
        }
    }

    /// The (track, sector) of the directory's first sector (§3 "Dir
    /// T/S"), distinct from the header/BAM sector `header_location`
    /// returns: the BAM block's 8 slots are not directory entries, and
    /// walking from it misparses them as such.
    pub fn directory_location(&self) -> (u8, u8) {
        match self.disk_type {
            DiskType::D64 | DiskType::D71 => (18, 1),
            DiskType::D80 | DiskType::D82 => (39, 1),
            DiskType::D81 => (40, 3),
        }
    }

    /// Byte offsets of (name, id/dos-version) within the header sector.
    pub fn header_offsets(&self) -> (usize, usize) {
        match self.disk_type {
            DiskType::D64 | DiskType::D71 => (0x90, 0xa2),
            DiskType::D80 | DiskType::D82 => (6, 24),
            DiskType::D81 => (4, 22),
        }
    }
}

/// Identify a disk image purely by file size (§4.5.1): the raw image is
/// `blocks * 256` bytes, or `blocks * 257` with a trailing one-byte
/// error-table entry per block.
pub fn identify(filesize: u64) -> Option<(Geometry, bool)> {
    for geo in [D64, D71, D80, D82, D81] {
        let blocks = geo.blocks as u64;
        if filesize == blocks * 256 {
            return Some((geo, false));
        }
        if filesize == blocks * 256 + blocks {
            return Some((geo, true));
        }
    }
    None
}
