//! Disk-image handle (C5): owns the raw block bytes and, if present, the
//! trailing per-block error table, and exposes the pure `block(lba)` /
//! `error(lba)` accessors the Design Notes call for so the in-memory model
//! has no cycles even though the on-disk structures do (directory -> file
//! -> side sector -> data block).

use std::path::Path;

use crate::error::XdError;
use crate::geometry::{self, Geometry};
use crate::petscii::str_petscii_to_ascii;

pub const BLOCK_SIZE: usize = 256;

/// A loaded disk image: geometry, block bytes, and an optional per-LBA
/// error-table byte (fdc error code, `1` meaning "no error").
#[derive(Debug, Clone)]
pub struct DiskImage {
    pub geometry: Geometry,
    blocks: Vec<u8>,
    error_table: Option<Vec<u8>>,
}

/// `fdc_err` classification from `imgtool.c`'s `is_bad_block`: `1` is
/// the canonical "good" code; the absence of a table also means good.
pub fn is_bad_block(fdc_err: u8) -> bool {
    !matches!(fdc_err, 0 | 1)
}

impl DiskImage {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, XdError> {
        let (geometry, has_table) =
            geometry::identify(data.len() as u64).ok_or_else(|| XdError::UnknownGeometry {
                path: "<memory>".into(),
                size: data.len() as u64,
            })?;
        Self::split(geometry, data, has_table)
    }

    pub fn load(path: &Path) -> Result<Self, XdError> {
        let data = std::fs::read(path).map_err(|source| XdError::Io {
            context: format!("reading disk image {}", path.display()),
            source,
        })?;
        let (geometry, has_table) =
            geometry::identify(data.len() as u64).ok_or_else(|| XdError::UnknownGeometry {
                path: path.display().to_string(),
                size: data.len() as u64,
            })?;
        Self::split(geometry, data, has_table)
    }

    fn split(geometry: Geometry, mut data: Vec<u8>, has_table: bool) -> Result<Self, XdError> {
        let block_bytes = geometry.blocks as usize * BLOCK_SIZE;
        let error_table = if has_table {
            Some(data.split_off(block_bytes))
        } else {
            None
        };
        Ok(Self {
            geometry,
            blocks: data,
            error_table,
        })
    }

    pub fn blocks_len(&self) -> u32 {
        self.geometry.blocks
    }

    /// The 256-byte block at a given LBA.
    pub fn block(&self, lba: u32) -> &[u8] {
        let start = lba as usize * BLOCK_SIZE;
        &self.blocks[start..start + BLOCK_SIZE]
    }

    pub fn block_mut(&mut self, lba: u32) -> &mut [u8] {
        let start = lba as usize * BLOCK_SIZE;
        &mut self.blocks[start..start + BLOCK_SIZE]
    }

    /// The fdc error-table byte for `lba`; `1` ("good") when the image
    /// carries no error table at all.
    pub fn error(&self, lba: u32) -> u8 {
        match &self.error_table {
            Some(table) => table.get(lba as usize).copied().unwrap_or(1),
            None => 1,
        }
    }

    pub fn set_error(&mut self, lba: u32, value: u8) {
        if self.error_table.is_none() {
            self.error_table = Some(vec![1; self.geometry.blocks as usize]);
        }
        if let Some(table) = &mut self.error_table {
            table[lba as usize] = value;
        }
    }

    pub fn has_error_table(&self) -> bool {
        self.error_table.is_some()
    }

    /// Read a block by track/sector instead of raw LBA.
    pub fn read_ts(&self, track: u8, sector: u8) -> Result<&[u8], XdError> {
        let lba = self.geometry.lba_checked(track, sector)?;
        Ok(self.block(lba))
    }

    /// Disk name, ID and DOS version from the header/BAM sector
    /// (per-geometry offsets documented alongside `Geometry`).
    pub fn header(&self) -> (Vec<u8>, [u8; 2], String) {
        let (t, s) = self.geometry.header_location();
        let (name_off, id_off) = self.geometry.header_offsets();
        let lba = self.geometry.lba(t, s).expect("header location is always valid");
        let block = self.block(lba);

        let mut name_raw = [0u8; 16];
        name_raw.copy_from_slice(&block[name_off..name_off + 16]);
        let name = str_petscii_to_ascii(crate::petscii::strip_name_padding(&name_raw));

        let id = [block[id_off], block[id_off + 1]];
        let dos_version = String::from_utf8_lossy(&[block[id_off + 2], block[id_off + 3]]).into_owned();

        (name, id, dos_version)
    }

    /// Serialize back to bytes, error table appended if present.
    pub fn into_bytes(mut self) -> Vec<u8> {
        if let Some(table) = self.error_table.take() {
            self.blocks.extend_from_slice(&table);
        }
        self.blocks
    }
}
