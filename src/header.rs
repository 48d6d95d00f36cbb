//! File header
//!
//! Fixed 64-byte record at file offset 0 identifying the format and the
//! current committed index snapshot. Committing the header appends a copy
//! at end-of-file before rewriting offset 0, so the previous header bytes
//! survive in the append region as a historical trail.
//!
//! ## Layout (little-endian)
//! ```text
//! ┌────────────┬─────────────────────────────────────────────┐
//! │ Offset     │ Field                                       │
//! ├────────────┼─────────────────────────────────────────────┤
//! │  0..8      │ Magic: "CHUNK   "                           │
//! │  8..12     │ Version: u32 (current = 4)                  │
//! │ 12..14     │ Reserved padding: u16, preserved verbatim   │
//! │ 14..16     │ Endianness tag: u16 (0x000A)                │
//! │ 16..24     │ Array size: u64 (chunk slot count)          │
//! │ 24..32     │ Data start: u64 (= 64)                      │
//! │ 32..40     │ First commit offset: u64 (0 if none)        │
//! │ 40..48     │ Current commit offset: u64 (0 if none)      │
//! │ 48..56     │ Aux offset: u64 (reserved, commit-preserved)│
//! │ 56..64     │ Aux size: u64 (reserved, commit-preserved)  │
//! └────────────┴─────────────────────────────────────────────┘
//! ```

use std::fs::File;

use crate::error::{Result, StoreError};
use crate::fileio;

/// Magic bytes identifying a chunk store file
pub(crate) const MAGIC: &[u8; 8] = b"CHUNK   ";

/// Current format version
pub(crate) const FORMAT_VERSION: u32 = 4;

/// Endianness tag; a mismatch means the file was written by an
/// incompatible encoder
pub(crate) const ENDIAN_TAG: u16 = 0x000A;

/// Serialized header size in bytes
pub const HEADER_SIZE: u64 = 64;

/// In-memory header record
///
/// Magic and the endianness tag are constants validated on load rather
/// than stored. Everything except the commit pointers, array size, and
/// aux fields is immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    version: u32,
    reserved: u16,
    array_size: u64,
    data_start: u64,
    first_commit: u64,
    current_commit: u64,
    aux_offset: u64,
    aux_size: u64,
}

impl Header {
    /// Build a fresh header: current version, `data_start` right after the
    /// header, no commits yet.
    pub fn new() -> Self {
        Header {
            version: FORMAT_VERSION,
            reserved: 0,
            array_size: 0,
            data_start: HEADER_SIZE,
            first_commit: 0,
            current_commit: 0,
            aux_offset: 0,
            aux_size: 0,
        }
    }

    /// Read and validate the header at offset 0.
    pub fn load(file: &mut File) -> Result<Self> {
        let mut raw = [0u8; HEADER_SIZE as usize];
        fileio::read_exact_at(file, 0, &mut raw)?;
        Self::decode(&raw)
    }

    /// Re-read the bytes at offset 0 into this header.
    pub fn reload(&mut self, file: &mut File) -> Result<()> {
        *self = Self::load(file)?;
        Ok(())
    }

    /// Commit the header: append a copy at end-of-file, then overwrite the
    /// bytes at offset 0.
    ///
    /// The append happens first so a crash before the rewrite leaves the
    /// in-place header untouched and the file still referencing the
    /// previous snapshot.
    pub fn commit(&self, file: &mut File) -> Result<()> {
        let raw = self.encode();
        fileio::append(file, &raw)?;
        fileio::write_all_at(file, 0, &raw)?;
        Ok(())
    }

    fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut raw = [0u8; HEADER_SIZE as usize];
        raw[0..8].copy_from_slice(MAGIC);
        raw[8..12].copy_from_slice(&self.version.to_le_bytes());
        raw[12..14].copy_from_slice(&self.reserved.to_le_bytes());
        raw[14..16].copy_from_slice(&ENDIAN_TAG.to_le_bytes());
        raw[16..24].copy_from_slice(&self.array_size.to_le_bytes());
        raw[24..32].copy_from_slice(&self.data_start.to_le_bytes());
        raw[32..40].copy_from_slice(&self.first_commit.to_le_bytes());
        raw[40..48].copy_from_slice(&self.current_commit.to_le_bytes());
        raw[48..56].copy_from_slice(&self.aux_offset.to_le_bytes());
        raw[56..64].copy_from_slice(&self.aux_size.to_le_bytes());
        raw
    }

    fn decode(raw: &[u8; HEADER_SIZE as usize]) -> Result<Self> {
        if &raw[0..8] != MAGIC {
            return Err(StoreError::MalformedHeader(format!(
                "bad magic {:?}, expected {:?}",
                &raw[0..8],
                MAGIC
            )));
        }

        let version = u32::from_le_bytes(raw[8..12].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(StoreError::MalformedHeader(format!(
                "unsupported version {}, expected {}",
                version, FORMAT_VERSION
            )));
        }

        let endianness = u16::from_le_bytes(raw[14..16].try_into().unwrap());
        if endianness != ENDIAN_TAG {
            return Err(StoreError::MalformedHeader(format!(
                "endianness tag 0x{:04x}, expected 0x{:04x}",
                endianness, ENDIAN_TAG
            )));
        }

        Ok(Header {
            version,
            reserved: u16::from_le_bytes(raw[12..14].try_into().unwrap()),
            array_size: u64::from_le_bytes(raw[16..24].try_into().unwrap()),
            data_start: u64::from_le_bytes(raw[24..32].try_into().unwrap()),
            first_commit: u64::from_le_bytes(raw[32..40].try_into().unwrap()),
            current_commit: u64::from_le_bytes(raw[40..48].try_into().unwrap()),
            aux_offset: u64::from_le_bytes(raw[48..56].try_into().unwrap()),
            aux_size: u64::from_le_bytes(raw[56..64].try_into().unwrap()),
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Format version of this file
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Offset of the first byte after the header
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Number of chunk slots in the current snapshot
    pub fn array_size(&self) -> u64 {
        self.array_size
    }

    pub fn set_array_size(&mut self, slots: u64) {
        self.array_size = slots;
    }

    /// Offset of the earliest index snapshot ever committed (0 if none)
    pub fn first_commit(&self) -> u64 {
        self.first_commit
    }

    pub fn set_first_commit(&mut self, offset: u64) {
        self.first_commit = offset;
    }

    /// Offset of the most recent index snapshot (0 if none)
    pub fn current_commit(&self) -> u64 {
        self.current_commit
    }

    pub fn set_current_commit(&mut self, offset: u64) {
        self.current_commit = offset;
    }

    /// Reserved auxiliary pointer, carried across commits untouched
    pub fn aux_offset(&self) -> u64 {
        self.aux_offset
    }

    pub fn set_aux_offset(&mut self, offset: u64) {
        self.aux_offset = offset;
    }

    /// Reserved auxiliary length, carried across commits untouched
    pub fn aux_size(&self) -> u64 {
        self.aux_size
    }

    pub fn set_aux_size(&mut self, size: u64) {
        self.aux_size = size;
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}
