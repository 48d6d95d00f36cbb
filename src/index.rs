//! Index array snapshots
//!
//! An ordered run of fixed-width entries locating every chunk payload in
//! the file. Each commit appends the whole array as a new snapshot and
//! repoints the header at it. Entry 0 of an appended snapshot records the
//! offset of the snapshot it superseded, so the snapshots on disk form a
//! chain from `current_commit` back to `first_commit`.
//!
//! ## Snapshot layout
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ Entry 0: back-link                            │
//! │   prev snapshot offset (8) | this length (8)  │
//! ├───────────────────────────────────────────────┤
//! │ Entry 1..=N: chunk pointers                   │
//! │   payload offset (8) | payload length (8)     │
//! │   ... one per slot ...                        │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Slots are exposed as `0..N`; slot `n` lives at raw entry `n + 1`.

use std::fs::File;

use crate::error::{Result, StoreError};
use crate::fileio;
use crate::header::Header;

/// Serialized size of one index entry in bytes
pub const ENTRY_SIZE: u64 = 16;

/// One index entry: where a payload (or a prior snapshot) lives on disk
///
/// A length of 0 means the slot has never had a committed payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexEntry {
    /// File offset of the payload
    pub offset: u64,
    /// Payload length in bytes
    pub len: u64,
}

impl IndexEntry {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.len.to_le_bytes());
    }

    fn decode(raw: &[u8]) -> Self {
        IndexEntry {
            offset: u64::from_le_bytes(raw[0..8].try_into().unwrap()),
            len: u64::from_le_bytes(raw[8..16].try_into().unwrap()),
        }
    }
}

/// In-memory index array: the back-link entry plus one entry per slot
pub struct IndexArray {
    entries: Vec<IndexEntry>,
    /// Offset of the most recently committed snapshot, 0 before the first
    committed_at: u64,
}

impl IndexArray {
    /// Allocate a zeroed array with `slots` chunk slots. No I/O.
    pub fn new(slots: usize) -> Result<Self> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(slots + 1)
            .map_err(|_| StoreError::OutOfMemory((slots + 1) * ENTRY_SIZE as usize))?;
        entries.resize(slots + 1, IndexEntry::default());
        Ok(IndexArray {
            entries,
            committed_at: 0,
        })
    }

    /// Load the snapshot referenced by `header.current_commit`.
    pub fn load(header: &Header, file: &mut File) -> Result<Self> {
        let slots = header.array_size() as usize;
        let offset = header.current_commit();
        let byte_len = (slots as u64 + 1) * ENTRY_SIZE;

        let mut raw = fileio::alloc_buffer(byte_len as usize)?;
        fileio::read_exact_at(file, offset, &mut raw)?;

        let mut entries = Vec::new();
        entries
            .try_reserve_exact(slots + 1)
            .map_err(|_| StoreError::OutOfMemory(byte_len as usize))?;
        for i in 0..=slots {
            let at = i * ENTRY_SIZE as usize;
            entries.push(IndexEntry::decode(&raw[at..at + ENTRY_SIZE as usize]));
        }

        Ok(IndexArray {
            entries,
            committed_at: offset,
        })
    }

    /// Number of chunk slots
    pub fn slots(&self) -> usize {
        self.entries.len() - 1
    }

    /// Serialized width of the snapshot in bytes
    pub fn byte_len(&self) -> u64 {
        self.entries.len() as u64 * ENTRY_SIZE
    }

    /// Offset of the most recently committed snapshot (0 before any commit)
    pub fn committed_at(&self) -> u64 {
        self.committed_at
    }

    /// The back-link entry: previous snapshot offset and this snapshot's
    /// byte length
    pub fn back_link(&self) -> IndexEntry {
        self.entries[0]
    }

    /// Grow the array to `new_slots`, zero-filling the tail.
    ///
    /// Shrinking fails with `TooSmall`; the current size is a no-op. On
    /// growth, `header.array_size` is updated to the new slot count.
    pub fn resize(&mut self, header: &mut Header, new_slots: usize) -> Result<()> {
        let current = self.slots();
        if new_slots < current {
            return Err(StoreError::TooSmall {
                current,
                requested: new_slots,
            });
        }
        if new_slots == current {
            return Ok(());
        }

        let mut grown = Vec::new();
        grown
            .try_reserve_exact(new_slots + 1)
            .map_err(|_| StoreError::OutOfMemory((new_slots + 1) * ENTRY_SIZE as usize))?;
        grown.extend_from_slice(&self.entries);
        grown.resize(new_slots + 1, IndexEntry::default());
        self.entries = grown;

        header.set_array_size(new_slots as u64);
        Ok(())
    }

    /// Append the array as a new snapshot and repoint the header at it.
    ///
    /// Entry 0 is stamped with the previous snapshot's offset before the
    /// append, extending the back-link chain. The header and the
    /// back-link record mutate only after the append succeeds, so a
    /// failed commit leaves both at their pre-commit values.
    pub fn commit(&mut self, header: &mut Header, file: &mut File) -> Result<()> {
        self.entries[0] = IndexEntry {
            offset: self.committed_at,
            len: self.byte_len(),
        };

        let mut raw = Vec::new();
        raw.try_reserve_exact(self.byte_len() as usize)
            .map_err(|_| StoreError::OutOfMemory(self.byte_len() as usize))?;
        for entry in &self.entries {
            entry.encode_into(&mut raw);
        }

        let position = fileio::append(file, &raw)?;

        header.set_current_commit(position);
        if header.first_commit() == 0 {
            header.set_first_commit(position);
        }
        self.committed_at = position;
        Ok(())
    }

    /// Chunk pointer for `slot`
    pub fn slot(&self, slot: usize) -> Result<&IndexEntry> {
        let slots = self.slots();
        slot.checked_add(1)
            .and_then(|i| self.entries.get(i))
            .ok_or(StoreError::OutOfBounds { slot, slots })
    }

    /// Mutable chunk pointer for `slot`
    pub fn slot_mut(&mut self, slot: usize) -> Result<&mut IndexEntry> {
        let slots = self.slots();
        slot.checked_add(1)
            .and_then(|i| self.entries.get_mut(i))
            .ok_or(StoreError::OutOfBounds { slot, slots })
    }
}
