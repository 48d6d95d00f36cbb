//! Error types for ChunkStore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for ChunkStore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read at offset {offset}: wanted {expected} bytes")]
    ShortRead { offset: u64, expected: usize },

    #[error("short write at offset {offset}: wanted {expected} bytes")]
    ShortWrite { offset: u64, expected: usize },

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    // -------------------------------------------------------------------------
    // Slot Errors
    // -------------------------------------------------------------------------
    #[error("slot {slot} out of bounds: store has {slots} slots")]
    OutOfBounds { slot: usize, slots: usize },

    #[error("slot {0} already has a live chunk")]
    SlotOccupied(usize),

    // -------------------------------------------------------------------------
    // Buffer Errors
    // -------------------------------------------------------------------------
    #[error("buffer too small: payload is {required} bytes, buffer holds {provided}")]
    BufferTooSmall { required: usize, provided: usize },

    #[error("allocation of {0} bytes failed")]
    OutOfMemory(usize),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("cannot shrink store from {current} to {requested} slots")]
    TooSmall { current: usize, requested: usize },

    #[error("{0} chunk handle(s) still live")]
    OpenChunks(usize),

    #[error("chunk is no longer bound to a store")]
    NoFile,
}
