//! # ChunkStore
//!
//! An append-only, single-file object store with versioned commits:
//! - Fixed 64-byte header at offset 0 referencing the committed state
//! - Index-array snapshots mapping integer slots to byte chunks
//! - Payloads and snapshots appended, never rewritten
//! - Header rewritten in place, leaving a trail of prior commits
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Store                               │
//! │        (live-chunk table, commit orchestration)             │
//! └───────┬──────────────────┬──────────────────┬───────────────┘
//!         │                  │                  │
//!         ▼                  ▼                  ▼
//!  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//!  │   Header    │    │ Index Array │    │   Chunk     │
//!  │ (offset 0)  │    │ (snapshots) │    │ (payloads)  │
//!  └──────┬──────┘    └──────┬──────┘    └──────┬──────┘
//!         │                  │                  │
//!         └──────────────────┴──────────────────┘
//!                            │
//!                            ▼
//!                  ┌───────────────────┐
//!                  │   Backing file    │
//!                  │ (append-only log) │
//!                  └───────────────────┘
//! ```
//!
//! Write path: mutate a chunk buffer → `Chunk::commit` appends the
//! payload and updates the slot's index entry → `Store::commit` appends
//! the index snapshot and rewrites the header. Read path: open the
//! header → load the snapshot at `current_commit` → read payloads on
//! demand at each slot's offset/length.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod header;
pub mod index;
pub mod chunk;
pub mod store;

mod fileio;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{Config, SyncStrategy};
pub use chunk::Chunk;
pub use store::Store;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ChunkStore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
