//! Tests for store orchestration
//!
//! These tests verify:
//! - Create/open layout and commit pointers
//! - Slot bounds and occupancy rules
//! - Resize growth, no-op, and shrink rejection
//! - The destroy guard and dirty tracking
//! - The on-disk back-link chain between snapshots

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chunkstore::header::HEADER_SIZE;
use chunkstore::index::ENTRY_SIZE;
use chunkstore::{Config, Store, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store(slots: usize) -> (TempDir, PathBuf, Store) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.chunk");
    let store = Store::create(&path, slots, Config::default()).unwrap();
    (temp_dir, path, store)
}

fn read_u64_at(file: &mut File, offset: u64) -> u64 {
    file.seek(SeekFrom::Start(offset)).unwrap();
    let mut raw = [0u8; 8];
    file.read_exact(&mut raw).unwrap();
    u64::from_le_bytes(raw)
}

fn read_prefix(path: &Path, len: usize) -> Vec<u8> {
    let mut file = File::open(path).unwrap();
    let mut raw = vec![0u8; len];
    file.read_exact(&mut raw).unwrap();
    raw
}

// =============================================================================
// Create + Open Tests
// =============================================================================

#[test]
fn test_create_sets_layout() {
    let (_temp, _path, store) = setup_store(10);

    assert_eq!(store.slots(), 10);
    assert_eq!(store.live_chunks(), 0);
    assert!(!store.is_dirty());

    // The first snapshot lands right after the initial header
    assert_eq!(store.first_commit(), HEADER_SIZE);
    assert_eq!(store.current_commit(), HEADER_SIZE);

    for slot in 0..10 {
        assert_eq!(store.chunk_size(slot).unwrap(), 0);
    }
}

#[test]
fn test_open_round_trips_header_state() {
    let (_temp, path, store) = setup_store(10);
    store.set_aux(123, 456);
    store.close().unwrap();

    let store = Store::open(&path, Config::default()).unwrap();
    assert_eq!(store.slots(), 10);
    assert_eq!(store.aux(), (123, 456));
}

// =============================================================================
// Slot Bounds + Occupancy Tests
// =============================================================================

#[test]
fn test_chunk_size_out_of_bounds() {
    let (_temp, _path, store) = setup_store(10);

    let err = store.chunk_size(10).unwrap_err();
    assert!(matches!(
        err,
        StoreError::OutOfBounds {
            slot: 10,
            slots: 10
        }
    ));
}

#[test]
fn test_chunkify_occupied_slot_rejected() {
    let (_temp, _path, store) = setup_store(4);

    let _chunk = store.chunkify(2, b"first".to_vec()).unwrap();
    let err = store.chunkify(2, b"second".to_vec()).unwrap_err();
    assert!(matches!(err, StoreError::SlotOccupied(2)));
}

#[test]
fn test_open_chunk_buffer_too_small() {
    let (_temp, path, store) = setup_store(4);

    let chunk = store.chunkify(1, b"hello world".to_vec()).unwrap();
    chunk.commit().unwrap();
    drop(chunk);
    store.close().unwrap();

    let store = Store::open(&path, Config::default()).unwrap();
    let err = store.open_chunk(1, vec![0u8; 4]).unwrap_err();
    assert!(matches!(
        err,
        StoreError::BufferTooSmall {
            required: 11,
            provided: 4
        }
    ));
}

#[test]
fn test_open_chunk_truncates_oversized_buffer() {
    let (_temp, path, store) = setup_store(4);

    let chunk = store.chunkify(1, b"hello world".to_vec()).unwrap();
    chunk.commit().unwrap();
    drop(chunk);
    store.close().unwrap();

    let store = Store::open(&path, Config::default()).unwrap();
    let chunk = store.open_chunk(1, vec![0u8; 64]).unwrap();
    assert_eq!(chunk.len(), 11);
    assert_eq!(&chunk.bytes()[..], b"hello world");
}

#[test]
fn test_allocate_chunk_buffer_matches_entry() {
    let (_temp, _path, store) = setup_store(4);

    let chunk = store.chunkify(3, b"some payload".to_vec()).unwrap();
    drop(chunk);

    let buf = store.allocate_chunk_buffer(3).unwrap();
    assert_eq!(buf.len(), 12);
    assert!(buf.iter().all(|&b| b == 0));
}

// =============================================================================
// Resize Tests
// =============================================================================

#[test]
fn test_resize_shrink_fails() {
    let (_temp, _path, store) = setup_store(10);

    let err = store.resize(5).unwrap_err();
    assert!(matches!(
        err,
        StoreError::TooSmall {
            current: 10,
            requested: 5
        }
    ));
    assert_eq!(store.slots(), 10);
}

#[test]
fn test_resize_same_size_is_noop() {
    let (_temp, _path, store) = setup_store(10);

    store.resize(10).unwrap();
    assert_eq!(store.slots(), 10);
    assert!(!store.is_dirty());
}

#[test]
fn test_resize_grows_with_zeroed_tail() {
    let (_temp, path, store) = setup_store(10);

    let chunk = store.chunkify(1, b"kept".to_vec()).unwrap();
    chunk.commit().unwrap();
    drop(chunk);

    store.resize(20).unwrap();
    assert_eq!(store.slots(), 20);
    for slot in 10..20 {
        assert_eq!(store.chunk_size(slot).unwrap(), 0);
    }
    // Existing entries survive the copy
    assert_eq!(store.chunk_size(1).unwrap(), 4);

    store.close().unwrap();
    let store = Store::open(&path, Config::default()).unwrap();
    assert_eq!(store.slots(), 20);
    assert_eq!(store.chunk_size(1).unwrap(), 4);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_destroy_guard_counts_live_handles() {
    let (_temp, _path, store) = setup_store(4);

    let a = store.chunkify(0, b"a".to_vec()).unwrap();
    let b = store.chunkify(1, b"b".to_vec()).unwrap();

    let store = match store.destroy() {
        Err((store, StoreError::OpenChunks(2))) => store,
        _ => panic!("expected OpenChunks(2)"),
    };

    drop(a);
    drop(b);
    store.destroy().unwrap();
}

#[test]
fn test_dirty_tracking() {
    let (_temp, _path, store) = setup_store(4);
    assert!(!store.is_dirty());

    let chunk = store.chunkify(0, b"x".to_vec()).unwrap();
    assert!(store.is_dirty());

    store.commit_all().unwrap();
    assert!(!store.is_dirty());

    chunk.bytes_mut()[0] = b'y';
    assert!(store.is_dirty());
}

// =============================================================================
// On-Disk Layout Tests
// =============================================================================

#[test]
fn test_back_link_chain_reaches_first_commit() {
    let (_temp, path, store) = setup_store(4);

    store.commit_all().unwrap();
    let c1 = store.current_commit();
    store.commit_all().unwrap();
    let c2 = store.current_commit();
    assert_ne!(c1, c2);

    let first = store.first_commit();
    assert_eq!(first, HEADER_SIZE);
    store.destroy().unwrap();

    // Walk entry-0 back-links from the live header down to offset 0
    let mut file = File::open(&path).unwrap();
    let mut offset = read_u64_at(&mut file, 40);
    let snapshot_len = 5 * ENTRY_SIZE;
    let mut hops = Vec::new();
    while offset != 0 {
        hops.push(offset);
        assert_eq!(read_u64_at(&mut file, offset + 8), snapshot_len);
        offset = read_u64_at(&mut file, offset);
    }

    // create + two explicit commits
    assert_eq!(hops, vec![c2, c1, first]);
}

#[test]
fn test_commits_never_touch_identity_fields() {
    let (_temp, path, store) = setup_store(4);
    let before = read_prefix(&path, 16);

    let chunk = store.chunkify(2, b"payload".to_vec()).unwrap();
    chunk.commit().unwrap();
    drop(chunk);
    store.commit_all().unwrap();
    store.resize(8).unwrap();
    store.close().unwrap();

    // Magic, version, reserved, and endianness bytes are untouched
    assert_eq!(read_prefix(&path, 16), before);
}

#[test]
fn test_garbage_tail_ignored_on_reopen() {
    let (_temp, path, store) = setup_store(4);

    let chunk = store.chunkify(1, b"survives".to_vec()).unwrap();
    chunk.commit().unwrap();
    drop(chunk);
    store.close().unwrap();

    // A torn append leaves unreferenced bytes at the tail
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0xAB; 100]).unwrap();
    drop(file);

    let store = Store::open(&path, Config::default()).unwrap();
    let chunk = store.load_chunk(1).unwrap();
    assert_eq!(&chunk.bytes()[..], b"survives");
}
