//! Store orchestration
//!
//! The store owns the backing file, the header, the index array, and a
//! table of weak references to live chunk handles. It coordinates the
//! commit protocol (payload appends, snapshot append, header
//! append-then-rewrite) and guards the destroy lifecycle so no chunk
//! handle outlives the store unnoticed.
//!
//! ## Responsibilities
//! - Create and open store files
//! - Produce chunk handles bound to slots
//! - Commit the index snapshot and header in order
//! - Track live handles for the destroy guard
//! - Grow the slot array on resize

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::chunk::{Chunk, ChunkInner};
use crate::config::{Config, SyncStrategy};
use crate::error::{Result, StoreError};
use crate::fileio;
use crate::header::Header;
use crate::index::IndexArray;

/// Mutable store state, shared weakly with live chunk handles
pub(crate) struct StoreInner {
    pub(crate) file: File,
    pub(crate) header: Header,
    pub(crate) index: IndexArray,
    /// One entry per slot; `Some` while a chunk handle is outstanding
    live: Vec<Option<Weak<RwLock<ChunkInner>>>>,
    /// Count of outstanding chunk handles
    refs: usize,
    /// True when in-memory state has diverged from the last store commit
    pub(crate) dirty: bool,
    sync: SyncStrategy,
}

impl StoreInner {
    /// Append one chunk's payload and repoint its index entry.
    ///
    /// The entry mutates only after the append succeeds; a failed append
    /// leaves the entry at its pre-commit offset.
    pub(crate) fn commit_chunk(&mut self, slot: usize, chunk: &ChunkInner) -> Result<()> {
        let position = fileio::append(&mut self.file, &chunk.buf)?;
        self.index.slot_mut(slot)?.offset = position;
        self.dirty = true;
        tracing::trace!("committed {} byte chunk at slot {}", chunk.buf.len(), slot);
        self.sync_after_write()
    }

    /// Drop the live-table record for `slot` (handle released or dropped).
    pub(crate) fn forget_chunk(&mut self, slot: usize) {
        if let Some(entry) = self.live.get_mut(slot) {
            if entry.take().is_some() {
                self.refs -= 1;
            }
        }
    }

    fn check_slot_free(&self, slot: usize) -> Result<()> {
        self.index.slot(slot)?;
        if self.live[slot].is_some() {
            return Err(StoreError::SlotOccupied(slot));
        }
        Ok(())
    }

    fn commit_inner(&mut self) -> Result<()> {
        self.index.commit(&mut self.header, &mut self.file)?;
        self.sync_after_write()?;
        self.header.commit(&mut self.file)?;
        self.dirty = false;
        tracing::trace!(
            "committed snapshot at offset {}",
            self.header.current_commit()
        );
        self.sync_after_commit()
    }

    fn commit_chunks_inner(&mut self) -> Result<()> {
        for slot in 0..self.live.len() {
            let handle = match &self.live[slot] {
                Some(weak) => weak.upgrade(),
                None => None,
            };
            if let Some(handle) = handle {
                let chunk = handle.read();
                self.commit_chunk(slot, &chunk)?;
            }
        }
        Ok(())
    }

    fn sync_after_write(&mut self) -> Result<()> {
        if self.sync == SyncStrategy::EveryWrite {
            self.file.sync_all()?;
        }
        Ok(())
    }

    fn sync_after_commit(&mut self) -> Result<()> {
        if self.sync != SyncStrategy::Never {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

/// Append-only, single-file chunk store with versioned commits
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Create a new store file with `slots` empty chunk slots.
    ///
    /// Writes the initial header, the first index snapshot, and the
    /// header again so the snapshot pointer is persisted.
    pub fn create<P: AsRef<Path>>(path: P, slots: usize, config: Config) -> Result<Store> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut header = Header::new();
        header.set_array_size(slots as u64);
        let mut index = IndexArray::new(slots)?;

        header.commit(&mut file)?;
        index.commit(&mut header, &mut file)?;
        header.commit(&mut file)?;

        let mut inner = StoreInner {
            file,
            header,
            index,
            live: vec![None; slots],
            refs: 0,
            dirty: false,
            sync: config.sync_strategy,
        };
        inner.sync_after_commit()?;

        tracing::debug!("created store {} with {} slots", path.display(), slots);
        Ok(Store {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    /// Open an existing store file.
    ///
    /// Validates the header, then loads the index snapshot it references.
    /// Chunk payloads are read on demand.
    pub fn open<P: AsRef<Path>>(path: P, config: Config) -> Result<Store> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let header = Header::load(&mut file)?;
        let index = IndexArray::load(&header, &mut file)?;
        let slots = index.slots();

        tracing::debug!("opened store {} with {} slots", path.display(), slots);
        Ok(Store {
            inner: Arc::new(Mutex::new(StoreInner {
                file,
                header,
                index,
                live: vec![None; slots],
                refs: 0,
                dirty: false,
                sync: config.sync_strategy,
            })),
        })
    }

    /// Tear down the store, refusing while chunk handles are live.
    ///
    /// On refusal the store is handed back untouched so the caller can
    /// release the offending handles and retry.
    pub fn destroy(self) -> std::result::Result<(), (Store, StoreError)> {
        let refs = self.inner.lock().refs;
        if refs > 0 {
            return Err((self, StoreError::OpenChunks(refs)));
        }
        tracing::debug!("destroyed store");
        Ok(())
    }

    /// Tear down the store regardless of live handles.
    ///
    /// Outstanding handles observe `NoFile` from their next operation.
    /// Intended for read-only sessions where chunks are freed
    /// independently.
    pub fn destroy_unsafe(self) {
        let refs = self.inner.lock().refs;
        if refs > 0 {
            tracing::debug!("destroyed store with {} live chunk handle(s)", refs);
        }
    }

    /// Commit, then destroy.
    pub fn close(self) -> std::result::Result<(), (Store, StoreError)> {
        if let Err(e) = self.commit() {
            return Err((self, e));
        }
        self.destroy()
    }

    // -------------------------------------------------------------------------
    // Chunk production
    // -------------------------------------------------------------------------

    /// Bind a fresh zeroed, chunk-owned buffer of `size` bytes to `slot`.
    ///
    /// The slot's entry length becomes `size`; the payload reaches disk
    /// on the chunk's next commit.
    pub fn new_chunk(&self, slot: usize, size: usize) -> Result<Chunk> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.check_slot_free(slot)?;

        let buf = fileio::alloc_buffer(size)?;
        inner.index.slot_mut(slot)?.len = size as u64;
        Ok(Self::register(inner, &self.inner, slot, buf, true))
    }

    /// Bind a caller-supplied buffer to `slot`.
    ///
    /// The slot's entry length becomes `buffer.len()`. Fails with
    /// `SlotOccupied` while another handle for the slot is live; slots
    /// with committed payloads but no outstanding handle are fair game.
    pub fn chunkify(&self, slot: usize, buffer: Vec<u8>) -> Result<Chunk> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.check_slot_free(slot)?;

        inner.index.slot_mut(slot)?.len = buffer.len() as u64;
        Ok(Self::register(inner, &self.inner, slot, buffer, false))
    }

    /// Load the committed payload for `slot` into a chunk-owned buffer.
    pub fn load_chunk(&self, slot: usize) -> Result<Chunk> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.check_slot_free(slot)?;

        let entry = *inner.index.slot(slot)?;
        let mut buf = fileio::alloc_buffer(entry.len as usize)?;
        if entry.len > 0 {
            fileio::read_exact_at(&mut inner.file, entry.offset, &mut buf)?;
        }
        Ok(Self::register(inner, &self.inner, slot, buf, true))
    }

    /// Load the committed payload for `slot` into a caller buffer.
    ///
    /// Fails with `BufferTooSmall` when the buffer cannot hold the
    /// payload; an oversized buffer is truncated to the payload length
    /// (capacity kept) so the handle's length mirrors the index entry.
    pub fn open_chunk(&self, slot: usize, mut buffer: Vec<u8>) -> Result<Chunk> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.check_slot_free(slot)?;

        let entry = *inner.index.slot(slot)?;
        let len = entry.len as usize;
        if buffer.len() < len {
            return Err(StoreError::BufferTooSmall {
                required: len,
                provided: buffer.len(),
            });
        }
        buffer.truncate(len);
        if len > 0 {
            fileio::read_exact_at(&mut inner.file, entry.offset, &mut buffer)?;
        }
        Ok(Self::register(inner, &self.inner, slot, buffer, false))
    }

    fn register(
        inner: &mut StoreInner,
        shared: &Arc<Mutex<StoreInner>>,
        slot: usize,
        buf: Vec<u8>,
        owned: bool,
    ) -> Chunk {
        let chunk = Chunk::new(slot, buf, owned, shared);
        inner.live[slot] = Some(chunk.inner_weak());
        inner.refs += 1;
        inner.dirty = true;
        chunk
    }

    // -------------------------------------------------------------------------
    // Commits
    // -------------------------------------------------------------------------

    /// Commit the index snapshot, then the header.
    pub fn commit(&self) -> Result<()> {
        self.inner.lock().commit_inner()
    }

    /// Commit every live chunk's payload.
    pub fn commit_chunks(&self) -> Result<()> {
        self.inner.lock().commit_chunks_inner()
    }

    /// Commit every live chunk, then the store.
    pub fn commit_all(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        guard.commit_chunks_inner()?;
        guard.commit_inner()
    }

    // -------------------------------------------------------------------------
    // Slot queries and maintenance
    // -------------------------------------------------------------------------

    /// Number of chunk slots
    pub fn slots(&self) -> usize {
        self.inner.lock().index.slots()
    }

    /// Committed payload length for `slot`
    pub fn chunk_size(&self, slot: usize) -> Result<u64> {
        Ok(self.inner.lock().index.slot(slot)?.len)
    }

    /// Zeroed buffer sized for an `open_chunk` call on `slot`
    pub fn allocate_chunk_buffer(&self, slot: usize) -> Result<Vec<u8>> {
        let len = self.chunk_size(slot)?;
        fileio::alloc_buffer(len as usize)
    }

    /// Grow the store to `new_slots` chunk slots.
    ///
    /// New slots read as never-committed (offset 0, length 0). Shrinking
    /// fails with `TooSmall`; the current size is a no-op. Live handles
    /// stay valid: they resolve their entry by slot on each access.
    pub fn resize(&self, new_slots: usize) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let old = inner.index.slots();
        inner.index.resize(&mut inner.header, new_slots)?;
        if new_slots > old {
            inner.live.resize_with(new_slots, || None);
            inner.dirty = true;
            tracing::debug!("resized store from {} to {} slots", old, new_slots);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Count of live chunk handles
    pub fn live_chunks(&self) -> usize {
        self.inner.lock().refs
    }

    /// True when in-memory state has diverged from the last commit
    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    /// Offset of the most recent committed index snapshot
    pub fn current_commit(&self) -> u64 {
        self.inner.lock().header.current_commit()
    }

    /// Offset of the earliest committed index snapshot
    pub fn first_commit(&self) -> u64 {
        self.inner.lock().header.first_commit()
    }

    /// Auxiliary pointer pair, carried across commits for out-of-band use
    pub fn aux(&self) -> (u64, u64) {
        let guard = self.inner.lock();
        (guard.header.aux_offset(), guard.header.aux_size())
    }

    pub fn set_aux(&self, offset: u64, size: u64) {
        let mut guard = self.inner.lock();
        guard.header.set_aux_offset(offset);
        guard.header.set_aux_size(size);
        guard.dirty = true;
    }
}
