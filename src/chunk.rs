//! Chunk handles
//!
//! A chunk binds one index slot to an in-memory payload buffer. Callers
//! mutate the buffer, then `commit` appends it at end-of-file and repoints
//! the slot's index entry at the new payload. Handles hold only their slot
//! number plus a weak reference to the store and resolve the index entry
//! through the store on each access, so an index resize never leaves a
//! handle pointing at stale memory.
//!
//! Dropping a handle (or calling [`Chunk::release`]) clears the store's
//! live-table entry for the slot. Once the owning store has been torn
//! down, every remaining operation on the handle reports `NoFile`.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};

use crate::error::{Result, StoreError};
use crate::store::StoreInner;

/// Shared payload state for one live chunk
pub(crate) struct ChunkInner {
    /// Payload bytes; the length always mirrors the slot's index entry
    pub(crate) buf: Vec<u8>,
    /// True when the chunk allocated the buffer itself. Caller-supplied
    /// buffers are handed back on release instead of dropped.
    pub(crate) owned: bool,
}

/// Handle to one live chunk slot
///
/// The payload sits behind an `RwLock` so concurrent readers share access
/// while writers get exclusivity, the same split the store uses elsewhere.
pub struct Chunk {
    slot: usize,
    inner: Arc<RwLock<ChunkInner>>,
    store: Weak<Mutex<StoreInner>>,
}

impl Chunk {
    pub(crate) fn new(
        slot: usize,
        buf: Vec<u8>,
        owned: bool,
        store: &Arc<Mutex<StoreInner>>,
    ) -> Self {
        Chunk {
            slot,
            inner: Arc::new(RwLock::new(ChunkInner { buf, owned })),
            store: Arc::downgrade(store),
        }
    }

    /// Weak reference to the payload state, for the store's live table.
    pub(crate) fn inner_weak(&self) -> Weak<RwLock<ChunkInner>> {
        Arc::downgrade(&self.inner)
    }

    /// Slot this chunk is bound to
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Current payload length in bytes
    pub fn len(&self) -> usize {
        self.inner.read().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read access to the payload buffer (shared read lock)
    pub fn bytes(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.inner.read(), |c| c.buf.as_slice())
    }

    /// Write access to the payload buffer (exclusive write lock)
    ///
    /// Marks the store dirty: the mutation is not on disk until the chunk
    /// and then the store are committed.
    pub fn bytes_mut(&self) -> MappedRwLockWriteGuard<'_, [u8]> {
        if let Some(store) = self.store.upgrade() {
            store.lock().dirty = true;
        }
        RwLockWriteGuard::map(self.inner.write(), |c| c.buf.as_mut_slice())
    }

    /// Swap in a caller-supplied buffer, returning the old one.
    ///
    /// The slot's index entry length becomes `new_buf.len()`, and
    /// ownership transfers explicitly: after `replace` the chunk is
    /// caller-owned, so [`Chunk::release`] hands the new buffer back
    /// rather than dropping it.
    pub fn replace(&self, new_buf: Vec<u8>) -> Result<Vec<u8>> {
        let store = self.store.upgrade().ok_or(StoreError::NoFile)?;
        let mut store = store.lock();
        let mut chunk = self.inner.write();

        store.index.slot_mut(self.slot)?.len = new_buf.len() as u64;
        store.dirty = true;
        chunk.owned = false;
        Ok(std::mem::replace(&mut chunk.buf, new_buf))
    }

    /// Append the payload at end-of-file and repoint the slot's entry.
    ///
    /// The entry length is already maintained by construction and
    /// `replace`; only the offset moves. Fails with `NoFile` once the
    /// owning store has been destroyed.
    pub fn commit(&self) -> Result<()> {
        let store = self.store.upgrade().ok_or(StoreError::NoFile)?;
        let mut store = store.lock();
        let chunk = self.inner.read();
        store.commit_chunk(self.slot, &chunk)
    }

    /// Release the handle.
    ///
    /// Returns the buffer when it was caller-supplied (`chunkify`,
    /// `open_chunk`, or after `replace`); chunk-owned buffers are
    /// dropped. Store book-keeping happens on drop either way.
    pub fn release(self) -> Option<Vec<u8>> {
        let mut chunk = self.inner.write();
        let buf = std::mem::take(&mut chunk.buf);
        let owned = chunk.owned;
        drop(chunk);
        if owned {
            None
        } else {
            Some(buf)
        }
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.lock().forget_chunk(self.slot);
        }
    }
}
