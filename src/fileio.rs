//! Positional file I/O helpers
//!
//! Thin wrappers over seek + read/write that surface short transfers as
//! typed errors, plus fallible buffer allocation. Appends obtain the
//! end-of-file position and issue the write as two separate acts; callers
//! serialize access to the file.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{Result, StoreError};

/// Read exactly `buf.len()` bytes starting at `offset`.
pub(crate) fn read_exact_at(file: &mut File, offset: u64, buf: &mut [u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => StoreError::ShortRead {
            offset,
            expected: buf.len(),
        },
        _ => StoreError::Io(e),
    })
}

/// Write all of `data` starting at `offset`.
pub(crate) fn write_all_at(file: &mut File, offset: u64, data: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data).map_err(|e| match e.kind() {
        io::ErrorKind::WriteZero => StoreError::ShortWrite {
            offset,
            expected: data.len(),
        },
        _ => StoreError::Io(e),
    })
}

/// Current end-of-file position (where the next append will land).
pub(crate) fn end_offset(file: &mut File) -> Result<u64> {
    Ok(file.seek(SeekFrom::End(0))?)
}

/// Append `data` at end-of-file and return the offset it was written at.
pub(crate) fn append(file: &mut File, data: &[u8]) -> Result<u64> {
    let offset = end_offset(file)?;
    write_all_at(file, offset, data)?;
    Ok(offset)
}

/// Allocate a zeroed buffer of `len` bytes, surfacing allocator failure.
pub(crate) fn alloc_buffer(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| StoreError::OutOfMemory(len))?;
    buf.resize(len, 0);
    Ok(buf)
}
