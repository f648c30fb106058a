//! C1: positional byte reads from the underlying storage.
//!
//! The original `chmlib` hardcodes a file descriptor and a `pread`/`lseek`
//! dance gated by `CHM_USE_PREAD`/`CHM_USE_IO64` (see `read_bytes` in
//! `chm_lib.c`). This crate generalizes that into a trait so the same
//! directory/decompression code works over a real file or an in-memory
//! buffer (used heavily by the test suite).

use std::fs::File;
use std::io;

/// A read-only, positional byte source.
///
/// Implementations must not maintain (or be affected by) any external
/// cursor: `read_at` always reads starting at `offset`, independent of any
/// previous call. A short read (returning fewer bytes than `buf.len()`) is
/// a valid outcome and signals end-of-data or a transient I/O shortfall;
/// it is not itself an error.
pub trait ByteSource {
    /// Reads into `buf`, starting at `offset`, returning the number of
    /// bytes actually read (which may be less than `buf.len()`).
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

/// The standard file-descriptor-backed implementation.
pub struct FileSource {
    file: File,
}

impl FileSource {
    pub fn open(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        Ok(Self {
            file: File::open(path)?,
        })
    }

    pub fn from_file(file: File) -> Self {
        Self { file }
    }
}

#[cfg(unix)]
impl ByteSource for FileSource {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        // Positional reads via pread(2) never move the file's shared cursor,
        // so concurrent reads from other threads holding their own
        // `FileSource` over the same fd stay safe.
        match self.file.read_at(buf, offset) {
            Ok(n) => Ok(n),
            // read_at() returns an error instead of a short read only for
            // genuine I/O failures; a read past EOF yields Ok(0).
            Err(e) => Err(e),
        }
    }
}

#[cfg(windows)]
impl ByteSource for FileSource {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        match self.file.seek_read(buf, offset) {
            Ok(n) => Ok(n),
            Err(e) => Err(e),
        }
    }
}

/// An in-memory byte source, used by tests and for archives already
/// resident in memory.
pub struct SliceSource {
    data: Vec<u8>,
}

impl SliceSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ByteSource for SliceSource {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Ok(0);
        }
        let available = &self.data[offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}
