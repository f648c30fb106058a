//! C9: the public archive handle.
//!
//! Grounded on `chm_lib.c`'s `chm_open`/`chm_close`/`chm_resolve_object`/
//! `chm_enumerate`/`chm_retrieve_object`.

use tracing::{debug, warn};

use crate::cache::{BlockCache, DEFAULT_CACHE_BLOCKS, MAX_CACHE_BLOCKS};
use crate::directory::{Directory, EnumerateSignal, ENUMERATE_ALL};
use crate::entry::Entry;
use crate::header::{ItsfHeader, ItspHeader, LzxcControlData, ResetTable, ITSF_V2_LEN};
use crate::section;
use crate::source::{ByteSource, FileSource};

use crate::error::{Error, Result};

const RESET_TABLE_PATH: &str =
    "::DataSpace/Storage/MSCompressed/Transform/{7FC28940-9D31-11D0-9B27-00A0C91E9C7C}/InstanceData/ResetTable";
const CONTROL_DATA_PATH: &str = "::DataSpace/Storage/MSCompressed/ControlData";
const CONTENT_PATH: &str = "::DataSpace/Storage/MSCompressed/Content";

/// Tunables a caller may set before opening an archive.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveOptions {
    pub cache_capacity: usize,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_BLOCKS,
        }
    }
}

/// A handle on one opened CHM archive, bound to a single underlying byte
/// source for its whole lifetime.
pub struct Archive {
    source: Box<dyn ByteSource + Send>,
    itsf: ItsfHeader,
    directory: Directory,
    compression_enabled: bool,
    content_start: u64,
    reset_table: Option<ResetTable>,
    cache: BlockCache,
    cache_capacity: usize,
    entries: Option<Vec<Entry>>,
}

impl Archive {
    /// Opens an archive from a file path.
    pub fn open(path: impl AsRef<std::path::Path>, options: &ArchiveOptions) -> Result<Self> {
        let source = FileSource::open(path).map_err(Error::Io)?;
        Self::open_source(Box::new(source), options)
    }

    /// Opens an archive with default options.
    pub fn open_default(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::open(path, &ArchiveOptions::default())
    }

    /// Opens an archive over any [`ByteSource`], e.g. an in-memory buffer.
    pub fn open_source(source: Box<dyn ByteSource + Send>, options: &ArchiveOptions) -> Result<Self> {
        let mut head = vec![0u8; ITSF_V2_LEN as usize];
        let n = source.read_at(&mut head, 0)?;
        if n != head.len() {
            let err = Error::ShortRead {
                context: "ITSF header",
                expected: ITSF_V2_LEN,
                actual: n as u64,
            };
            warn!(error = %err, "archive too small to hold an ITSF header");
            return Err(err);
        }
        let itsf = match ItsfHeader::parse(&head) {
            Ok(h) if h.version == 3 => {
                // v3 carries 8 extra trailing bytes (`data_offset`); reread
                // with the full header in view.
                let mut full = vec![0u8; crate::header::ITSF_V3_LEN as usize];
                let n = source.read_at(&mut full, 0)?;
                if n != full.len() {
                    let err = Error::ShortRead {
                        context: "ITSF header",
                        expected: crate::header::ITSF_V3_LEN,
                        actual: n as u64,
                    };
                    warn!(error = %err, "archive too small to hold a v3 ITSF header");
                    return Err(err);
                }
                ItsfHeader::parse(&full)?
            }
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "failed to parse ITSF header");
                return Err(e);
            }
        };

        let mut itsp_buf = vec![0u8; crate::header::ITSP_V1_LEN];
        let n = source.read_at(&mut itsp_buf, itsf.dir_offset)?;
        if n != itsp_buf.len() {
            let err = Error::ShortRead {
                context: "ITSP header",
                expected: crate::header::ITSP_V1_LEN as u64,
                actual: n as u64,
            };
            warn!(error = %err, "archive too small to hold an ITSP header");
            return Err(err);
        }
        let itsp = match ItspHeader::parse(&itsp_buf) {
            Ok(itsp) => itsp,
            Err(e) => {
                warn!(error = %e, "failed to parse ITSP header");
                return Err(e);
            }
        };

        let directory = Directory::new(&itsf, &itsp);
        let cache_capacity = options.cache_capacity.clamp(1, MAX_CACHE_BLOCKS);

        let mut archive = Self {
            source,
            itsf,
            directory,
            compression_enabled: true,
            content_start: 0,
            reset_table: None,
            cache: BlockCache::new(cache_capacity, crate::lzx::WindowSize::from_bytes(1 << 15).unwrap(), 1),
            cache_capacity,
            entries: None,
        };

        archive.prefetch_compression_meta_units();

        Ok(archive)
    }

    /// Resolves and validates the three compression meta-units, mirroring
    /// `chm_open`'s `if (... ) h->compression_enabled = 0;` chain: any
    /// failure here disables compressed reads for the rest of the handle's
    /// lifetime, without making `open` itself fail.
    fn prefetch_compression_meta_units(&mut self) {
        let outcome = (|| -> Result<()> {
            let content = self
                .directory
                .resolve(self.source.as_ref(), CONTENT_PATH)?
                .ok_or(Error::DirectoryCorrupt("missing Content meta-unit"))?;
            self.content_start = self.itsf.data_offset + content.start;

            let control = self
                .directory
                .resolve(self.source.as_ref(), CONTROL_DATA_PATH)?
                .ok_or(Error::DirectoryCorrupt("missing ControlData meta-unit"))?;
            let mut control_buf = vec![0u8; crate::header::LZXC_CONTROLDATA_MIN_LEN];
            let n = self
                .source
                .read_at(&mut control_buf, self.itsf.data_offset + control.start)?;
            control_buf.truncate(n);
            let control_data = LzxcControlData::parse(&control_buf)?;

            let reset = self
                .directory
                .resolve(self.source.as_ref(), RESET_TABLE_PATH)?
                .ok_or(Error::DirectoryCorrupt("missing ResetTable meta-unit"))?;
            let mut reset_header = vec![0u8; crate::header::LZXC_RESETTABLE_V1_LEN];
            let n = self
                .source
                .read_at(&mut reset_header, self.itsf.data_offset + reset.start)?;
            if n != reset_header.len() {
                return Err(Error::ShortRead {
                    context: "LZXC reset table",
                    expected: reset_header.len() as u64,
                    actual: n as u64,
                });
            }
            let table = ResetTable::parse_header(&reset_header)?;
            let mut offsets_buf = vec![0u8; table.block_count as usize * 8];
            let n = self.source.read_at(
                &mut offsets_buf,
                self.itsf.data_offset + reset.start + table.table_offset as u64,
            )?;
            offsets_buf.truncate(n);
            let table = table.parse_offsets(&offsets_buf)?;

            let window_size = crate::lzx::WindowSize::from_bytes(control_data.window_size)
                .map_err(Error::Decode)?;
            let reset_blkcount = (control_data.reset_interval as u64
                / (control_data.window_size as u64 / 2))
                * control_data.windows_per_reset as u64;

            self.cache = BlockCache::new(self.cache_capacity, window_size, reset_blkcount);
            self.reset_table = Some(table);
            Ok(())
        })();

        if let Err(e) = outcome {
            debug!(error = %e, "compression meta-units unavailable, disabling compressed reads");
            self.compression_enabled = false;
        }
    }

    /// Exact-name lookup into the directory.
    pub fn resolve(&self, path: &str) -> Result<Option<Entry>> {
        self.directory.resolve(self.source.as_ref(), path)
    }

    /// Walks the directory in archive order, invoking `callback` for every
    /// entry whose flags intersect `mask`.
    pub fn enumerate<F>(&self, mask: u32, callback: F) -> Result<bool>
    where
        F: FnMut(&Entry) -> EnumerateSignal,
    {
        self.directory.enumerate(self.source.as_ref(), mask, callback)
    }

    /// Walks the directory with no filtering at all.
    pub fn enumerate_all<F>(&self, callback: F) -> Result<bool>
    where
        F: FnMut(&Entry) -> EnumerateSignal,
    {
        self.enumerate(ENUMERATE_ALL, callback)
    }

    /// Parses (and caches) the full entry list as an alternative to
    /// walking it via `enumerate`: repeated calls reuse the same parse.
    pub fn entries(&mut self) -> Result<&[Entry]> {
        if self.entries.is_none() {
            let parsed = self.directory.parse_all(self.source.as_ref())?;
            self.entries = Some(parsed);
        }
        Ok(self.entries.as_deref().unwrap())
    }

    /// Reads up to `dst.len()` bytes of `entry`'s content starting at
    /// `addr`, returning the number of bytes actually written.
    pub fn retrieve(&mut self, entry: &Entry, addr: u64, dst: &mut [u8]) -> Result<usize> {
        let n = section::retrieve(
            self.source.as_ref(),
            entry,
            dst,
            addr,
            self.itsf.data_offset,
            self.compression_enabled,
            self.content_start,
            self.reset_table.as_ref(),
            &mut self.cache,
        )?;
        Ok(n)
    }

    /// Resizes the block cache; takes effect immediately, discarding any
    /// entries that collide under the new modulus.
    pub fn set_cache_size(&mut self, capacity: usize) {
        self.cache_capacity = capacity.clamp(1, MAX_CACHE_BLOCKS);
        self.cache.set_capacity(self.cache_capacity);
    }

    pub fn compression_enabled(&self) -> bool {
        self.compression_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SliceSource;

    #[test]
    fn truncated_archive_fails_to_open() {
        let data = vec![0u8; 0x10];
        let result = Archive::open_source(Box::new(SliceSource::new(data)), &ArchiveOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn non_itsf_signature_fails_to_open() {
        let data = vec![0u8; 0x58];
        let result = Archive::open_source(Box::new(SliceSource::new(data)), &ArchiveOptions::default());
        assert!(matches!(result, Err(Error::InvalidSignature { .. })));
    }
}
