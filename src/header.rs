//! C3: header parsing and validation for the ITSS container chain.
//!
//! Grounded on `chm_lib.c`'s `unmarshal_itsf_header`, `unmarshal_itsp_header`,
//! `_unmarshal_pmgl_header`, `_unmarshal_pmgi_header`,
//! `_unmarshal_lzxc_reset_table` and `_unmarshal_lzxc_control_data`.

use crate::decode::Cursor;
use crate::error::{Error, Result};

pub const ITSF_V2_LEN: u64 = 0x58;
pub const ITSF_V3_LEN: u64 = 0x60;
pub const ITSP_V1_LEN: usize = 0x54;
pub const PMGL_HEADER_LEN: u32 = 0x14;
pub const PMGI_HEADER_LEN: u32 = 0x08;
pub const LZXC_RESETTABLE_V1_LEN: usize = 0x28;
pub const LZXC_CONTROLDATA_MIN_LEN: usize = 0x18;

/// The outer ITSF header, present at offset 0 of every CHM file.
#[derive(Debug, Clone)]
pub struct ItsfHeader {
    pub version: i32,
    pub header_len: i32,
    pub last_modified: u32,
    pub lang_id: u32,
    pub dir_uuid: uuid::Uuid,
    pub stream_uuid: uuid::Uuid,
    pub dir_offset: u64,
    pub dir_len: u64,
    pub data_offset: u64,
}

impl ItsfHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut c = Cursor::new(buf);
        let signature = c.read_tag();
        let version = c.read_i32();
        let header_len = c.read_i32();
        c.skip(4); // unknown_000c
        let last_modified = c.read_u32();
        let lang_id = c.read_u32();
        let dir_uuid = c.read_uuid();
        let stream_uuid = c.read_uuid();
        c.skip(8); // unknown_offset
        c.skip(8); // unknown_len
        let dir_offset = c.read_u64();
        let dir_len = c.read_u64();

        if &signature != b"ITSF" {
            return Err(Error::InvalidSignature {
                context: "ITSF header",
                expected: "ITSF",
            });
        }
        if version != 2 && version != 3 {
            return Err(Error::UnsupportedVersion {
                context: "ITSF header",
                version,
            });
        }
        let min_len = if version == 3 { ITSF_V3_LEN } else { ITSF_V2_LEN };
        if (header_len as i64) < 0 || (header_len as u64) < min_len {
            return Err(Error::OutOfRange {
                context: "ITSF header_len",
            });
        }
        // Sanity check: huge values are usually due to broken files.
        if dir_offset > u32::MAX as u64 || dir_len > u32::MAX as u64 {
            return Err(Error::OutOfRange {
                context: "ITSF dir_offset/dir_len",
            });
        }

        let data_offset = if version == 3 {
            let v = c.read_u64();
            if c.failed() {
                return Err(Error::ShortRead {
                    context: "ITSF header",
                    expected: ITSF_V3_LEN,
                    actual: buf.len() as u64,
                });
            }
            v
        } else {
            dir_offset + dir_len
        };

        if c.failed() {
            return Err(Error::ShortRead {
                context: "ITSF header",
                expected: min_len,
                actual: buf.len() as u64,
            });
        }

        Ok(Self {
            version,
            header_len,
            last_modified,
            lang_id,
            dir_uuid,
            stream_uuid,
            dir_offset,
            dir_len,
            data_offset,
        })
    }
}

/// The ITSP header, present at `itsf.dir_offset`.
#[derive(Debug, Clone)]
pub struct ItspHeader {
    pub version: i32,
    pub header_len: i32,
    pub block_len: u32,
    pub index_depth: i32,
    pub index_root: i32,
    pub index_head: i32,
    pub num_blocks: u32,
    pub lang_id: u32,
    pub system_uuid: uuid::Uuid,
}

impl ItspHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut c = Cursor::new(buf);
        let signature = c.read_tag();
        let version = c.read_i32();
        let header_len = c.read_i32();
        c.skip(4); // unknown_000c
        let block_len = c.read_u32();
        c.skip(4); // blockidx_intvl
        let index_depth = c.read_i32();
        let mut index_root = c.read_i32();
        let index_head = c.read_i32();
        c.skip(4); // unknown_0024
        let num_blocks = c.read_u32();
        c.skip(4); // unknown_002c
        let lang_id = c.read_u32();
        let system_uuid = c.read_uuid();
        c.skip(16); // unknown_0044

        if c.failed() {
            return Err(Error::ShortRead {
                context: "ITSP header",
                expected: ITSP_V1_LEN as u64,
                actual: buf.len() as u64,
            });
        }
        if &signature != b"ITSP" {
            return Err(Error::InvalidSignature {
                context: "ITSP header",
                expected: "ITSP",
            });
        }
        if version != 1 {
            return Err(Error::UnsupportedVersion {
                context: "ITSP header",
                version,
            });
        }
        if header_len != ITSP_V1_LEN as i32 {
            return Err(Error::OutOfRange {
                context: "ITSP header_len",
            });
        }
        if block_len < PMGL_HEADER_LEN.max(PMGI_HEADER_LEN) {
            return Err(Error::OutOfRange {
                context: "ITSP block_len",
            });
        }

        // A single-PMGL-page archive has no PMGI tree; normalize so the
        // directory walk always has a valid starting page.
        if index_root <= -1 {
            index_root = index_head;
        }

        Ok(Self {
            version,
            header_len,
            block_len,
            index_depth,
            index_root,
            index_head,
            num_blocks,
            lang_id,
            system_uuid,
        })
    }
}

/// Header of a PMGL (leaf) directory page.
#[derive(Debug, Clone, Copy)]
pub struct PmglHeader {
    pub free_space: u32,
    pub block_prev: i32,
    pub block_next: i32,
}

impl PmglHeader {
    pub fn parse(buf: &[u8], block_len: u32) -> Result<Self> {
        if (block_len as u64) < PMGL_HEADER_LEN as u64 {
            return Err(Error::OutOfRange {
                context: "PMGL block_len",
            });
        }
        let mut c = Cursor::new(buf);
        let signature = c.read_tag();
        let free_space = c.read_u32();
        c.skip(4); // unknown_0008
        let block_prev = c.read_i32();
        let block_next = c.read_i32();

        if c.failed() {
            return Err(Error::ShortRead {
                context: "PMGL header",
                expected: PMGL_HEADER_LEN as u64,
                actual: buf.len() as u64,
            });
        }
        if &signature != b"PMGL" {
            return Err(Error::InvalidSignature {
                context: "PMGL header",
                expected: "PMGL",
            });
        }
        if free_space > block_len - PMGL_HEADER_LEN {
            return Err(Error::OutOfRange {
                context: "PMGL free_space",
            });
        }

        Ok(Self {
            free_space,
            block_prev,
            block_next,
        })
    }
}

/// Header of a PMGI (internal) directory page.
#[derive(Debug, Clone, Copy)]
pub struct PmgiHeader {
    pub free_space: u32,
}

impl PmgiHeader {
    pub fn parse(buf: &[u8], block_len: u32) -> Result<Self> {
        if (block_len as u64) < PMGI_HEADER_LEN as u64 {
            return Err(Error::OutOfRange {
                context: "PMGI block_len",
            });
        }
        let mut c = Cursor::new(buf);
        let signature = c.read_tag();
        let free_space = c.read_u32();

        if c.failed() {
            return Err(Error::ShortRead {
                context: "PMGI header",
                expected: PMGI_HEADER_LEN as u64,
                actual: buf.len() as u64,
            });
        }
        if &signature != b"PMGI" {
            return Err(Error::InvalidSignature {
                context: "PMGI header",
                expected: "PMGI",
            });
        }
        if free_space > block_len - PMGI_HEADER_LEN {
            return Err(Error::OutOfRange {
                context: "PMGI free_space",
            });
        }

        Ok(Self { free_space })
    }
}

/// The LZX reset table: where each compressed block begins.
#[derive(Debug, Clone)]
pub struct ResetTable {
    pub block_count: u32,
    pub table_offset: u32,
    pub uncompressed_len: u64,
    pub compressed_len: u64,
    pub block_len: u64,
    pub block_offsets: Vec<u64>,
}

impl ResetTable {
    /// Parses the fixed 40-byte header. The caller is responsible for
    /// fetching `block_offsets` separately (they live at `table_offset`
    /// within the same meta-unit, a variable-length array of
    /// `block_count` 64-bit offsets).
    pub fn parse_header(buf: &[u8]) -> Result<Self> {
        let mut c = Cursor::new(buf);
        let version = c.read_u32();
        let block_count = c.read_u32();
        c.skip(4); // unknown
        let table_offset = c.read_u32();
        let uncompressed_len = c.read_u64();
        let compressed_len = c.read_u64();
        let block_len = c.read_u64();

        if c.failed() {
            return Err(Error::ShortRead {
                context: "LZXC reset table",
                expected: LZXC_RESETTABLE_V1_LEN as u64,
                actual: buf.len() as u64,
            });
        }
        if version != 2 {
            return Err(Error::UnsupportedVersion {
                context: "LZXC reset table",
                version: version as i32,
            });
        }
        if uncompressed_len > u32::MAX as u64 || compressed_len > u32::MAX as u64 {
            return Err(Error::OutOfRange {
                context: "LZXC reset table totals",
            });
        }
        if block_len == 0 || block_len > u32::MAX as u64 {
            return Err(Error::OutOfRange {
                context: "LZXC reset table block_len",
            });
        }

        Ok(Self {
            block_count,
            table_offset,
            uncompressed_len,
            compressed_len,
            block_len,
            block_offsets: Vec::new(),
        })
    }

    /// Parses the `block_count` 64-bit little-endian offsets following the
    /// header, given the raw bytes at `table_offset`.
    pub fn parse_offsets(mut self, buf: &[u8]) -> Result<Self> {
        let mut c = Cursor::new(buf);
        self.block_offsets.reserve(self.block_count as usize);
        for _ in 0..self.block_count {
            self.block_offsets.push(c.read_u64());
        }
        if c.failed() {
            return Err(Error::ShortRead {
                context: "LZXC reset table offsets",
                expected: self.block_count as u64 * 8,
                actual: buf.len() as u64,
            });
        }
        Ok(self)
    }

    /// The `[start, end)` compressed-byte range of block `i`, relative to
    /// the start of the content section.
    pub fn block_range(&self, i: u64) -> Option<(u64, u64)> {
        let start = *self.block_offsets.get(i as usize)?;
        let end = if i as usize + 1 < self.block_offsets.len() {
            self.block_offsets[i as usize + 1]
        } else {
            self.compressed_len
        };
        Some((start, end))
    }
}

/// The LZXC control data block: window size and reset interval.
#[derive(Debug, Clone, Copy)]
pub struct LzxcControlData {
    pub version: u32,
    pub reset_interval: u32,
    pub window_size: u32,
    pub windows_per_reset: u32,
}

impl LzxcControlData {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < LZXC_CONTROLDATA_MIN_LEN {
            return Err(Error::ShortRead {
                context: "LZXC control data",
                expected: LZXC_CONTROLDATA_MIN_LEN as u64,
                actual: buf.len() as u64,
            });
        }
        let mut c = Cursor::new(buf);
        c.skip(4); // size
        let signature = c.read_tag();
        let version = c.read_u32();
        let mut reset_interval = c.read_u32();
        let mut window_size = c.read_u32();
        let windows_per_reset = c.read_u32();

        if c.failed() {
            return Err(Error::ShortRead {
                context: "LZXC control data",
                expected: LZXC_CONTROLDATA_MIN_LEN as u64,
                actual: buf.len() as u64,
            });
        }
        if &signature != b"LZXC" {
            return Err(Error::InvalidSignature {
                context: "LZXC control data",
                expected: "LZXC",
            });
        }

        if version == 2 {
            reset_interval = reset_interval.wrapping_mul(0x8000);
            window_size = window_size.wrapping_mul(0x8000);
        }
        if window_size == 0 || window_size == 1 {
            return Err(Error::OutOfRange {
                context: "LZXC control data window_size",
            });
        }
        if reset_interval == 0 {
            return Err(Error::OutOfRange {
                context: "LZXC control data reset_interval",
            });
        }
        if reset_interval % (window_size / 2) != 0 {
            return Err(Error::OutOfRange {
                context: "LZXC control data reset_interval",
            });
        }

        Ok(Self {
            version,
            reset_interval,
            window_size,
            windows_per_reset,
        })
    }
}
