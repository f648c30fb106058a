//! C6: the section router — dispatches a read to a raw positional read on
//! the uncompressed section or to the block cache for the compressed
//! section. Grounded on `chm_lib.c`'s `chm_retrieve_entry`.

use crate::cache::BlockCache;
use crate::entry::Entry;
use crate::error::Result;
use crate::header::ResetTable;
use crate::source::ByteSource;

pub const SECTION_UNCOMPRESSED: u64 = 0;
pub const SECTION_COMPRESSED: u64 = 1;

/// Reads up to `len` bytes of `entry`'s content starting at `addr`
/// (relative to the entry), clamped to the entry's length.
///
/// `compression_enabled` mirrors the archive-wide flag set when any of
/// the three compression meta-units failed to validate at open time: a
/// compressed entry then always yields zero bytes without attempting a
/// decode.
#[allow(clippy::too_many_arguments)]
pub fn retrieve(
    source: &dyn ByteSource,
    entry: &Entry,
    dst: &mut [u8],
    addr: u64,
    data_offset: u64,
    compression_enabled: bool,
    content_start: u64,
    reset_table: Option<&ResetTable>,
    cache: &mut BlockCache,
) -> Result<usize> {
    if addr >= entry.length {
        return Ok(0);
    }
    let len = dst.len().min((entry.length - addr) as usize);
    if len == 0 {
        return Ok(0);
    }

    match entry.section {
        SECTION_UNCOMPRESSED => {
            let n = source.read_at(&mut dst[..len], data_offset + entry.start + addr)?;
            Ok(n)
        }
        SECTION_COMPRESSED => {
            if !compression_enabled {
                return Ok(0);
            }
            let reset_table = match reset_table {
                Some(t) => t,
                None => return Ok(0),
            };
            let mut total = 0usize;
            while total < len {
                let n = cache.serve(
                    source,
                    reset_table,
                    content_start,
                    entry.start + addr + total as u64,
                    len - total,
                    &mut dst[total..len],
                )?;
                if n == 0 {
                    break;
                }
                total += n;
            }
            Ok(total)
        }
        _ => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::lzx::WindowSize;
    use crate::source::SliceSource;

    #[test]
    fn uncompressed_read_is_clamped_to_entry_length() {
        let data = (0u8..=255).collect::<Vec<u8>>();
        let source = SliceSource::new(data);
        let entry = Entry::new("/foo".to_string(), SECTION_UNCOMPRESSED, 10, 5);
        let mut cache = BlockCache::new(5, WindowSize::from_bytes(1 << 15).unwrap(), 8);
        let mut buf = [0u8; 10];
        let n = retrieve(&source, &entry, &mut buf, 0, 0, true, 0, None, &mut cache).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], &[10, 11, 12, 13, 14]);
    }

    #[test]
    fn addr_at_length_returns_zero() {
        let data = vec![0u8; 16];
        let source = SliceSource::new(data);
        let entry = Entry::new("/foo".to_string(), SECTION_UNCOMPRESSED, 0, 5);
        let mut cache = BlockCache::new(5, WindowSize::from_bytes(1 << 15).unwrap(), 8);
        let mut buf = [0u8; 4];
        let n = retrieve(&source, &entry, &mut buf, 5, 0, true, 0, None, &mut cache).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn compressed_read_without_valid_tables_returns_zero() {
        let source = SliceSource::new(vec![0u8; 16]);
        let entry = Entry::new("/foo".to_string(), SECTION_COMPRESSED, 0, 10);
        let mut cache = BlockCache::new(5, WindowSize::from_bytes(1 << 15).unwrap(), 8);
        let mut buf = [0u8; 10];
        let n = retrieve(&source, &entry, &mut buf, 0, 0, false, 0, None, &mut cache).unwrap();
        assert_eq!(n, 0);
    }
}
