//! C4: the PMGI/PMGL directory index. Grounded on `chm_lib.c`'s
//! `chm_resolve_object`, `_chm_find_in_PMGL`, `_chm_find_in_PMGI`,
//! `chm_enumerate` and `chm_parse`.

use std::cmp::Ordering;

use crate::decode::Cursor;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::header::{ItsfHeader, ItspHeader, PmgiHeader, PmglHeader, PMGI_HEADER_LEN, PMGL_HEADER_LEN};
use crate::source::ByteSource;

pub const MAX_PATHLEN: usize = 512;

pub const CATEGORY_MASK: u32 = 0x07;
pub const TYPE_MASK: u32 = 0x18;
pub const ENUMERATE_ALL: u32 = 0x1F;

/// Result a caller's enumeration callback hands back after each entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerateSignal {
    Continue,
    Success,
    Failure,
}

pub struct Directory {
    dir_base: u64,
    block_len: u32,
    index_root: i32,
    index_head: i32,
}

impl Directory {
    pub fn new(itsf: &ItsfHeader, itsp: &ItspHeader) -> Self {
        Self {
            dir_base: itsf.dir_offset + itsp.header_len as u64,
            block_len: itsp.block_len,
            index_root: itsp.index_root,
            index_head: itsp.index_head,
        }
    }

    fn read_page(&self, source: &dyn ByteSource, page: i32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.block_len as usize];
        let offset = self.dir_base + page as u64 * self.block_len as u64;
        let n = source.read_at(&mut buf, offset)?;
        if n != buf.len() {
            return Err(Error::ShortRead {
                context: "directory page",
                expected: buf.len() as u64,
                actual: n as u64,
            });
        }
        Ok(buf)
    }

    /// Exact-name lookup, starting at `index_root` and descending through
    /// any PMGI internal pages to the PMGL leaf that would hold `path`.
    pub fn resolve(&self, source: &dyn ByteSource, path: &str) -> Result<Option<Entry>> {
        let needle = path.as_bytes();
        let mut cur_page = self.index_root;

        while cur_page != -1 {
            let buf = self.read_page(source, cur_page)?;
            match &buf[0..4] {
                b"PMGL" => {
                    let header = PmglHeader::parse(&buf, self.block_len)?;
                    let end = (self.block_len - header.free_space) as usize;
                    let mut cursor = Cursor::new(&buf[PMGL_HEADER_LEN as usize..end]);
                    while cursor.remaining() > 0 {
                        let name_len = cursor.read_cword() as usize;
                        if name_len > MAX_PATHLEN {
                            return Err(Error::DirectoryCorrupt("PMGL name too long"));
                        }
                        let name = cursor.read_bytes(name_len);
                        let section = cursor.read_cword();
                        let start = cursor.read_cword();
                        let length = cursor.read_cword();
                        if cursor.failed() {
                            return Err(Error::DirectoryCorrupt("truncated PMGL entry"));
                        }
                        if ascii_casecmp(&name, needle) == Ordering::Equal {
                            let path = String::from_utf8_lossy(&name).into_owned();
                            return Ok(Some(Entry::new(path, section, start, length)));
                        }
                    }
                    return Ok(None);
                }
                b"PMGI" => {
                    let header = PmgiHeader::parse(&buf, self.block_len)?;
                    let end = (self.block_len - header.free_space) as usize;
                    let mut cursor = Cursor::new(&buf[PMGI_HEADER_LEN as usize..end]);
                    let mut next_page = -1i32;
                    loop {
                        if cursor.remaining() == 0 {
                            break;
                        }
                        let name_len = cursor.read_cword() as usize;
                        if name_len > MAX_PATHLEN {
                            return Err(Error::DirectoryCorrupt("PMGI name too long"));
                        }
                        let name = cursor.read_bytes(name_len);
                        if cursor.failed() {
                            return Err(Error::DirectoryCorrupt("truncated PMGI entry"));
                        }
                        if ascii_casecmp(&name, needle) == Ordering::Greater {
                            break;
                        }
                        let child = cursor.read_cword() as i32;
                        if cursor.failed() {
                            return Err(Error::DirectoryCorrupt("truncated PMGI entry"));
                        }
                        next_page = child;
                    }
                    cur_page = next_page;
                }
                _ => return Err(Error::DirectoryCorrupt("unknown directory page signature")),
            }
        }

        Ok(None)
    }

    fn scan_pmgl_page<F: FnMut(Entry) -> Result<EnumerateSignal>>(
        &self,
        buf: &[u8],
        mut visit: F,
    ) -> Result<EnumerateSignal> {
        let header = PmglHeader::parse(buf, self.block_len)?;
        let end = (self.block_len - header.free_space) as usize;
        let mut cursor = Cursor::new(&buf[PMGL_HEADER_LEN as usize..end]);
        while cursor.remaining() > 0 {
            let name_len = cursor.read_cword() as usize;
            if name_len > MAX_PATHLEN {
                return Err(Error::DirectoryCorrupt("PMGL name too long"));
            }
            let name = cursor.read_bytes(name_len);
            let section = cursor.read_cword();
            let start = cursor.read_cword();
            let length = cursor.read_cword();
            if cursor.failed() {
                return Err(Error::DirectoryCorrupt("truncated PMGL entry"));
            }
            let path = String::from_utf8_lossy(&name).into_owned();
            let entry = Entry::new(path, section, start, length);
            match visit(entry)? {
                EnumerateSignal::Continue => {}
                other => return Ok(other),
            }
        }
        Ok(EnumerateSignal::Continue)
    }

    /// Walks the PMGL linked list from `index_head`, in archive (insertion)
    /// order, invoking `callback` for every entry whose flags intersect
    /// `mask`'s category and type bits.
    pub fn enumerate<F>(&self, source: &dyn ByteSource, mask: u32, mut callback: F) -> Result<bool>
    where
        F: FnMut(&Entry) -> EnumerateSignal,
    {
        let mut cur_page = self.index_head;
        while cur_page != -1 {
            let buf = self.read_page(source, cur_page)?;
            if &buf[0..4] != b"PMGL" {
                return Err(Error::DirectoryCorrupt("expected PMGL in index_head chain"));
            }
            let header = PmglHeader::parse(&buf, self.block_len)?;
            let signal = self.scan_pmgl_page(&buf, |entry| {
                if !included(entry.flags.bits(), mask) {
                    return Ok(EnumerateSignal::Continue);
                }
                Ok(callback(&entry))
            })?;
            match signal {
                EnumerateSignal::Continue => {}
                EnumerateSignal::Success => return Ok(true),
                EnumerateSignal::Failure => return Ok(false),
            }
            cur_page = header.block_next;
        }
        Ok(true)
    }

    /// Parses every entry up front, for the "parse-all" lookup surface
    /// the handle caches so repeat callers see the same list identity.
    pub fn parse_all(&self, source: &dyn ByteSource) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        let mut cur_page = self.index_head;
        while cur_page != -1 {
            let buf = self.read_page(source, cur_page)?;
            if &buf[0..4] != b"PMGL" {
                return Err(Error::DirectoryCorrupt("expected PMGL in index_head chain"));
            }
            let header = PmglHeader::parse(&buf, self.block_len)?;
            self.scan_pmgl_page(&buf, |entry| {
                entries.push(entry);
                Ok(EnumerateSignal::Continue)
            })?;
            cur_page = header.block_next;
        }
        Ok(entries)
    }
}

fn included(flags: u32, mask: u32) -> bool {
    let category_bits = mask & CATEGORY_MASK;
    let type_bits = mask & TYPE_MASK;
    if flags & category_bits == 0 {
        return false;
    }
    if type_bits != 0 && flags & type_bits == 0 {
        return false;
    }
    true
}

/// Byte-wise ASCII-case-insensitive comparison; CHM paths were produced by
/// tools that never performed Unicode case folding.
fn ascii_casecmp(a: &[u8], b: &[u8]) -> Ordering {
    a.iter()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.iter().map(|c| c.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_casecmp_ignores_case() {
        assert_eq!(ascii_casecmp(b"Hello", b"hello"), Ordering::Equal);
        assert_eq!(ascii_casecmp(b"abc", b"abd"), Ordering::Less);
    }

    #[test]
    fn enumerate_all_mask_intersects_everything() {
        assert!(included(0x09, ENUMERATE_ALL));
        assert!(included(0x12, ENUMERATE_ALL));
    }

    #[test]
    fn zero_category_bits_matches_nothing() {
        assert!(!included(0x09, TYPE_MASK));
    }

    #[test]
    fn type_mask_filters_by_file_or_dir() {
        assert!(included(0x09, CATEGORY_MASK | 0x08));
        assert!(!included(0x11, CATEGORY_MASK | 0x08));
    }
}
