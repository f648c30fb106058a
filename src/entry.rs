//! C5: directory entries and the flags derived from their paths.
//!
//! Grounded on `chm_lib.c`'s `struct chmUnitInfo` and `flags_from_path`.

bitflags::bitflags! {
    /// Classification flags derived purely from an entry's path, the same
    /// way `chmlib` tags special and meta entries for its enumeration API.
    pub struct EntryFlags: u32 {
        const NORMAL  = 0x01;
        const META    = 0x02;
        const SPECIAL = 0x04;
        const FILES   = 0x08;
        const DIRS    = 0x10;
    }
}

/// One resolved entry from the ITSS directory.
#[derive(Debug, Clone)]
pub struct Entry {
    pub path: String,
    pub section: u64,
    pub start: u64,
    pub length: u64,
    pub flags: EntryFlags,
}

/// Derives classification flags the same way `flags_from_path` does: the
/// category (NORMAL, SPECIAL, or META) and the kind (FILES or DIRS) are
/// each decided by a strict if/else, so the two axes never mix bits from
/// the other branch.
pub fn flags_from_path(path: &str) -> EntryFlags {
    let category = if path.starts_with("/#") || path.starts_with("/$") {
        EntryFlags::SPECIAL
    } else if path.starts_with('/') {
        EntryFlags::NORMAL
    } else {
        EntryFlags::META
    };
    let kind = if path.ends_with('/') {
        EntryFlags::DIRS
    } else {
        EntryFlags::FILES
    };
    category | kind
}

impl Entry {
    pub fn new(path: String, section: u64, start: u64, length: u64) -> Self {
        let flags = flags_from_path(&path);
        Self {
            path,
            section,
            start,
            length,
            flags,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.section == 1
    }
}
