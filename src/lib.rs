//! Reads Microsoft Compiled HTML Help (CHM/ITSS) archives and exposes
//! their contents as a flat namespace of named, randomly readable
//! entries.
//!
//! An archive is a container (ITSF/ITSP/PMGL/PMGI, see [`header`] and
//! [`directory`]) around two sections: an uncompressed section holding
//! raw bytes, and an LZX-compressed section ([`lzx`]) whose contents are
//! served through a reset-aware block cache ([`cache`]) so that
//! arbitrary-offset reads remain cheap without re-decompressing an
//! entire entry.
//!
//! ```no_run
//! use chmarc::Archive;
//!
//! let mut archive = Archive::open_default("manual.chm")?;
//! if let Some(entry) = archive.resolve("/index.html")? {
//!     let mut buf = vec![0u8; entry.length as usize];
//!     archive.retrieve(&entry, 0, &mut buf)?;
//! }
//! # Ok::<(), chmarc::Error>(())
//! ```

pub mod archive;
pub mod cache;
pub mod decode;
pub mod directory;
pub mod entry;
pub mod error;
pub mod header;
pub mod lzx;
pub mod section;
pub mod source;

pub use archive::{Archive, ArchiveOptions};
pub use directory::{EnumerateSignal, ENUMERATE_ALL};
pub use entry::{Entry, EntryFlags};
pub use error::{Error, Result};
pub use source::{ByteSource, FileSource, SliceSource};
