//! The error type shared by every fallible operation in this crate.
//!
//! Per the archive's error model, only conditions that leave the archive
//! itself unusable become an `Err`. A missing path (`resolve`) is reported
//! as `Ok(None)`, and a compressed read against an archive whose
//! compression failed to validate at open time is reported as `Ok(0)`.

use crate::lzx::DecodeFailed;

/// Everything that can go wrong while parsing or reading a CHM archive.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying byte source returned an I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A positional read returned fewer bytes than were required to parse a
    /// fixed-size structure.
    #[error("short read in {context}: expected {expected} bytes, got {actual}")]
    ShortRead {
        context: &'static str,
        expected: u64,
        actual: u64,
    },

    /// A 4-byte signature did not match what was expected.
    #[error("{context}: invalid signature (expected {expected:?})")]
    InvalidSignature {
        context: &'static str,
        expected: &'static str,
    },

    /// A version field held a value this crate does not support.
    #[error("{context}: unsupported version {version}")]
    UnsupportedVersion { context: &'static str, version: i32 },

    /// A field failed a sanity bound (too large, negative where only
    /// non-negative is legal, or otherwise out of the range the format
    /// allows).
    #[error("{context}: field out of range")]
    OutOfRange { context: &'static str },

    /// The directory (PMGL/PMGI pages) is internally inconsistent.
    #[error("directory corrupt: {0}")]
    DirectoryCorrupt(&'static str),

    /// The LZX decoder rejected a compressed block.
    #[error("LZX decode failed: {0}")]
    Decode(#[from] DecodeFailed),
}

pub type Result<T> = std::result::Result<T, Error>;
