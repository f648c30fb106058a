//! C7: the LZX decode engine.
//!
//! A stateful adaptive coder over a sliding window. One [`Lzxd`] instance
//! lives as long as the archive's compressed section decoder state (see
//! the archive-level cache in `crate::cache`), exposing `reset` for a
//! fresh reset interval and `decompress_block` to turn one reset-table
//! block's compressed bytes into exactly `block_len` bytes of output.
//!
//! The bit-level and tree mechanics here are grounded in the LZXD
//! bitstream layout: 16-bit little-endian words, a pretree-delta-coded
//! main/length/aligned-offset Huffman alphabet, position-slot encoded
//! match offsets with a 3-entry repeated-offset cache, and an optional
//! E8 call-translation pass over x86 code.

mod bitstream;
mod block;
mod tree;
mod window;

pub use window::WindowSize;

use std::convert::TryFrom;

use bitstream::Bitstream;
use block::BlockType;
use tree::Tree;
use window::Window;

/// if position_slot < 4 { 0 } else if position_slot >= 36 { 17 } else { (position_slot - 2) / 2 }
const FOOTER_BITS: [u8; 290] = {
    let mut t = [0u8; 290];
    let mut i = 0;
    while i < 290 {
        t[i] = if i < 4 {
            0
        } else if i >= 36 {
            17
        } else {
            ((i - 2) / 2) as u8
        };
        i += 1;
    }
    t
};

/// if position_slot == 0 { 0 } else { BASE_POSITION[slot-1] + (1 << FOOTER_BITS[slot-1]) }
fn base_position(slot: usize) -> u32 {
    if slot == 0 {
        return 0;
    }
    let mut pos: u32 = 0;
    for s in 0..slot {
        pos += 1u32 << FOOTER_BITS[s];
    }
    pos
}

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum DecodeFailed {
    #[error("compressed block ended before the expected output was produced")]
    UnexpectedEof,
    #[error("Huffman tree description was malformed")]
    BadTree,
    #[error("unsupported LZX window size: {0}")]
    BadWindowSize(u32),
    #[error("unknown LZX block type {0}")]
    BadBlockType(u8),
    #[error("match offset {0} is out of range for the current window")]
    BadMatchOffset(usize),
    #[error("requested a view longer than the window")]
    ChunkTooLong,
    #[error("requested view wraps the circular window")]
    ChunkWraps,
}

enum CurrentBlock {
    Verbatim,
    AlignedOffset { aligned_offset_tree: Tree },
    Uncompressed,
}

/// A single LZX decoder instance, holding everything that must survive
/// across reset-table block boundaries within one reset interval: the
/// sliding window, the main/length Huffman trees (re-sent as deltas every
/// block), and the three most-recent match offsets.
pub struct Lzxd {
    window_size: WindowSize,
    window: Window,
    main_tree: Tree,
    length_tree: Tree,
    r: [u32; 3],
    stream_started: bool,
    e8_translation_size: Option<u32>,
    current_block: Option<CurrentBlock>,
    block_remaining: u32,
    total_decoded: u64,
}

impl Lzxd {
    /// C7 `init`: allocates decoder state sized for the negotiated window.
    pub fn new(window_size: WindowSize) -> Self {
        let main_tree = Tree::new(256 + 8 * window_size.position_slots());
        let length_tree = Tree::new(249);
        Self {
            window_size,
            window: window_size.create_buffer(),
            main_tree,
            length_tree,
            r: [1, 1, 1],
            stream_started: false,
            e8_translation_size: None,
            current_block: None,
            block_remaining: 0,
            total_decoded: 0,
        }
    }

    /// C7 `reset`: reinitialises the Huffman trees and repeated-offset
    /// cache for a fresh reset interval. The sliding window content is
    /// left untouched since matches are allowed to reference data from
    /// before the reset point.
    pub fn reset(&mut self) {
        self.main_tree = Tree::new(256 + 8 * self.window_size.position_slots());
        self.length_tree = Tree::new(249);
        self.r = [1, 1, 1];
        self.current_block = None;
        self.block_remaining = 0;
    }

    fn read_main_and_length_trees(&mut self, bitstream: &mut Bitstream) -> Result<(), DecodeFailed> {
        self.main_tree.update_range_with_pretree(bitstream, 0..256)?;
        let total = 256 + 8 * self.window_size.position_slots();
        self.main_tree
            .update_range_with_pretree(bitstream, 256..total)?;
        self.length_tree
            .update_range_with_pretree(bitstream, 0..249)
    }

    fn read_block_head(&mut self, bitstream: &mut Bitstream) -> Result<(), DecodeFailed> {
        let ty = BlockType::try_from(bitstream.read_bits(3)? as u8)?;
        let size = bitstream.read_u24_be()?;
        self.block_remaining = size;

        self.current_block = Some(match ty {
            BlockType::Verbatim => {
                self.read_main_and_length_trees(bitstream)?;
                CurrentBlock::Verbatim
            }
            BlockType::AlignedOffset => {
                let mut path_lengths = vec![0u8; 8];
                for x in path_lengths.iter_mut() {
                    *x = bitstream.read_bits(3)? as u8;
                }
                let aligned_offset_tree = Tree::from_path_lengths(path_lengths)?;
                self.read_main_and_length_trees(bitstream)?;
                CurrentBlock::AlignedOffset { aligned_offset_tree }
            }
            BlockType::Uncompressed => {
                bitstream.align();
                self.r = [
                    bitstream.read_u32_le()?,
                    bitstream.read_u32_le()?,
                    bitstream.read_u32_le()?,
                ];
                CurrentBlock::Uncompressed
            }
        });
        Ok(())
    }

    fn decode_token(
        &mut self,
        bitstream: &mut Bitstream,
    ) -> Result<(), DecodeFailed> {
        // Destructure into disjoint field borrows so the aligned-offset
        // tree (borrowed from `current_block`) can be read from while
        // `r` and `window` are mutated below, without aliasing.
        let Lzxd {
            main_tree,
            length_tree,
            current_block,
            r,
            window,
            block_remaining,
            ..
        } = self;

        let main_element = main_tree.decode_element(bitstream)?;
        if main_element < 256 {
            window.push(main_element as u8);
            *block_remaining -= 1;
            return Ok(());
        }

        let length_header = (main_element - 256) & 7;
        let match_length = if length_header == 7 {
            length_tree.decode_element(bitstream)? as u32 + 9
        } else {
            length_header as u32 + 2
        };

        let position_slot = ((main_element - 256) >> 3) as usize;
        let match_offset;
        if position_slot == 0 {
            match_offset = r[0];
        } else if position_slot == 1 {
            match_offset = r[1];
            r.swap(0, 1);
        } else if position_slot == 2 {
            match_offset = r[2];
            r.swap(0, 2);
        } else {
            let offset_bits = FOOTER_BITS[position_slot];
            let aligned_offset_tree = match current_block.as_ref().unwrap() {
                CurrentBlock::AlignedOffset { aligned_offset_tree } => Some(aligned_offset_tree),
                _ => None,
            };
            let formatted_offset = if let Some(tree) = aligned_offset_tree {
                let (verbatim_bits, aligned_bits) = if offset_bits >= 3 {
                    let v = bitstream.read_bits(offset_bits - 3)? << 3;
                    let a = tree.decode_element(bitstream)?;
                    (v, a)
                } else {
                    (bitstream.read_bits(offset_bits)?, 0)
                };
                base_position(position_slot) + verbatim_bits as u32 + aligned_bits as u32
            } else {
                let verbatim_bits = bitstream.read_bits(offset_bits)?;
                base_position(position_slot) + verbatim_bits as u32
            };

            match_offset = formatted_offset - 2;
            r[2] = r[1];
            r[1] = r[0];
            r[0] = match_offset;
        }

        window.copy_from_self(match_offset as usize, match_length as usize)?;
        *block_remaining -= match_length;
        Ok(())
    }

    /// C7 `decompress`: decodes exactly `dst_len` output bytes from the
    /// compressed bytes in `cmpsrc`, as one reset-table block. The
    /// Huffman trees and repeated-offset cache persist in `self` across
    /// calls; a new [`Bitstream`] is created over `cmpsrc` each call,
    /// which is correct because every prior call ends on a 16-bit
    /// boundary (`dst_len` is always a full 32 KiB chunk except for the
    /// final block of an entry).
    pub fn decompress_block(
        &mut self,
        cmpsrc: &[u8],
        dst_len: usize,
    ) -> Result<Vec<u8>, DecodeFailed> {
        let mut bitstream = Bitstream::new(cmpsrc);

        if !self.stream_started {
            self.stream_started = true;
            let e8_enabled = bitstream.read_bit()? != 0;
            self.e8_translation_size = if e8_enabled {
                let high = bitstream.read_u16_le()? as u32;
                let low = bitstream.read_u16_le()? as u32;
                Some((high << 16) | low)
            } else {
                None
            };
        }

        let mut produced = 0usize;
        while produced < dst_len {
            if self.block_remaining == 0 || self.current_block.is_none() {
                self.read_block_head(&mut bitstream)?;
            }
            match self.current_block.as_ref().unwrap() {
                CurrentBlock::Uncompressed => {
                    let n = (dst_len - produced).min(self.block_remaining as usize);
                    self.window.copy_from_bitstream(&mut bitstream, n)?;
                    self.block_remaining -= n as u32;
                    produced += n;
                }
                CurrentBlock::Verbatim | CurrentBlock::AlignedOffset { .. } => {
                    while produced < dst_len && self.block_remaining > 0 {
                        let before = self.block_remaining;
                        self.decode_token(&mut bitstream)?;
                        produced += (before - self.block_remaining) as usize;
                    }
                }
            }
        }

        bitstream.align();

        let mut out = Vec::with_capacity(dst_len);
        self.window.past_view_into(dst_len, &mut out)?;

        if let Some(translation_size) = self.e8_translation_size {
            window::e8_decode(&mut out, self.total_decoded as u32, translation_size);
        }
        self.total_decoded += dst_len as u64;

        Ok(out)
    }
}
