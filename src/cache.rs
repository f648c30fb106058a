//! C8: the block cache and rewind engine.
//!
//! LZX's decoder state only resets at fixed intervals, so serving an
//! arbitrary-offset read may require replaying every block since the last
//! reset point. This module owns the fixed-capacity, direct-mapped cache
//! (deliberately not an LRU — see `chm_lib.c`'s `cache_blocks` /
//! `cache_block_indices` parallel arrays) plus the rewind logic grounded
//! on `uncompress_block` / `_chm_decompress_block` / `_chm_decompress_region`.

use crate::error::{Error, Result};
use crate::header::ResetTable;
use crate::lzx::{Lzxd, WindowSize};
use crate::source::ByteSource;

pub const MAX_CACHE_BLOCKS: usize = 128;
pub const DEFAULT_CACHE_BLOCKS: usize = 5;

pub struct BlockCache {
    capacity: usize,
    slots: Vec<Option<(u64, Vec<u8>)>>,
    /// The block whose decoded bytes the decoder most recently produced,
    /// kept independent of cache-slot eviction so a collision never
    /// strands the decoder's own notion of where it is.
    last_block: Option<u64>,
    last_block_data: Option<Vec<u8>>,
    decoder: Option<Lzxd>,
    window_size: WindowSize,
    reset_blkcount: u64,
}

impl BlockCache {
    pub fn new(capacity: usize, window_size: WindowSize, reset_blkcount: u64) -> Self {
        let capacity = capacity.clamp(1, MAX_CACHE_BLOCKS);
        Self {
            capacity,
            slots: (0..capacity).map(|_| None).collect(),
            last_block: None,
            last_block_data: None,
            decoder: None,
            window_size,
            reset_blkcount: reset_blkcount.max(1),
        }
    }

    /// Resizes the cache, re-hashing surviving entries under the new
    /// modulus. On a collision during redistribution the newcomer is
    /// discarded, matching `chm_file`'s resize behavior rather than
    /// promoting to an LRU policy.
    pub fn set_capacity(&mut self, new_capacity: usize) {
        let new_capacity = new_capacity.clamp(1, MAX_CACHE_BLOCKS);
        let mut new_slots: Vec<Option<(u64, Vec<u8>)>> = (0..new_capacity).map(|_| None).collect();
        for slot in self.slots.drain(..).flatten() {
            let (index, bytes) = slot;
            let new_idx = (index as usize) % new_capacity;
            if new_slots[new_idx].is_none() {
                new_slots[new_idx] = Some((index, bytes));
            }
            // Collision: newcomer discarded, matching the original's
            // redistribution loop.
        }
        self.slots = new_slots;
        self.capacity = new_capacity;
    }

    fn slot_for(&self, block: u64) -> usize {
        (block as usize) % self.capacity
    }

    fn store(&mut self, block: u64, bytes: Vec<u8>) {
        let slot = self.slot_for(block);
        self.slots[slot] = Some((block, bytes.clone()));
        self.last_block = Some(block);
        self.last_block_data = Some(bytes);
    }

    /// Looks the block up in the direct-mapped cache, falling back to the
    /// dedicated last-decoded slot the cache array may have evicted.
    fn resident(&self, block: u64) -> Option<&[u8]> {
        let slot = self.slot_for(block);
        if let Some((idx, bytes)) = &self.slots[slot] {
            if *idx == block {
                return Some(bytes);
            }
        }
        if self.last_block == Some(block) {
            return self.last_block_data.as_deref();
        }
        None
    }

    fn decompress_one(
        &mut self,
        source: &dyn ByteSource,
        reset_table: &ResetTable,
        content_offset: u64,
        block: u64,
    ) -> Result<()> {
        if self.decoder.is_none() {
            self.decoder = Some(Lzxd::new(self.window_size));
        }
        if block % self.reset_blkcount == 0 {
            self.decoder.as_mut().unwrap().reset();
        }

        let (start, end) = reset_table
            .block_range(block)
            .ok_or(Error::DirectoryCorrupt("LZX block index out of range"))?;
        let len_i = (end - start) as usize;
        let mut cmpsrc = vec![0u8; len_i];
        let n = source.read_at(&mut cmpsrc, content_offset + start)?;
        if n != len_i {
            return Err(Error::ShortRead {
                context: "LZX compressed block",
                expected: len_i as u64,
                actual: n as u64,
            });
        }

        let dst_len = if block + 1 == reset_table.block_count as u64 {
            let produced_before = reset_table.block_len * block;
            (reset_table.uncompressed_len - produced_before) as usize
        } else {
            reset_table.block_len as usize
        };

        let out = self
            .decoder
            .as_mut()
            .unwrap()
            .decompress_block(&cmpsrc, dst_len)?;
        self.store(block, out);
        Ok(())
    }

    /// Ensures block `b`'s decoded bytes are resident, replaying every
    /// block from the last usable reset/stream point forward.
    fn ensure_resident(
        &mut self,
        source: &dyn ByteSource,
        reset_table: &ResetTable,
        content_offset: u64,
        block: u64,
    ) -> Result<()> {
        if self.resident(block).is_some() {
            return Ok(());
        }

        let align = block % self.reset_blkcount;
        let replay = match self.last_block {
            Some(last) if last >= block.saturating_sub(align) && last <= block => {
                align.saturating_sub(block - last)
            }
            _ => align,
        };

        for i in (1..=replay).rev() {
            self.decompress_one(source, reset_table, content_offset, block - i)?;
        }
        self.decompress_one(source, reset_table, content_offset, block)
    }

    /// Serves a read over the compressed section: `addr`/`len` are byte
    /// offsets/lengths within the decompressed content stream (i.e.
    /// already relative to the compressed section, not the file).
    pub fn serve(
        &mut self,
        source: &dyn ByteSource,
        reset_table: &ResetTable,
        content_offset: u64,
        addr: u64,
        len: usize,
        dst: &mut [u8],
    ) -> Result<usize> {
        if len == 0 {
            return Ok(0);
        }
        let block_len = reset_table.block_len;
        let block = addr / block_len;
        let offset_in_block = (addr % block_len) as usize;
        let n = len.min(block_len as usize - offset_in_block);

        if self.ensure_resident(source, reset_table, content_offset, block).is_err() {
            return Ok(0);
        }
        let bytes = match self.resident(block) {
            Some(b) => b,
            None => return Ok(0),
        };
        let avail = bytes.len().saturating_sub(offset_in_block);
        let to_copy = n.min(avail);
        dst[..to_copy].copy_from_slice(&bytes[offset_in_block..offset_in_block + to_copy]);
        Ok(to_copy)
    }
}
