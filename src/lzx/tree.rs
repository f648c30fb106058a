//! Canonical Huffman trees, as used for LZXD's main, length, aligned-offset
//! and pretree alphabets.
//!
//! Trees are re-sent every block as a delta against the previous block's
//! path lengths (mod 17), decoded via a small fixed pretree alphabet. This
//! mirrors the wire format described for LZXD's "pretree" mechanism.

use super::bitstream::Bitstream;
use super::DecodeFailed;
use std::ops::Range;

const MAX_PATH_LEN: u32 = 16;

/// A Huffman tree with a flat decode table, rebuilt every time its path
/// lengths change.
pub struct Tree {
    path_lengths: Vec<u8>,
    /// decode_table[bits] = (symbol, length), indexed by the next
    /// `max_len` bits of the stream, for codes up to `max_len` long.
    decode_table: Vec<(u16, u8)>,
    max_len: u8,
}

impl Tree {
    pub fn new(count: usize) -> Self {
        Self {
            path_lengths: vec![0; count],
            decode_table: Vec::new(),
            max_len: 0,
        }
    }

    pub fn from_path_lengths(path_lengths: Vec<u8>) -> Result<Self, DecodeFailed> {
        let mut tree = Self {
            path_lengths,
            decode_table: Vec::new(),
            max_len: 0,
        };
        tree.rebuild()?;
        Ok(tree)
    }

    /// Builds a canonical Huffman assignment from `path_lengths` (DEFLATE
    /// style: shortest codes first, ties broken by symbol index) and
    /// flattens it into a direct-lookup table keyed by the next `max_len`
    /// bits of the stream.
    fn rebuild(&mut self) -> Result<(), DecodeFailed> {
        let max_len = self
            .path_lengths
            .iter()
            .copied()
            .max()
            .unwrap_or(0)
            .min(MAX_PATH_LEN as u8);
        self.max_len = max_len;
        if max_len == 0 {
            self.decode_table = Vec::new();
            return Ok(());
        }

        let mut count_per_len = vec![0u32; max_len as usize + 1];
        for &len in &self.path_lengths {
            if len > 0 {
                count_per_len[len as usize] += 1;
            }
        }

        let mut first_code = vec![0u32; max_len as usize + 2];
        let mut code = 0u32;
        for len in 1..=max_len as usize {
            code = (code + count_per_len[len - 1]) << 1;
            first_code[len] = code;
        }

        let table_size = 1usize << max_len;
        let mut table = vec![(0u16, 0u8); table_size];
        let mut next_code = first_code.clone();
        for (symbol, &len) in self.path_lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let len = len as usize;
            let code = next_code[len];
            next_code[len] += 1;
            if code >= (1u32 << len) {
                return Err(DecodeFailed::BadTree);
            }
            // Canonical codes are read most-significant-bit first; shift
            // into the high bits of the table index and fill every entry
            // whose low `max_len - len` bits vary freely.
            let shift = max_len as usize - len;
            let base = (code as usize) << shift;
            for fill in 0..(1usize << shift) {
                table[base + fill] = (symbol as u16, len as u8);
            }
        }

        self.decode_table = table;
        Ok(())
    }

    pub fn decode_element(&self, bitstream: &mut Bitstream) -> Result<u16, DecodeFailed> {
        if self.max_len == 0 {
            return Err(DecodeFailed::BadTree);
        }
        // `peek_bits` returns the next bits of the stream MSB-first, the
        // same order canonical codes are assigned in, so the peeked value
        // can index the flattened table directly.
        let peeked = bitstream.peek_bits(self.max_len)?;
        let (symbol, len) = self.decode_table[peeked as usize];
        if len == 0 {
            return Err(DecodeFailed::BadTree);
        }
        bitstream.read_bits(len)?;
        Ok(symbol)
    }

    /// Reads a pretree-coded delta for `range` and applies it to
    /// `self.path_lengths`, then rebuilds the decode table. Used for both
    /// the main/length trees (against their previous block's lengths) and,
    /// recursively, has its own pretree read inline.
    pub fn update_range_with_pretree(
        &mut self,
        bitstream: &mut Bitstream,
        range: Range<usize>,
    ) -> Result<(), DecodeFailed> {
        let mut pretree_lengths = vec![0u8; 20];
        for x in pretree_lengths.iter_mut() {
            *x = bitstream.read_bits(4)? as u8;
        }
        let pretree = Tree::from_path_lengths(pretree_lengths)?;

        let mut i = range.start;
        while i < range.end {
            let code = pretree.decode_element(bitstream)?;
            match code {
                0..=16 => {
                    let prev = self.path_lengths[i] as u32;
                    self.path_lengths[i] = ((17 + prev - code as u32) % 17) as u8;
                    i += 1;
                }
                17 => {
                    let zeros = bitstream.read_bits(4)? as usize;
                    let end = (i + zeros + 4).min(range.end);
                    self.path_lengths[i..end].iter_mut().for_each(|x| *x = 0);
                    i = end;
                }
                18 => {
                    let zeros = bitstream.read_bits(5)? as usize;
                    let end = (i + zeros + 20).min(range.end);
                    self.path_lengths[i..end].iter_mut().for_each(|x| *x = 0);
                    i = end;
                }
                19 => {
                    let same = bitstream.read_bits(1)? as usize;
                    let code = pretree.decode_element(bitstream)?;
                    let prev = self.path_lengths[i] as u32;
                    let value = ((17 + prev - code as u32) % 17) as u8;
                    let end = (i + same + 4).min(range.end);
                    self.path_lengths[i..end].iter_mut().for_each(|x| *x = value);
                    i = end;
                }
                _ => return Err(DecodeFailed::BadTree),
            }
        }
        self.rebuild()
    }

    pub fn path_lengths(&self) -> &[u8] {
        &self.path_lengths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_canonical(lengths: &[u8]) -> Vec<(u16, u32, u8)> {
        let max_len = *lengths.iter().max().unwrap();
        let mut count = vec![0u32; max_len as usize + 1];
        for &l in lengths {
            if l > 0 {
                count[l as usize] += 1;
            }
        }
        let mut first = vec![0u32; max_len as usize + 2];
        let mut code = 0u32;
        for len in 1..=max_len as usize {
            code = (code + count[len - 1]) << 1;
            first[len] = code;
        }
        let mut next = first;
        let mut out = Vec::new();
        for (sym, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let c = next[len as usize];
            next[len as usize] += 1;
            out.push((sym as u16, c, len));
        }
        out
    }

    fn push_code(bits: &mut Vec<u8>, code: u32, len: u8) {
        for i in (0..len).rev() {
            bits.push(((code >> i) & 1) as u8);
        }
    }

    fn bits_to_bytes(bits: &[u8]) -> Vec<u8> {
        let mut padded = bits.to_vec();
        while padded.len() % 16 != 0 {
            padded.push(0);
        }
        let mut out = Vec::new();
        for word in padded.chunks(16) {
            // Bitstream words are consumed MSB-first out of a little-endian
            // 16-bit unit; reconstruct the two bytes accordingly.
            let mut n: u16 = 0;
            for &b in word {
                n = (n << 1) | b as u16;
            }
            out.extend_from_slice(&n.to_le_bytes());
        }
        out
    }

    #[test]
    fn decodes_simple_canonical_tree() {
        let lengths = vec![2u8, 2, 2, 2];
        let assignment = encode_canonical(&lengths);
        let tree = Tree::from_path_lengths(lengths).unwrap();

        let mut bits = Vec::new();
        for &(_, code, len) in &assignment {
            push_code(&mut bits, code, len);
        }
        let bytes = bits_to_bytes(&bits);
        let mut bs = Bitstream::new(&bytes);
        for &(sym, _, _) in &assignment {
            assert_eq!(tree.decode_element(&mut bs).unwrap(), sym);
        }
    }

    #[test]
    fn single_symbol_tree_rejects_other_codes() {
        let lengths = vec![1u8, 0, 0, 0];
        let tree = Tree::from_path_lengths(lengths).unwrap();
        assert_eq!(tree.path_lengths()[0], 1);
    }
}
