//! The LZX sliding window: history buffer, copy primitives, and the E8
//! call-translation post-pass applied to the first window_size bytes of
//! decompressed x86 code.

use super::bitstream::Bitstream;
use super::DecodeFailed;

/// Window size in bytes. Not stored in the compressed stream; this crate
/// reads it from the LZXC control data block instead of requiring callers
/// to hardcode a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize(u32);

impl WindowSize {
    pub fn from_bytes(bytes: u32) -> Result<Self, DecodeFailed> {
        if !bytes.is_power_of_two() || bytes < (1 << 15) || bytes > (1 << 25) {
            return Err(DecodeFailed::BadWindowSize(bytes));
        }
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> u32 {
        self.0
    }

    /// Number of position slots, per the LZXD position-slot table: codes
    /// above the trivial window sizes all top out at 290 (32 MB).
    pub(crate) fn position_slots(&self) -> usize {
        match self.0 {
            0x0000_8000 => 30,
            0x0001_0000 => 32,
            0x0002_0000 => 34,
            0x0004_0000 => 36,
            0x0008_0000 => 38,
            0x0010_0000 => 42,
            0x0020_0000 => 50,
            0x0040_0000 => 66,
            0x0080_0000 => 98,
            0x0100_0000 => 162,
            _ => 290,
        }
    }

    pub(crate) fn create_buffer(&self) -> Window {
        Window {
            pos: 0,
            buffer: vec![0u8; self.0 as usize].into_boxed_slice(),
        }
    }
}

/// A circular history buffer holding the last `window_size` bytes of
/// decompressed output.
pub struct Window {
    pos: usize,
    buffer: Box<[u8]>,
}

impl Window {
    fn advance(&mut self, delta: usize) {
        self.pos += delta;
        if self.pos >= self.buffer.len() {
            self.pos -= self.buffer.len();
        }
    }

    pub fn push(&mut self, value: u8) {
        self.buffer[self.pos] = value;
        self.advance(1);
    }

    /// Copies `length` bytes from `offset` bytes back in the window to the
    /// current position, byte by byte so overlapping (run-length-style)
    /// matches replicate correctly.
    pub fn copy_from_self(&mut self, offset: usize, length: usize) -> Result<(), DecodeFailed> {
        if offset == 0 || offset > self.buffer.len() {
            return Err(DecodeFailed::BadMatchOffset(offset));
        }
        for i in 0..length {
            let li = (self.pos + i) % self.buffer.len();
            let ri = (self.buffer.len() + self.pos + i - offset) % self.buffer.len();
            self.buffer[li] = self.buffer[ri];
        }
        self.advance(length);
        Ok(())
    }

    pub fn copy_from_bitstream(
        &mut self,
        bitstream: &mut Bitstream,
        length: usize,
    ) -> Result<(), DecodeFailed> {
        if self.pos + length <= self.buffer.len() {
            bitstream.read_raw(&mut self.buffer[self.pos..self.pos + length])?;
            self.advance(length);
        } else {
            // Wraps past the end of the circular buffer; split the raw
            // read across the seam.
            let first = self.buffer.len() - self.pos;
            let mut tmp = vec![0u8; length];
            bitstream.read_raw(&mut tmp)?;
            self.buffer[self.pos..].copy_from_slice(&tmp[..first]);
            self.buffer[..length - first].copy_from_slice(&tmp[first..]);
            self.advance(length);
        }
        Ok(())
    }

    /// A contiguous view of the last `len` bytes written, used to hand a
    /// freshly decoded block back to the caller.
    pub fn past_view(&self, len: usize) -> Result<&[u8], DecodeFailed> {
        if len > self.buffer.len() {
            return Err(DecodeFailed::ChunkTooLong);
        }
        if len <= self.pos {
            Ok(&self.buffer[self.pos - len..self.pos])
        } else {
            // The requested view wraps; callers that need a wrapped view
            // use `past_view_into` instead.
            Err(DecodeFailed::ChunkWraps)
        }
    }

    /// Like [`Window::past_view`], but copies into `out` so it works even
    /// when the requested range wraps around the end of the buffer.
    pub fn past_view_into(&self, len: usize, out: &mut Vec<u8>) -> Result<(), DecodeFailed> {
        if len > self.buffer.len() {
            return Err(DecodeFailed::ChunkTooLong);
        }
        out.clear();
        out.reserve(len);
        if len <= self.pos {
            out.extend_from_slice(&self.buffer[self.pos - len..self.pos]);
        } else {
            let wrap = len - self.pos;
            out.extend_from_slice(&self.buffer[self.buffer.len() - wrap..]);
            out.extend_from_slice(&self.buffer[..self.pos]);
        }
        Ok(())
    }
}

/// Undoes E8 call-translation: CALL instruction targets in x86 code were
/// rewritten during compression from relative to absolute offsets to
/// improve compression of executable content. Operates in place on a
/// buffer representing the first `translation_size` bytes of the stream.
pub fn e8_decode(data: &mut [u8], stream_pos: u32, translation_size: u32) {
    if data.len() <= 10 {
        return;
    }
    let end = data.len() - 10;
    let mut i = 0usize;
    while i < end {
        if data[i] == 0xe8 {
            let abs = i32::from_le_bytes([data[i + 1], data[i + 2], data[i + 3], data[i + 4]]);
            if abs >= -(stream_pos as i32 + i as i32) && (abs as i64) < translation_size as i64 {
                let rel = if abs >= 0 {
                    abs - (stream_pos as i32 + i as i32 + 5)
                } else {
                    abs + translation_size as i32
                };
                data[i + 1..i + 5].copy_from_slice(&rel.to_le_bytes());
            }
            i += 5;
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_past_view() {
        let ws = WindowSize::from_bytes(1 << 15).unwrap();
        let mut window = ws.create_buffer();
        window.push(1);
        window.push(2);
        window.push(3);
        assert_eq!(window.past_view(3).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn copy_from_self_repeats_pattern() {
        let ws = WindowSize::from_bytes(1 << 15).unwrap();
        let mut window = ws.create_buffer();
        window.push(1);
        window.push(2);
        window.push(3);
        window.copy_from_self(3, 2).unwrap();
        assert_eq!(window.past_view(5).unwrap(), &[1, 2, 3, 1, 2]);
    }

    #[test]
    fn rejects_zero_offset_match() {
        let ws = WindowSize::from_bytes(1 << 15).unwrap();
        let mut window = ws.create_buffer();
        window.push(1);
        assert!(matches!(
            window.copy_from_self(0, 1),
            Err(DecodeFailed::BadMatchOffset(0))
        ));
    }

    #[test]
    fn rejects_non_power_of_two_window() {
        assert!(WindowSize::from_bytes(3000).is_err());
    }
}
