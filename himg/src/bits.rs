//! Bit-granular reading and writing, least significant bit first.
//!
//! Bit `n` of the stream is bit `n % 8` of byte `n / 8`. Values wider than one bit are stored
//! with their least significant bit first and cross byte boundaries freely.

use snafu::{ensure, Snafu};

#[derive(Debug, Snafu)]
pub enum BitstreamError {
    #[snafu(display("bitstream ended early: needed {needed} bits, {available} left"))]
    UnexpectedEof { needed: usize, available: usize },
}

/// Read cursor over a byte buffer with an exact end.
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    /// Position in bits from the start of `data`.
    pos: usize,
}

impl<'a> BitCursor<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of bits consumed so far.
    #[inline]
    pub const fn bit_position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub const fn total_bits(&self) -> usize {
        self.data.len() * 8
    }

    #[inline]
    pub const fn remaining_bits(&self) -> usize {
        self.total_bits() - self.pos
    }

    #[inline]
    pub fn read_bit(&mut self) -> Result<u32, BitstreamError> {
        ensure!(
            self.pos < self.total_bits(),
            UnexpectedEofSnafu {
                needed: 1usize,
                available: 0usize,
            }
        );

        let bit = (self.data[self.pos >> 3] >> (self.pos & 7)) & 1;
        self.pos += 1;
        Ok(u32::from(bit))
    }

    /// Reads `bits` (0..=32) bits.
    pub fn read_bits(&mut self, bits: u32) -> Result<u32, BitstreamError> {
        debug_assert!(bits <= 32);

        let needed = bits as usize;
        ensure!(
            needed <= self.remaining_bits(),
            UnexpectedEofSnafu {
                needed,
                available: self.remaining_bits(),
            }
        );

        let mut value = 0u64;
        let mut shift = 0;
        let mut left = bits;
        while left > 0 {
            let bit = (self.pos & 7) as u32;
            let take = left.min(8 - bit);
            let byte = u64::from(self.data[self.pos >> 3] >> bit);
            value |= (byte & ((1 << take) - 1)) << shift;

            shift += take;
            left -= take;
            self.pos += take as usize;
        }

        Ok(value as u32)
    }

    /// Returns the next 8 bits without advancing.
    ///
    /// Bits past the end of the buffer read as zero; the subsequent [`advance`](Self::advance)
    /// is what detects the overrun.
    #[inline]
    pub fn peek_byte(&self) -> u8 {
        let idx = self.pos >> 3;
        let lo = u16::from(self.data.get(idx).copied().unwrap_or(0));
        let hi = u16::from(self.data.get(idx + 1).copied().unwrap_or(0));
        (((hi << 8) | lo) >> (self.pos & 7)) as u8
    }

    #[inline]
    pub fn advance(&mut self, bits: usize) -> Result<(), BitstreamError> {
        ensure!(
            bits <= self.remaining_bits(),
            UnexpectedEofSnafu {
                needed: bits,
                available: self.remaining_bits(),
            }
        );
        self.pos += bits;
        Ok(())
    }

    /// True when everything but the padding of the final byte (at most 7 bits) was consumed.
    pub const fn at_end(&self) -> bool {
        self.remaining_bits() < 8
    }
}

/// Appends a bitstream to a byte vector.
///
/// Bits are buffered until a byte is complete; call [`finish`](Self::finish) to flush the last
/// partial byte.
pub struct BitWriter<'a> {
    out: &'a mut Vec<u8>,
    start: usize,
    acc: u64,
    acc_bits: u32,
}

impl<'a> BitWriter<'a> {
    pub fn new(out: &'a mut Vec<u8>) -> Self {
        let start = out.len();
        Self {
            out,
            start,
            acc: 0,
            acc_bits: 0,
        }
    }

    /// Writes the low `bits` (0..=32) bits of `value`.
    #[inline]
    pub fn write_bits(&mut self, value: u32, bits: u32) {
        debug_assert!(bits <= 32);

        let mask = (1u64 << bits) - 1;
        self.acc |= (u64::from(value) & mask) << self.acc_bits;
        self.acc_bits += bits;

        while self.acc_bits >= 8 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.acc_bits -= 8;
        }
    }

    /// Writes a code of up to 64 bits.
    #[inline]
    pub fn write_bits_u64(&mut self, value: u64, bits: u32) {
        if bits > 32 {
            self.write_bits(value as u32, 32);
            self.write_bits((value >> 32) as u32, bits - 32);
        } else {
            self.write_bits(value as u32, bits);
        }
    }

    /// Bytes written so far, counting a partially filled final byte.
    pub fn size_in_bytes(&self) -> usize {
        self.out.len() - self.start + (self.acc_bits as usize + 7) / 8
    }

    /// Flushes the final partial byte (zero padded) and returns the number of bytes written.
    pub fn finish(self) -> usize {
        if self.acc_bits > 0 {
            self.out.push(self.acc as u8);
        }
        self.out.len() - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_lsb_first() {
        let data = [0b1010_0110, 0b0000_0001];
        let mut c = BitCursor::new(&data);
        assert_eq!(c.read_bit().unwrap(), 0);
        assert_eq!(c.read_bit().unwrap(), 1);
        assert_eq!(c.read_bits(3).unwrap(), 0b001);
        // crosses into the second byte
        assert_eq!(c.read_bits(4).unwrap(), 0b1101);
        assert_eq!(c.bit_position(), 9);
        assert!(c.at_end());
    }

    #[test]
    fn read_past_end_fails() {
        let data = [0xff];
        let mut c = BitCursor::new(&data);
        assert!(c.read_bits(8).is_ok());
        assert!(matches!(
            c.read_bit(),
            Err(BitstreamError::UnexpectedEof { needed: 1, .. })
        ));

        let mut c = BitCursor::new(&data);
        assert!(c.read_bits(9).is_err());
        // a failed read leaves the cursor untouched
        assert_eq!(c.bit_position(), 0);
        assert!(c.advance(9).is_err());
    }

    #[test]
    fn peek_zero_fills_past_end() {
        let data = [0b1111_0000, 0b0000_0011];
        let mut c = BitCursor::new(&data);
        c.advance(4).unwrap();
        assert_eq!(c.peek_byte(), 0b0011_1111);
        c.advance(8).unwrap();
        assert_eq!(c.peek_byte(), 0);
        assert_eq!(c.bit_position(), 12);
    }

    #[test]
    fn at_end_tolerates_padding_only() {
        let data = [0, 0];
        let mut c = BitCursor::new(&data);
        assert!(!c.at_end());
        c.advance(8).unwrap();
        assert!(!c.at_end());
        c.advance(1).unwrap();
        assert!(c.at_end());
        assert!(BitCursor::new(&[]).at_end());
    }

    #[test]
    fn writer_matches_reader() {
        let mut out = vec![0xaa];
        let mut w = BitWriter::new(&mut out);
        w.write_bits(1, 1);
        w.write_bits(0x1ff, 9);
        w.write_bits(0, 0);
        w.write_bits(0xdead_beef, 32);
        w.write_bits_u64(0x1_2345_6789, 33);
        assert_eq!(w.size_in_bytes(), 10);
        assert_eq!(w.finish(), 10);

        // preexisting bytes stay in place
        assert_eq!(out[0], 0xaa);

        let mut c = BitCursor::new(&out[1..]);
        assert_eq!(c.read_bits(1).unwrap(), 1);
        assert_eq!(c.read_bits(9).unwrap(), 0x1ff);
        assert_eq!(c.read_bits(32).unwrap(), 0xdead_beef);
        assert_eq!(c.read_bits(32).unwrap(), 0x2345_6789);
        assert_eq!(c.read_bits(1).unwrap(), 1);
        assert!(c.at_end());
    }
}
