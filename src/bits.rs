//! Sequential bit-level reads over an in-memory byte buffer.

use crate::{Error, Result};

/// A position-tracking reader over an immutable byte buffer supporting reads
/// of arbitrary bit widths.
///
/// All reads are big-endian bit-packed; a field may start and end on any bit
/// boundary. The position only advances on a successful read, so a failed
/// read can be retried or the cursor repositioned.
///
/// # Example
/// ```
/// use decom::bits::BitCursor;
///
/// let mut cursor = BitCursor::new(&[0xd, 0x59]);
/// assert_eq!(cursor.read_uint(3).unwrap(), 0);
/// assert_eq!(cursor.read_uint(1).unwrap(), 0);
/// assert_eq!(cursor.read_uint(1).unwrap(), 1);
/// assert_eq!(cursor.read_uint(11).unwrap(), 1369);
/// assert_eq!(cursor.remaining_bits(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BitCursor<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        BitCursor { buf, pos: 0 }
    }

    /// Total buffer length in bits.
    #[must_use]
    pub fn len_bits(&self) -> usize {
        self.buf.len() * 8
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current position in bits from the start of the buffer.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Reposition the cursor to an absolute bit offset.
    ///
    /// # Errors
    /// [`Error::InvalidPosition`] if `position` exceeds the buffer bit length.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.len_bits() {
            return Err(Error::InvalidPosition {
                position,
                len_bits: self.len_bits(),
            });
        }
        self.pos = position;
        Ok(())
    }

    #[must_use]
    pub fn remaining_bits(&self) -> usize {
        self.len_bits() - self.pos
    }

    fn check(&self, want: usize) -> Result<()> {
        if want > self.remaining_bits() {
            return Err(Error::OutOfRange {
                position: self.pos,
                want,
                available: self.remaining_bits(),
            });
        }
        Ok(())
    }

    /// Read `width` bits as a big-endian unsigned integer.
    ///
    /// # Errors
    /// [`Error::OutOfRange`] if fewer than `width` bits remain; the position
    /// is unchanged on error.
    ///
    /// # Panics
    /// If `width` is 0 or greater than 64.
    pub fn read_uint(&mut self, width: usize) -> Result<u64> {
        assert!((1..=64).contains(&width), "uint width must be 1..=64");
        self.check(width)?;

        let mut out: u64 = 0;
        let mut pos = self.pos;
        let mut remaining = width;
        while remaining > 0 {
            let byte = self.buf[pos / 8];
            let avail = 8 - pos % 8;
            let take = avail.min(remaining);
            let bits = (byte >> (avail - take)) & (0xff >> (8 - take));
            out = (out << take) | u64::from(bits);
            pos += take;
            remaining -= take;
        }
        self.pos = pos;
        Ok(out)
    }

    /// Read `width` bits as a two's complement signed integer.
    ///
    /// # Errors
    /// [`Error::OutOfRange`] if fewer than `width` bits remain.
    pub fn read_int(&mut self, width: usize) -> Result<i64> {
        let raw = self.read_uint(width)?;
        if width < 64 && raw >> (width - 1) == 1 {
            // sign extend
            return Ok((raw as i64) - (1i64 << width));
        }
        Ok(raw as i64)
    }

    /// Read a single bit as a flag.
    ///
    /// # Errors
    /// [`Error::OutOfRange`] if no bits remain.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_uint(1)? == 1)
    }

    /// Read `count` whole octets. The cursor need not be byte aligned.
    ///
    /// # Errors
    /// [`Error::OutOfRange`] if fewer than `count * 8` bits remain; the
    /// position is unchanged on error.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        // count may come from a decoded field, so it can be any u64; bound it
        // before converting to bits to rule out overflow
        if count > self.remaining_bits() / 8 {
            return Err(Error::OutOfRange {
                position: self.pos,
                want: count.saturating_mul(8),
                available: self.remaining_bits(),
            });
        }

        if self.pos % 8 == 0 {
            let start = self.pos / 8;
            self.pos += count * 8;
            return Ok(self.buf[start..start + count].to_vec());
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            // cannot fail, checked above
            out.push(self.read_uint(8)? as u8);
        }
        Ok(out)
    }

    /// Advance the position by `width` bits without producing a value.
    ///
    /// # Errors
    /// [`Error::OutOfRange`] if fewer than `width` bits remain.
    pub fn skip(&mut self, width: usize) -> Result<()> {
        self.check(width)?;
        self.pos += width;
        Ok(())
    }

    /// Advance to the next multiple of `word_bits`. Already-aligned positions
    /// are left alone.
    ///
    /// # Errors
    /// [`Error::OutOfRange`] if the next boundary is past the end of the
    /// buffer.
    ///
    /// # Panics
    /// If `word_bits` is 0.
    pub fn align(&mut self, word_bits: usize) -> Result<()> {
        assert!(word_bits > 0, "word size must be non-zero");
        let rem = self.pos % word_bits;
        if rem == 0 {
            return Ok(());
        }
        self.skip(word_bits - rem)
    }
}
