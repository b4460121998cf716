//! Variable-length integer coding and the grow-only byte buffers frames decode from.

use crate::error::{IndexError, Result};

/// A u64 never needs more than ten 7-bit groups.
pub(crate) const MAX_VARINT_BYTES: usize = 10;

/// Append `value` as a little-endian base-128 varint.
pub fn write_vlong(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        } else {
            out.push(byte | 0x80);
        }
    }
}

#[inline]
pub fn write_vint(out: &mut Vec<u8>, value: u32) {
    write_vlong(out, value as u64)
}

/// Forward-only cursor over a borrowed byte slice.
#[derive(Clone, Copy, Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ByteReader { bytes, pos: 0 }
    }

    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        ByteReader { bytes, pos }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    #[inline]
    pub fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    #[inline]
    pub fn read_byte(&mut self) -> Result<u8> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or(IndexError::InvalidFormat("unexpected end of buffer"))?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_vlong(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0;
        for _ in 0..MAX_VARINT_BYTES {
            let byte = self.read_byte()?;
            result |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(IndexError::InvalidFormat("varint too long"))
    }

    pub fn read_vint(&mut self) -> Result<u32> {
        let v = self.read_vlong()?;
        u32::try_from(v).map_err(|_| IndexError::InvalidFormat("vint overflows u32"))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(IndexError::InvalidFormat("byte run past end of buffer"))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    #[inline]
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }
}

/// Owned, grow-only byte buffer with a read position.
///
/// Reloading copies into the existing allocation; capacity only ever grows, so a
/// frame that is revisited millions of times stops allocating after warm-up.
#[derive(Debug, Default)]
pub struct ScratchBuf {
    bytes: Vec<u8>,
    pos: usize,
}

impl ScratchBuf {
    pub fn reset_from(&mut self, src: &[u8]) {
        self.bytes.clear();
        self.bytes.extend_from_slice(src);
        self.pos = 0;
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.pos = 0;
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        debug_assert!(pos <= self.bytes.len());
        self.pos = pos;
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    /// A reader positioned at the current read position; pair with `set_position`.
    #[inline]
    pub fn reader(&self) -> ByteReader<'_> {
        ByteReader::at(&self.bytes, self.pos)
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let mut r = self.reader();
        let v = r.read_byte()?;
        self.pos = r.position();
        Ok(v)
    }

    pub fn read_vint(&mut self) -> Result<u32> {
        let mut r = self.reader();
        let v = r.read_vint()?;
        self.pos = r.position();
        Ok(v)
    }

    pub fn read_vlong(&mut self) -> Result<u64> {
        let mut r = self.reader();
        let v = r.read_vlong()?;
        self.pos = r.position();
        Ok(v)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        let mut r = self.reader();
        r.skip(n)?;
        self.pos = r.position();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_boundaries() {
        let values = [0u64, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX];
        let mut buf = Vec::new();
        for &v in &values {
            write_vlong(&mut buf, v);
        }
        let mut r = ByteReader::new(&buf);
        for &v in &values {
            assert_eq!(r.read_vlong().unwrap(), v);
        }
        assert!(r.eof());
    }

    #[test]
    fn truncated_varint_is_an_error() {
        let mut r = ByteReader::new(&[0x80, 0x80]);
        assert!(matches!(r.read_vlong(), Err(IndexError::InvalidFormat(_))));
    }

    #[test]
    fn vint_rejects_wide_values() {
        let mut buf = Vec::new();
        write_vlong(&mut buf, u32::MAX as u64 + 1);
        assert!(ByteReader::new(&buf).read_vint().is_err());
    }

    #[test]
    fn scratch_buffer_keeps_capacity() {
        let mut s = ScratchBuf::default();
        s.reset_from(&[1u8; 64]);
        let cap = s.bytes.capacity();
        s.reset_from(&[7, 8]);
        assert_eq!(s.as_slice(), &[7, 8]);
        assert!(s.bytes.capacity() >= cap);
        assert_eq!(s.read_byte().unwrap(), 7);
        assert_eq!(s.remaining(), 1);
        assert!(s.skip(2).is_err());
        assert_eq!(s.position(), 1);
    }
}
