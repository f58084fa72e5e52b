//! Little-endian cursor I/O over byte buffers.
//!
//! [`ByteReader`] walks a borrowed slice and fails with
//! [`Ed2kError::Truncated`] instead of panicking when the input ends early.
//! [`ByteWriter`] appends into a growable `BytesMut`.
//!
//! # Example
//!
//! ```
//! use ed2k_client::codec::{ByteReader, ByteWriter};
//!
//! let mut writer = ByteWriter::new();
//! writer.put_u32(7);
//! writer.put_u16_string("hi").unwrap();
//!
//! let bytes = writer.freeze();
//! let mut reader = ByteReader::new(&bytes);
//! assert_eq!(reader.read_u32().unwrap(), 7);
//! assert_eq!(reader.read_u16_string().unwrap(), "hi");
//! assert!(reader.is_empty());
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Ed2kError, Result};

/// Sequential reader over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            len: buf.len(),
        }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.len - self.buf.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.len() < needed {
            return Err(Ed2kError::Truncated {
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64_le())
    }

    /// Borrow the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Read a fixed-size array, e.g. a 16-byte hash.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read `len` bytes as UTF-8 text. Invalid sequences are replaced.
    pub fn read_string(&mut self, len: usize) -> Result<String> {
        let raw = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    pub fn read_u16_string(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        self.read_string(len)
    }

    pub fn read_u32_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        self.read_string(len)
    }

    /// Advance past `len` bytes without looking at them.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.ensure(len)?;
        self.buf.advance(len);
        Ok(())
    }
}

/// Growable little-endian writer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: BytesMut,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn put_slice(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Write UTF-8 text behind a 16-bit length.
    pub fn put_u16_string(&mut self, value: &str) -> Result<()> {
        let len = u16::try_from(value.len()).map_err(|_| Ed2kError::StringTooLong(value.len()))?;
        self.put_u16(len);
        self.put_slice(value.as_bytes());
        Ok(())
    }

    /// Write UTF-8 text behind a 32-bit length.
    pub fn put_u32_string(&mut self, value: &str) -> Result<()> {
        let len = u32::try_from(value.len()).map_err(|_| Ed2kError::StringTooLong(value.len()))?;
        self.put_u32(len);
        self.put_slice(value.as_bytes());
        Ok(())
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_reads() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.read_u16().unwrap(), 0x0302);
        assert_eq!(reader.read_u32().unwrap(), 0x07060504);
        assert_eq!(reader.position(), 7);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_truncated_read_reports_sizes() {
        let data = [0xAA, 0xBB];
        let mut reader = ByteReader::new(&data);

        let err = reader.read_u32().unwrap_err();
        assert!(matches!(
            err,
            Ed2kError::Truncated {
                needed: 4,
                remaining: 2
            }
        ));
        // Failed read must not move the cursor.
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_skip_past_end_fails() {
        let data = [0u8; 3];
        let mut reader = ByteReader::new(&data);
        assert!(reader.skip(3).is_ok());
        assert!(reader.skip(1).is_err());
    }

    #[test]
    fn test_read_array_and_u64() {
        let mut data = vec![9u8; 16];
        data.extend_from_slice(&1u64.to_le_bytes());
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_array::<16>().unwrap(), [9u8; 16]);
        assert_eq!(reader.read_u64().unwrap(), 1);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let data = [0x02, 0x00, 0xFF, b'a'];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u16_string().unwrap(), "\u{FFFD}a");
    }

    #[test]
    fn test_writer_layout() {
        let mut writer = ByteWriter::with_capacity(16);
        writer.put_u8(0xE3);
        writer.put_u16(15490);
        writer.put_u32_string("ab").unwrap();

        let bytes = writer.freeze();
        assert_eq!(&bytes[..], &[0xE3, 0x82, 0x3C, 2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_u16_string_too_long() {
        let mut writer = ByteWriter::new();
        let long = "x".repeat(u16::MAX as usize + 1);
        let err = writer.put_u16_string(&long).unwrap_err();
        assert!(matches!(err, Ed2kError::StringTooLong(_)));
        assert!(writer.is_empty());
    }
}
