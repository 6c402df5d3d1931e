//! Binary reader for zero-copy parsing of byte slices.
//!
//! This module provides [`BinaryReader`], a cursor-like type that reads
//! binary data from a byte slice without copying. Unlike a plain cursor it
//! carries the byte order of the resource being parsed, since several of the
//! formats handled by this library exist in both big- and little-endian
//! flavors within the same container.

use zerocopy::FromBytes;

use crate::{Endian, Error, Result};

/// A bounds-checked binary reader over a borrowed byte slice.
///
/// Every multi-byte read honors the reader's [`Endian`]; fields that are
/// endian-fixed on the wire (such as byte order marks) have dedicated
/// accessors.
///
/// # Example
///
/// ```
/// use veles_common::{BinaryReader, Endian};
///
/// let data = [0x01, 0x02, 0x03, 0x04];
/// let mut reader = BinaryReader::new(&data, Endian::Little);
/// assert_eq!(reader.read_u32().unwrap(), 0x04030201);
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
    endian: Endian,
}

impl<'a> BinaryReader<'a> {
    /// Create a new reader from a byte slice.
    #[inline]
    pub const fn new(data: &'a [u8], endian: Endian) -> Self {
        Self { data, position: 0, endian }
    }

    /// Get the current position in the buffer.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Get the total length of the underlying buffer.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Get the underlying buffer.
    #[inline]
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    /// The byte order this reader decodes with.
    #[inline]
    pub const fn endian(&self) -> Endian {
        self.endian
    }

    /// Change the byte order, e.g. after reading a BOM.
    #[inline]
    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// Get the number of bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if there are no more bytes to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Seek to an absolute position.
    #[inline]
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    /// Advance the position by a number of bytes.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        self.position = self.position.saturating_add(count);
    }

    /// Peek at bytes without advancing the position.
    #[inline]
    pub fn peek_bytes(&self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::UnexpectedEof {
                needed: count,
                available: self.remaining(),
            });
        }
        Ok(&self.data[self.position..self.position + count])
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let bytes = self.peek_bytes(count)?;
        self.position += count;
        Ok(bytes)
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    /// Read a single byte at an absolute offset.
    #[inline]
    pub fn read_u8_at(&mut self, offset: usize) -> Result<u8> {
        self.seek(offset);
        self.read_u8()
    }

    /// Read a signed byte.
    #[inline]
    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_u8().map(|v| v as i8)
    }

    /// Read an i16 in the reader's byte order.
    #[inline]
    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_u16().map(|v| v as i16)
    }

    /// Read an i64 in the reader's byte order.
    #[inline]
    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_u64().map(|v| v as i64)
    }

    /// Read a u16 in the reader's byte order.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        let raw = [b[0], b[1]];
        Ok(match self.endian {
            Endian::Big => u16::from_be_bytes(raw),
            Endian::Little => u16::from_le_bytes(raw),
        })
    }

    /// Read a little-endian u16 regardless of the reader's byte order.
    ///
    /// Used for fields that are endian-fixed on the wire (header sizes and
    /// byte order marks in SARC).
    #[inline]
    pub fn read_u16_le(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a big-endian u16 regardless of the reader's byte order.
    #[inline]
    pub fn read_u16_be(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a u32 in the reader's byte order.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        let raw = [b[0], b[1], b[2], b[3]];
        Ok(match self.endian {
            Endian::Big => u32::from_be_bytes(raw),
            Endian::Little => u32::from_le_bytes(raw),
        })
    }

    /// Read a u32 at an absolute offset.
    #[inline]
    pub fn read_u32_at(&mut self, offset: usize) -> Result<u32> {
        self.seek(offset);
        self.read_u32()
    }

    /// Read a u64 in the reader's byte order.
    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        let raw = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
        Ok(match self.endian {
            Endian::Big => u64::from_be_bytes(raw),
            Endian::Little => u64::from_le_bytes(raw),
        })
    }

    /// Read an i32 in the reader's byte order.
    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_u32().map(|v| v as i32)
    }

    /// Read an f32 in the reader's byte order.
    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Read an f64 in the reader's byte order.
    #[inline]
    pub fn read_f64(&mut self) -> Result<f64> {
        self.read_u64().map(f64::from_bits)
    }

    /// Read an unsigned 24-bit integer in the reader's byte order.
    #[inline]
    pub fn read_u24(&mut self) -> Result<u32> {
        let b = self.read_bytes(3)?;
        Ok(match self.endian {
            Endian::Big => (b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32,
            Endian::Little => (b[2] as u32) << 16 | (b[1] as u32) << 8 | b[0] as u32,
        })
    }

    /// Read an unsigned 24-bit integer at an absolute offset.
    #[inline]
    pub fn read_u24_at(&mut self, offset: usize) -> Result<u32> {
        self.seek(offset);
        self.read_u24()
    }

    /// Read a fixed-layout struct using zerocopy.
    ///
    /// The struct's fields must already encode their byte order (e.g.
    /// `zerocopy::little_endian::U32`); the reader's endianness is not
    /// applied.
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::UnexpectedEof {
            needed: size,
            available: bytes.len(),
        })
    }

    /// Read a fixed-layout struct at an absolute offset.
    #[inline]
    pub fn read_struct_at<T: FromBytes>(&mut self, offset: usize) -> Result<T> {
        self.seek(offset);
        self.read_struct()
    }

    /// Read a null-terminated UTF-8 string at an absolute offset.
    ///
    /// The scan for the terminator is bounded by `max_len` when given, and by
    /// the end of the buffer otherwise. A string that runs to the bound
    /// without a terminator is returned as-is, matching how the games'
    /// `strnlen`-based readers behave.
    pub fn read_cstr_at(&self, offset: usize, max_len: Option<usize>) -> Result<&'a str> {
        if offset > self.data.len() {
            return Err(Error::OffsetOutOfBounds {
                offset,
                size: self.data.len(),
            });
        }
        let window = &self.data[offset..];
        let limit = max_len.unwrap_or(window.len()).min(window.len());
        let window = &window[..limit];
        let len = window.iter().position(|&b| b == 0).unwrap_or(limit);
        std::str::from_utf8(&window[..len]).map_err(Error::Utf8)
    }

    /// Expect specific magic bytes at the current position.
    pub fn expect_magic(&mut self, expected: &[u8]) -> Result<()> {
        let actual = self.read_bytes(expected.len())?;
        if actual != expected {
            return Err(Error::InvalidMagic {
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            });
        }
        Ok(())
    }
}
