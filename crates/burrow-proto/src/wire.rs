//! Primitive wire types: a forward-only reader and an accumulating writer
//!
//! All integers are big-endian. Booleans are bit-packed eight to an octet,
//! least significant bit first, and a run of bits is closed by the next
//! non-bit read or write.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::table::{self, FieldTable};
use crate::WireError;

/// Longest string that fits a short-string length prefix
pub const MAX_SHORT_STR: usize = u8::MAX as usize;

/// Forward-only decoder over a byte buffer
#[derive(Debug, Clone, Default)]
pub struct Reader {
    /// Unconsumed input
    buf: Bytes,
    /// Octet currently being unpacked by `read_bit`
    bits: u8,
    /// Bits still available in `bits`
    bit_count: u8,
}

impl Reader {
    /// Create a reader over `buf`
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self {
            buf: buf.into(),
            bits: 0,
            bit_count: 0,
        }
    }

    /// Number of unconsumed bytes
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Whether every byte has been consumed
    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    /// Consume the reader and return the unread bytes
    pub fn into_remaining(self) -> Bytes {
        self.buf
    }

    fn ensure(&self, needed: usize) -> Result<(), WireError> {
        let available = self.buf.remaining();
        if available < needed {
            return Err(WireError::Truncated { needed, available });
        }
        Ok(())
    }

    fn reset_bits(&mut self) {
        self.bits = 0;
        self.bit_count = 0;
    }

    fn raw_read(&mut self, n: usize) -> Result<Bytes, WireError> {
        self.ensure(n)?;
        Ok(self.buf.split_to(n))
    }

    /// Read `n` raw bytes
    pub fn read(&mut self, n: usize) -> Result<Bytes, WireError> {
        self.reset_bits();
        self.raw_read(n)
    }

    /// Read one bit-packed boolean
    pub fn read_bit(&mut self) -> Result<bool, WireError> {
        if self.bit_count == 0 {
            self.ensure(1)?;
            self.bits = self.buf.get_u8();
            self.bit_count = 8;
        }

        let result = self.bits & 1 == 1;
        self.bits >>= 1;
        self.bit_count -= 1;
        Ok(result)
    }

    /// Read an unsigned 8-bit integer
    pub fn read_octet(&mut self) -> Result<u8, WireError> {
        self.reset_bits();
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read an unsigned 16-bit integer
    pub fn read_short(&mut self) -> Result<u16, WireError> {
        self.reset_bits();
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    /// Read an unsigned 32-bit integer
    pub fn read_long(&mut self) -> Result<u32, WireError> {
        self.reset_bits();
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    /// Read a signed 32-bit integer
    pub fn read_signed_long(&mut self) -> Result<i32, WireError> {
        self.reset_bits();
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    /// Read an unsigned 64-bit integer
    pub fn read_long_long(&mut self) -> Result<u64, WireError> {
        self.reset_bits();
        self.ensure(8)?;
        Ok(self.buf.get_u64())
    }

    /// Read a UTF-8 string with a one-octet length prefix
    pub fn read_short_str(&mut self) -> Result<String, WireError> {
        let len = self.read_octet()? as usize;
        let raw = self.raw_read(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| WireError::encoding(format!("short string is not UTF-8: {}", e)))
    }

    /// Read an opaque byte string with a four-octet length prefix
    pub fn read_long_str(&mut self) -> Result<Bytes, WireError> {
        let len = self.read_long()? as usize;
        self.raw_read(len)
    }

    /// Read a timestamp (seconds since the Unix epoch)
    pub fn read_timestamp(&mut self) -> Result<u64, WireError> {
        self.read_long_long()
    }

    /// Read a field table
    pub fn read_table(&mut self) -> Result<FieldTable, WireError> {
        let len = self.read_long()? as usize;
        let body = self.raw_read(len)?;
        table::decode_entries(Reader::new(body))
    }
}

/// Accumulating encoder
#[derive(Debug, Default)]
pub struct Writer {
    out: BytesMut,
    /// Octet being filled by `write_bit`
    bits: u8,
    /// Bits already stored in `bits`
    bit_count: u8,
}

impl Writer {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty writer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            out: BytesMut::with_capacity(capacity),
            ..Self::default()
        }
    }

    fn flush_bits(&mut self) {
        if self.bit_count > 0 {
            self.out.put_u8(self.bits);
            self.bits = 0;
            self.bit_count = 0;
        }
    }

    /// Encoded length so far, counting a partially filled bit octet
    pub fn len(&self) -> usize {
        self.out.len() + usize::from(self.bit_count > 0)
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush pending bits and return the encoded bytes
    pub fn finish(mut self) -> Bytes {
        self.flush_bits();
        self.out.freeze()
    }

    /// Append raw bytes
    pub fn write(&mut self, data: &[u8]) {
        self.flush_bits();
        self.out.put_slice(data);
    }

    /// Append one bit-packed boolean
    pub fn write_bit(&mut self, value: bool) {
        if self.bit_count == 8 {
            self.flush_bits();
        }
        self.bits |= u8::from(value) << self.bit_count;
        self.bit_count += 1;
    }

    /// Append an unsigned 8-bit integer
    pub fn write_octet(&mut self, n: u8) {
        self.flush_bits();
        self.out.put_u8(n);
    }

    /// Append an unsigned 16-bit integer
    pub fn write_short(&mut self, n: u16) {
        self.flush_bits();
        self.out.put_u16(n);
    }

    /// Append an unsigned 32-bit integer
    pub fn write_long(&mut self, n: u32) {
        self.flush_bits();
        self.out.put_u32(n);
    }

    /// Append a signed 32-bit integer
    pub fn write_signed_long(&mut self, n: i32) {
        self.flush_bits();
        self.out.put_i32(n);
    }

    /// Append an unsigned 64-bit integer
    pub fn write_long_long(&mut self, n: u64) {
        self.flush_bits();
        self.out.put_u64(n);
    }

    /// Append a string of at most 255 bytes with a one-octet length prefix
    pub fn write_short_str(&mut self, s: &str) -> Result<(), WireError> {
        if s.len() > MAX_SHORT_STR {
            return Err(WireError::encoding(format!(
                "short string is {} bytes (max: {})",
                s.len(),
                MAX_SHORT_STR
            )));
        }
        self.write_octet(s.len() as u8);
        self.out.put_slice(s.as_bytes());
        Ok(())
    }

    /// Append a byte string with a four-octet length prefix
    pub fn write_long_str(&mut self, data: &[u8]) -> Result<(), WireError> {
        let len = u32::try_from(data.len()).map_err(|_| {
            WireError::encoding(format!("long string is {} bytes (max: {})", data.len(), u32::MAX))
        })?;
        self.write_long(len);
        self.out.put_slice(data);
        Ok(())
    }

    /// Append a timestamp (seconds since the Unix epoch)
    pub fn write_timestamp(&mut self, seconds: u64) {
        self.write_long_long(seconds);
    }

    /// Append a field table
    pub fn write_table(&mut self, table: &FieldTable) -> Result<(), WireError> {
        let entries = table::encode_entries(table)?;
        let len = u32::try_from(entries.len()).map_err(|_| {
            WireError::encoding(format!("table is {} bytes (max: {})", entries.len(), u32::MAX))
        })?;
        self.write_long(len);
        self.write(&entries);
        Ok(())
    }
}
