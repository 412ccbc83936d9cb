//! Byte streams
//!
//! Primitive readers and writers used by every message of the protocol.
//! All integers are big-endian. Every failure is reported as
//! [`TxnError::EncodeDecode`] with the name of the field being processed.
//!
//! ## Variable-size lengths
//! ```text
//! 0xxxxxxx                       1 byte,  0 ..= 2^7 - 1
//! 10xxxxxx xxxxxxxx * 3          4 bytes, 0 ..= 2^30 - 1
//! 11xxxxxx xxxxxxxx * 7          8 bytes, 0 ..= 2^62 - 1
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecCause, Result, TxnError};
use crate::types::{ClientId, WireEnum};

/// Largest string or binary field accepted on the wire (64 MB)
pub const MAX_FIELD_SIZE: usize = 64 * 1024 * 1024;

const VAR_SIZE_1BYTE_LIMIT: u64 = 1 << 7;
const VAR_SIZE_4BYTE_LIMIT: u64 = 1 << 30;
const VAR_SIZE_8BYTE_LIMIT: u64 = 1 << 62;

// =============================================================================
// Input
// =============================================================================

/// Cursor over a received payload
#[derive(Debug, Clone)]
pub struct ByteIn<'a> {
    buf: &'a [u8],
}

impl<'a> ByteIn<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not consumed yet
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Everything not consumed yet, without advancing
    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }

    fn take(&mut self, n: usize, field: &str) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(TxnError::decode(
                field,
                CodecCause::ShortBuffer {
                    needed: n,
                    remaining: self.buf.len(),
                },
            ));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Consume exactly `n` bytes
    pub fn read_slice(&mut self, n: usize, field: &str) -> Result<&'a [u8]> {
        self.take(n, field)
    }

    /// Consume everything that is left
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = self.buf;
        self.buf = &[];
        rest
    }

    pub fn read_u8(&mut self, field: &str) -> Result<u8> {
        Ok(self.take(1, field)?[0])
    }

    pub fn read_u16(&mut self, field: &str) -> Result<u16> {
        let b = self.take(2, field)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self, field: &str) -> Result<u32> {
        let b = self.take(4, field)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self, field: &str) -> Result<i32> {
        Ok(self.read_u32(field)? as i32)
    }

    pub fn read_u64(&mut self, field: &str) -> Result<u64> {
        let b = self.take(8, field)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    pub fn read_i64(&mut self, field: &str) -> Result<i64> {
        Ok(self.read_u64(field)? as i64)
    }

    pub fn read_bool(&mut self, field: &str) -> Result<bool> {
        match self.read_u8(field)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(TxnError::decode(
                field,
                CodecCause::InvalidTag {
                    what: "boolean",
                    value: other as i64,
                },
            )),
        }
    }

    /// Read a single-byte enumeration
    pub fn read_enum<E: WireEnum>(&mut self, field: &str) -> Result<E> {
        let byte = self.read_u8(field)?;
        E::from_byte(byte).ok_or_else(|| {
            TxnError::decode(
                field,
                CodecCause::InvalidTag {
                    what: E::NAME,
                    value: byte as i64,
                },
            )
        })
    }

    /// Read a variable-width size prefix
    pub fn read_var_size(&mut self, field: &str) -> Result<u64> {
        let first = self.read_u8(field)?;
        match first >> 6 {
            0 | 1 => Ok(first as u64),
            2 => {
                let rest = self.take(3, field)?;
                Ok((((first & 0x3f) as u64) << 24)
                    | ((rest[0] as u64) << 16)
                    | ((rest[1] as u64) << 8)
                    | rest[2] as u64)
            }
            _ => {
                let rest = self.take(7, field)?;
                let mut value = (first & 0x3f) as u64;
                for b in rest {
                    value = (value << 8) | *b as u64;
                }
                Ok(value)
            }
        }
    }

    fn read_sized(&mut self, field: &str) -> Result<&'a [u8]> {
        let size = self.read_var_size(field)? as usize;
        if size > MAX_FIELD_SIZE {
            return Err(TxnError::decode(
                field,
                CodecCause::Oversized {
                    size,
                    limit: MAX_FIELD_SIZE,
                },
            ));
        }
        self.take(size, field)
    }

    /// Read a length-prefixed binary field
    pub fn read_binary(&mut self, field: &str) -> Result<Vec<u8>> {
        Ok(self.read_sized(field)?.to_vec())
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self, field: &str) -> Result<String> {
        let raw = self.read_sized(field)?.to_vec();
        String::from_utf8(raw).map_err(|e| TxnError::decode(field, CodecCause::InvalidUtf8(e)))
    }

    pub fn read_client_id(&mut self, field: &str) -> Result<ClientId> {
        let uuid_bytes = self.take(16, field)?;
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(uuid_bytes);
        let session_id = self.read_u64(field)?;
        Ok(ClientId::new(uuid, session_id))
    }
}

// =============================================================================
// Output
// =============================================================================

/// Growable output buffer for an outgoing payload
#[derive(Debug, Default)]
pub struct ByteOut {
    buf: BytesMut,
}

impl ByteOut {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn put_slice(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    pub fn put_enum<E: WireEnum>(&mut self, v: E) {
        self.buf.put_u8(v.to_byte());
    }

    /// Write a variable-width size prefix
    pub fn put_var_size(&mut self, size: u64, field: &str) -> Result<()> {
        if size < VAR_SIZE_1BYTE_LIMIT {
            self.buf.put_u8(size as u8);
        } else if size < VAR_SIZE_4BYTE_LIMIT {
            self.buf.put_u32((size as u32) | 0x8000_0000);
        } else if size < VAR_SIZE_8BYTE_LIMIT {
            self.buf.put_u64(size | 0xC000_0000_0000_0000);
        } else {
            return Err(TxnError::encode(
                field,
                CodecCause::Oversized {
                    size: size as usize,
                    limit: VAR_SIZE_8BYTE_LIMIT as usize,
                },
            ));
        }
        Ok(())
    }

    fn put_sized(&mut self, data: &[u8], field: &str) -> Result<()> {
        if data.len() > MAX_FIELD_SIZE {
            return Err(TxnError::encode(
                field,
                CodecCause::Oversized {
                    size: data.len(),
                    limit: MAX_FIELD_SIZE,
                },
            ));
        }
        self.put_var_size(data.len() as u64, field)?;
        self.buf.put_slice(data);
        Ok(())
    }

    /// Write a length-prefixed binary field
    pub fn put_binary(&mut self, data: &[u8], field: &str) -> Result<()> {
        self.put_sized(data, field)
    }

    /// Write a length-prefixed UTF-8 string
    pub fn put_string(&mut self, s: &str, field: &str) -> Result<()> {
        self.put_sized(s.as_bytes(), field)
    }

    pub fn put_client_id(&mut self, id: &ClientId) {
        self.buf.put_slice(&id.uuid);
        self.buf.put_u64(id.session_id);
    }
}
