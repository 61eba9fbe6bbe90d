//! Big-endian cursor helpers for the payload format.

use crate::error::DecodeError;

#[derive(Default)]
pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u128(&mut self, v: u128) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed field with a one-byte length. Callers check the bound.
    pub fn bytes8(&mut self, bytes: &[u8]) {
        self.buf.push(bytes.len() as u8);
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed field with a two-byte length. Callers check the bound.
    pub fn bytes16(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::Truncated(field))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, field)?[0])
    }

    pub fn u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        let b = self.take(2, field)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(self.take(8, field)?);
        Ok(u64::from_be_bytes(arr))
    }

    pub fn u128(&mut self, field: &'static str) -> Result<u128, DecodeError> {
        let mut arr = [0u8; 16];
        arr.copy_from_slice(self.take(16, field)?);
        Ok(u128::from_be_bytes(arr))
    }

    pub fn array32(&mut self, field: &'static str) -> Result<[u8; 32], DecodeError> {
        let mut arr = [0u8; 32];
        arr.copy_from_slice(self.take(32, field)?);
        Ok(arr)
    }

    pub fn bytes8(&mut self, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let len = self.u8(field)? as usize;
        self.take(len, field)
    }

    pub fn bytes16(&mut self, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let len = self.u16(field)? as usize;
        self.take(len, field)
    }

    pub fn str8(&mut self, field: &'static str) -> Result<String, DecodeError> {
        utf8(self.bytes8(field)?, field)
    }

    pub fn str16(&mut self, field: &'static str) -> Result<String, DecodeError> {
        utf8(self.bytes16(field)?, field)
    }

    pub fn finish(self) -> Result<(), DecodeError> {
        match self.buf.len() - self.pos {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

fn utf8(bytes: &[u8], field: &'static str) -> Result<String, DecodeError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(field))
}
