//! Primitive wire encodings, all big-endian, per spec.md §4.1:
//! BYTE (1), SHORT (2), WORD (4), DATA (length-prefixed bytes), MPI
//! (length-prefixed unsigned big integer), CTR (8 transmitted counter
//! bytes). Every reader returns a malformed-input error without partial
//! mutation of the cursor it was given.

use crate::error::ProtoError;
use num_bigint::BigUint;

/// A cursor over an immutable byte slice. Readers advance `pos` only on
/// success; a failed read leaves the cursor untouched.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn require(&self, n: usize) -> Result<(), ProtoError> {
        if self.buf.len() - self.pos < n {
            return Err(ProtoError::TooShort { needed: n, have: self.buf.len() - self.pos });
        }
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8, ProtoError> {
        self.require(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_short(&mut self) -> Result<u16, ProtoError> {
        self.require(2)?;
        let v = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    pub fn read_word(&mut self) -> Result<u32, ProtoError> {
        self.require(4)?;
        let v = u32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    pub fn read_data(&mut self) -> Result<&'a [u8], ProtoError> {
        let len = self.read_word()? as usize;
        self.require(len)?;
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_mpi(&mut self) -> Result<BigUint, ProtoError> {
        let bytes = self.read_data()?;
        Ok(BigUint::from_bytes_be(bytes))
    }

    /// Read exactly `len` bytes without any length prefix — used where the
    /// length has already been read separately (TLV value bytes).
    pub fn read_exact(&mut self, len: usize) -> Result<&'a [u8], ProtoError> {
        self.require(len)?;
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_ctr(&mut self) -> Result<[u8; 8], ProtoError> {
        self.require(8)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(out)
    }

    /// Fail unless every byte of the buffer has been consumed — used by
    /// fixed-shape message parsers to reject trailing garbage.
    pub fn finish(&self) -> Result<(), ProtoError> {
        if self.pos != self.buf.len() {
            return Err(ProtoError::TrailingBytes);
        }
        Ok(())
    }
}

pub fn write_byte(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

pub fn write_short(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn write_word(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn write_data(out: &mut Vec<u8>, payload: &[u8]) {
    write_word(out, payload.len() as u32);
    out.extend_from_slice(payload);
}

pub fn write_mpi(out: &mut Vec<u8>, value: &BigUint) {
    use num_traits::Zero;
    let bytes = if value.is_zero() { Vec::new() } else { value.to_bytes_be() };
    write_data(out, &bytes);
}

pub fn write_ctr(out: &mut Vec<u8>, counter_top: [u8; 8]) {
    out.extend_from_slice(&counter_top);
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn mpi_roundtrip() {
        let value = BigUint::from_u64(0x01020304_05060708).unwrap();
        let mut buf = Vec::new();
        write_mpi(&mut buf, &value);
        let mut r = Reader::new(&buf);
        let parsed = r.read_mpi().unwrap();
        assert_eq!(parsed, value);
        assert!(r.finish().is_ok());
    }

    #[test]
    fn short_reader_does_not_advance_on_failure() {
        let buf = [0x00u8];
        let mut r = Reader::new(&buf);
        assert!(r.read_short().is_err());
        assert_eq!(r.remaining(), &buf[..]);
    }

    #[test]
    fn data_truncated_is_rejected() {
        let mut buf = Vec::new();
        write_word(&mut buf, 10);
        buf.extend_from_slice(&[1, 2, 3]);
        let mut r = Reader::new(&buf);
        assert!(r.read_data().is_err());
    }
}
