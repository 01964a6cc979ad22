//! TLV (type, length, value) records carried inside the decrypted payload
//! of a data message, per spec.md §3. SMP payloads are carried opaquely —
//! this crate only knows their type numbers, not their contents.

use crate::error::ProtoError;
use crate::wire::{write_short, Reader};

pub const TYPE_PADDING: u16 = 0x0000;
pub const TYPE_DISCONNECT: u16 = 0x0001;
pub const TYPE_SMP_1: u16 = 0x0002;
pub const TYPE_SMP_2: u16 = 0x0003;
pub const TYPE_SMP_3: u16 = 0x0004;
pub const TYPE_SMP_4: u16 = 0x0005;
pub const TYPE_SMP_ABORT: u16 = 0x0006;
pub const TYPE_SMP_1Q: u16 = 0x0007;
pub const TYPE_EXTRA_SYMKEY: u16 = 0x0008;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tlv_type: u16,
    pub value: Vec<u8>,
}

impl Tlv {
    pub fn new(tlv_type: u16, value: Vec<u8>) -> Self {
        Self { tlv_type, value }
    }

    pub fn padding(len: usize) -> Self {
        Self { tlv_type: TYPE_PADDING, value: vec![0u8; len] }
    }

    pub fn disconnect() -> Self {
        Self { tlv_type: TYPE_DISCONNECT, value: Vec::new() }
    }

    pub fn is_disconnect(&self) -> bool {
        self.tlv_type == TYPE_DISCONNECT
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_short(out, self.tlv_type);
        write_short(out, self.value.len() as u16);
        out.extend_from_slice(&self.value);
    }
}

/// Parse a sequence of concatenated TLV records until the buffer is
/// exhausted. An empty slice yields an empty vector (a data message may
/// legitimately carry no TLVs).
pub fn parse_all(buf: &[u8]) -> Result<Vec<Tlv>, ProtoError> {
    let mut reader = Reader::new(buf);
    let mut out = Vec::new();
    while !reader.is_empty() {
        let tlv_type = reader.read_short()?;
        let value = reader.read_tlv_value()?;
        out.push(Tlv { tlv_type, value: value.to_vec() });
    }
    Ok(out)
}

pub fn write_all(tlvs: &[Tlv]) -> Vec<u8> {
    let mut out = Vec::new();
    for tlv in tlvs {
        tlv.write(&mut out);
    }
    out
}

impl<'a> Reader<'a> {
    fn read_tlv_value(&mut self) -> Result<&'a [u8], ProtoError> {
        let len = self.read_short()? as usize;
        self.read_exact(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tlv_sequence_roundtrip() {
        let tlvs = vec![Tlv::new(TYPE_SMP_1, vec![1, 2, 3]), Tlv::padding(4), Tlv::disconnect()];
        let bytes = write_all(&tlvs);
        let parsed = parse_all(&bytes).unwrap();
        assert_eq!(parsed, tlvs);
    }

    #[test]
    fn empty_buffer_yields_no_tlvs() {
        assert_eq!(parse_all(&[]).unwrap(), Vec::new());
    }
}
