//! The shared wire header every AKE and data message carries: protocol
//! version, message type byte, and (v3 only) sender/receiver instance
//! tags, per spec.md §6.

use crate::error::ProtoError;
use crate::wire::{write_short, write_word, Reader};

pub const MSG_TYPE_DH_COMMIT: u8 = 0x02;
pub const MSG_TYPE_DATA: u8 = 0x03;
pub const MSG_TYPE_DH_KEY: u8 = 0x0A;
pub const MSG_TYPE_REVEAL_SIG: u8 = 0x11;
pub const MSG_TYPE_SIG: u8 = 0x12;

/// `0` is the v3 broadcast value ("any instance").
pub const INSTANCE_TAG_BROADCAST: u32 = 0;
pub const INSTANCE_TAG_MIN: u32 = 0x100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub message_type: u8,
    /// Present only when `version == 3`.
    pub sender_instance_tag: u32,
    pub receiver_instance_tag: u32,
}

impl Header {
    pub fn v2(message_type: u8) -> Self {
        Self { version: 2, message_type, sender_instance_tag: 0, receiver_instance_tag: 0 }
    }

    pub fn v3(message_type: u8, sender_instance_tag: u32, receiver_instance_tag: u32) -> Self {
        Self { version: 3, message_type, sender_instance_tag, receiver_instance_tag }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_short(out, self.version);
        out.push(self.message_type);
        if self.version == 3 {
            write_word(out, self.sender_instance_tag);
            write_word(out, self.receiver_instance_tag);
        }
    }

    pub fn parse(reader: &mut Reader) -> Result<Self, ProtoError> {
        let version = reader.read_short()?;
        let message_type = reader.read_byte()?;
        let (sender_instance_tag, receiver_instance_tag) = if version == 3 {
            (reader.read_word()?, reader.read_word()?)
        } else {
            (0, 0)
        };
        Ok(Self { version, message_type, sender_instance_tag, receiver_instance_tag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_header_roundtrip() {
        let header = Header::v3(MSG_TYPE_DATA, 0x101, 0x202);
        let mut buf = Vec::new();
        header.write(&mut buf);
        let mut r = Reader::new(&buf);
        let parsed = Header::parse(&mut r).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn v2_header_has_no_instance_tags() {
        let header = Header::v2(MSG_TYPE_DH_COMMIT);
        let mut buf = Vec::new();
        header.write(&mut buf);
        assert_eq!(buf.len(), 3);
    }
}
