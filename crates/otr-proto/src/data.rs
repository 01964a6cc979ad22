//! The data message shape, per spec.md §4.5 step 4-5:
//! `flag BYTE ‖ senderKeyID WORD ‖ recipientKeyID WORD ‖ MPI(next g^x) ‖
//! CTR(8) ‖ DATA(ciphertext) ‖ MAC_SHA1-160(...) ‖ DATA(revealed MAC keys)`.
//!
//! Encryption, MAC computation/verification, and TLV interpretation happen
//! in the `otr` crate, which owns the session keys; this struct only knows
//! how to lay the fields out on the wire.

use crate::error::ProtoError;
use crate::header::{Header, MSG_TYPE_DATA};
use crate::wire::{write_byte, write_ctr, write_data, write_mpi, write_word, Reader};
use num_bigint::BigUint;

pub const FLAG_NONE: u8 = 0x00;
pub const FLAG_IGNORE_UNREADABLE: u8 = 0x01;

#[derive(Debug, Clone)]
pub struct DataMessage {
    pub header: Header,
    pub flags: u8,
    pub sender_keyid: u32,
    pub recipient_keyid: u32,
    pub next_dh_pub: BigUint,
    pub counter_top: [u8; 8],
    pub ciphertext: Vec<u8>,
    pub mac: [u8; 20],
    pub revealed_mac_keys: Vec<u8>,
}

impl DataMessage {
    /// Everything up to (but excluding) the trailing MAC tag — this is
    /// exactly the byte range the MAC authenticates.
    pub fn authenticated_prefix(
        header: &Header,
        flags: u8,
        sender_keyid: u32,
        recipient_keyid: u32,
        next_dh_pub: &BigUint,
        counter_top: [u8; 8],
        ciphertext: &[u8],
    ) -> Vec<u8> {
        let mut out = Vec::new();
        header.write(&mut out);
        write_byte(&mut out, flags);
        write_word(&mut out, sender_keyid);
        write_word(&mut out, recipient_keyid);
        write_mpi(&mut out, next_dh_pub);
        write_ctr(&mut out, counter_top);
        write_data(&mut out, ciphertext);
        out
    }

    #[allow(clippy::too_many_arguments)]
    pub fn build(
        header: Header,
        flags: u8,
        sender_keyid: u32,
        recipient_keyid: u32,
        next_dh_pub: &BigUint,
        counter_top: [u8; 8],
        ciphertext: &[u8],
        mac: [u8; 20],
        revealed_mac_keys: &[u8],
    ) -> Vec<u8> {
        let mut out = Self::authenticated_prefix(
            &header,
            flags,
            sender_keyid,
            recipient_keyid,
            next_dh_pub,
            counter_top,
            ciphertext,
        );
        out.extend_from_slice(&mac);
        write_data(&mut out, revealed_mac_keys);
        out
    }

    pub fn parse(buf: &[u8]) -> Result<Self, ProtoError> {
        let mut reader = Reader::new(buf);
        let header = Header::parse(&mut reader)?;
        let flags = reader.read_byte()?;
        let sender_keyid = reader.read_word()?;
        let recipient_keyid = reader.read_word()?;
        let next_dh_pub = reader.read_mpi()?;
        let counter_top = reader.read_ctr()?;
        let ciphertext = reader.read_data()?.to_vec();
        let mac_slice = reader.read_exact(20)?;
        let mut mac = [0u8; 20];
        mac.copy_from_slice(mac_slice);
        let revealed_mac_keys = reader.read_data()?.to_vec();
        reader.finish()?;
        Ok(Self {
            header,
            flags,
            sender_keyid,
            recipient_keyid,
            next_dh_pub,
            counter_top,
            ciphertext,
            mac,
            revealed_mac_keys,
        })
    }

    pub const fn message_type() -> u8 {
        MSG_TYPE_DATA
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn data_message_roundtrip() {
        let header = Header::v3(MSG_TYPE_DATA, 0x101, 0x202);
        let next_dh_pub = BigUint::from_u64(55).unwrap();
        let ciphertext = vec![1, 2, 3, 4, 5];
        let mac = [7u8; 20];
        let bytes = DataMessage::build(header, FLAG_NONE, 1, 1, &next_dh_pub, [0u8; 8], &ciphertext, mac, &[]);
        let parsed = DataMessage::parse(&bytes).unwrap();
        assert_eq!(parsed.ciphertext, ciphertext);
        assert_eq!(parsed.mac, mac);
        assert_eq!(parsed.sender_keyid, 1);
    }
}
