//! The data-message encryption/decryption pipeline, per spec.md §4.5:
//! padding, session-key selection, AES-CTR encryption, HMAC-SHA1-160
//! authentication, and MAC-key revelation on the outbound side; replay
//! rejection, ratchet key lookup, and TLV interpretation on the inbound
//! side.

use crate::error::Error;
use crate::keys::KeyManagement;
use otr_crypto::aes_ctr;
use otr_crypto::hash::{hmac_sha1_160, verify_hmac_sha1_160};
use otr_proto::data::{DataMessage, FLAG_IGNORE_UNREADABLE, FLAG_NONE};
use otr_proto::header::{Header, MSG_TYPE_DATA};
use otr_proto::tlv::{self, Tlv};
use rand::RngCore;
use tracing::{trace, warn};

/// Plaintext data messages are padded to a multiple of this many bytes
/// (spec.md §4.5 step 1), to blunt length-based traffic analysis.
const PADDING_GRANULARITY: usize = 256;

/// Outcome of decrypting an inbound data message.
pub struct Decrypted {
    pub plaintext: Vec<u8>,
    pub tlvs: Vec<Tlv>,
    pub disconnected: bool,
}

/// Build an outbound data message carrying `plaintext` and any TLVs the
/// caller wants attached (e.g. a heartbeat ping carries none; a disconnect
/// carries `Tlv::disconnect()`).
pub fn encrypt(
    keys: &mut KeyManagement,
    version: u16,
    our_instance_tag: u32,
    their_instance_tag: u32,
    plaintext: &[u8],
    extra_tlvs: &[Tlv],
    exponent_bits: usize,
    rng: &mut impl RngCore,
) -> Result<Vec<u8>, Error> {
    let our_keyid = keys.our_current_keyid();
    let their_keyid = keys
        .their_current_keyid()
        .ok_or(Error::StateError)?;

    let mut body = plaintext.to_vec();
    body.push(0x00);
    let unpadded_total = body.len() + tlv_len(extra_tlvs) + 4; // + this TLV's own header
    let target = unpadded_total.div_ceil(PADDING_GRANULARITY) * PADDING_GRANULARITY;
    let pad_value_len = target - unpadded_total;
    let mut tlvs = extra_tlvs.to_vec();
    tlvs.push(Tlv::padding(pad_value_len));
    body.extend_from_slice(&tlv::write_all(&tlvs));

    let revealed = keys.drain_revealed_mac_keys();
    let session = keys
        .session_keys(our_keyid, their_keyid)
        .ok_or(Error::StateError)?
        .clone();

    let counter = keys.next_outbound_counter(our_keyid, their_keyid);
    let counter_top = counter.to_be_bytes();
    let ciphertext = aes_ctr::encrypt(&session.sending_aes, counter_top, &body);

    let header = if version == 3 { Header::v3(MSG_TYPE_DATA, our_instance_tag, their_instance_tag) } else { Header::v2(MSG_TYPE_DATA) };
    let next_dh_pub = keys.our_current_public().clone();
    let prefix = DataMessage::authenticated_prefix(&header, FLAG_NONE, our_keyid, their_keyid, &next_dh_pub, counter_top, &ciphertext);
    let mac = hmac_sha1_160(&session.sending_mac, &prefix);

    // Rotating our key pair forward makes the *next* message advertise a
    // fresh next_dh_pub; this message still announces our current one.
    keys.rotate_ours(exponent_bits, rng);

    trace!(our_keyid, their_keyid, counter, "encrypted outbound data message");
    Ok(DataMessage::build(header, FLAG_NONE, our_keyid, their_keyid, &next_dh_pub, counter_top, &ciphertext, mac, &revealed))
}

/// Decrypt and authenticate an inbound data message, returning the
/// plaintext and any TLVs it carried.
pub fn decrypt(keys: &mut KeyManagement, msg: &DataMessage) -> Result<Decrypted, Error> {
    let counter_top = u64::from_be_bytes(msg.counter_top);
    if !keys.check_and_record_inbound_counter(msg.sender_keyid, msg.recipient_keyid, counter_top) {
        warn!(sender_keyid = msg.sender_keyid, counter_top, "rejecting replayed data message");
        return Err(Error::UnreadableMessage("counter did not increase".into()));
    }

    keys.observe_their_public(msg.next_dh_pub.clone());

    let session = keys
        .session_keys(msg.recipient_keyid, msg.sender_keyid)
        .ok_or_else(|| Error::UnreadableMessage("no session keys for this key id pair".into()))?
        .clone();

    let prefix = DataMessage::authenticated_prefix(
        &msg.header,
        msg.flags,
        msg.sender_keyid,
        msg.recipient_keyid,
        &msg.next_dh_pub,
        msg.counter_top,
        &msg.ciphertext,
    );
    if !verify_hmac_sha1_160(&session.receiving_mac, &prefix, &msg.mac) {
        if msg.flags & FLAG_IGNORE_UNREADABLE != 0 {
            return Err(Error::UnreadableMessage("MAC mismatch (ignorable)".into()));
        }
        return Err(Error::UnreadableMessage("MAC mismatch".into()));
    }

    keys.note_receiving_mac_used(msg.sender_keyid, msg.recipient_keyid, session.receiving_mac);

    let body = aes_ctr::decrypt(&session.receiving_aes, msg.counter_top, &msg.ciphertext);
    let split_at = body.iter().position(|&b| b == 0x00).ok_or_else(|| Error::MalformedMessage("missing plaintext/TLV separator".into()))?;
    let plaintext = body[..split_at].to_vec();
    let tlvs = tlv::parse_all(&body[split_at + 1..])?;
    let disconnected = tlvs.iter().any(Tlv::is_disconnect);

    Ok(Decrypted { plaintext, tlvs, disconnected })
}

fn tlv_len(tlvs: &[Tlv]) -> usize {
    tlvs.iter().map(|t| 4 + t.value.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyManagement;
    use otr_proto::data::DataMessage;

    fn linked_pair() -> (KeyManagement, KeyManagement) {
        let mut rng = rand::thread_rng();
        let mut alice = KeyManagement::new(320, &mut rng);
        let mut bob = KeyManagement::new(320, &mut rng);
        let alice_pub = alice.our_current_public().clone();
        let bob_pub = bob.our_current_public().clone();
        alice.observe_their_public(bob_pub);
        bob.observe_their_public(alice_pub);
        (alice, bob)
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let mut rng = rand::thread_rng();
        let (mut alice, mut bob) = linked_pair();
        let bytes = encrypt(&mut alice, 3, 0x101, 0x202, b"hello bob", &[], 320, &mut rng).unwrap();
        let msg = DataMessage::parse(&bytes).unwrap();
        let decrypted = decrypt(&mut bob, &msg).unwrap();
        assert_eq!(decrypted.plaintext, b"hello bob");
        assert!(!decrypted.disconnected);
    }

    #[test]
    fn disconnect_tlv_is_detected() {
        let mut rng = rand::thread_rng();
        let (mut alice, mut bob) = linked_pair();
        let bytes = encrypt(&mut alice, 3, 0x101, 0x202, b"", &[Tlv::disconnect()], 320, &mut rng).unwrap();
        let msg = DataMessage::parse(&bytes).unwrap();
        let decrypted = decrypt(&mut bob, &msg).unwrap();
        assert!(decrypted.disconnected);
    }

    #[test]
    fn replayed_message_is_rejected() {
        let mut rng = rand::thread_rng();
        let (mut alice, mut bob) = linked_pair();
        let bytes = encrypt(&mut alice, 3, 0x101, 0x202, b"once", &[], 320, &mut rng).unwrap();
        let msg = DataMessage::parse(&bytes).unwrap();
        assert!(decrypt(&mut bob, &msg).is_ok());
        assert!(decrypt(&mut bob, &msg).is_err());
    }
}
