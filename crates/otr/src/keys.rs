//! The key-management ratchet: per-direction DH key pairs, counter
//! discipline, session-key derivation, and revealed-MAC-key bookkeeping,
//! per spec.md §3/§4.5.

use otr_crypto::dh::DhKeyPair;
use otr_crypto::kdf::{derive_session_keys, SessionKeys};
use rand::RngCore;
use std::collections::HashMap;

/// One of our DH key pairs, tagged with its keyID.
struct OurKey {
    keyid: u32,
    pair: DhKeyPair,
}

/// One of the peer's DH public values, tagged with its keyID.
struct TheirKey {
    keyid: u32,
    public: num_bigint::BigUint,
}

pub struct KeyManagement {
    our_current: OurKey,
    our_previous: Option<OurKey>,
    their_current: Option<TheirKey>,
    their_previous: Option<TheirKey>,
    /// The 64-bit outbound CTR top-half, strictly increasing per
    /// (our_keyid, their_keyid) pair (spec.md invariant).
    outbound_counters: HashMap<(u32, u32), u64>,
    /// Highest inbound CTR top-half accepted per (their_keyid, our_keyid)
    /// pair — replay rejection.
    inbound_high_water: HashMap<(u32, u32), u64>,
    session_cache: HashMap<(u32, u32), SessionKeys>,
    /// Receiving MAC keys that have decrypted at least one message under
    /// (their_keyid, our_keyid) but are still reachable (current or
    /// previous) — not yet safe to reveal, since the peer could still be
    /// retransmitting under that same key pair.
    used_receiving_macs: HashMap<(u32, u32), [u8; 20]>,
    /// Receiving MAC keys already used and superseded, queued for
    /// revelation on the next outbound data message, FIFO.
    pending_reveal: Vec<[u8; 20]>,
}

impl KeyManagement {
    pub fn new(exponent_bits: usize, rng: &mut impl RngCore) -> Self {
        Self {
            our_current: OurKey { keyid: 1, pair: DhKeyPair::generate(rng, exponent_bits) },
            our_previous: None,
            their_current: None,
            their_previous: None,
            outbound_counters: HashMap::new(),
            inbound_high_water: HashMap::new(),
            session_cache: HashMap::new(),
            used_receiving_macs: HashMap::new(),
            pending_reveal: Vec::new(),
        }
    }

    /// Seed the ratchet from a completed AKE: the DH key pair we used
    /// during the handshake and the peer's revealed value are promoted to
    /// keyID 1 on each side, becoming the first data-message key pair.
    pub fn from_ake(our_dh: DhKeyPair, their_public: num_bigint::BigUint) -> Self {
        Self {
            our_current: OurKey { keyid: 1, pair: our_dh },
            our_previous: None,
            their_current: Some(TheirKey { keyid: 1, public: their_public }),
            their_previous: None,
            outbound_counters: HashMap::new(),
            inbound_high_water: HashMap::new(),
            session_cache: HashMap::new(),
            used_receiving_macs: HashMap::new(),
            pending_reveal: Vec::new(),
        }
    }

    pub fn our_current_keyid(&self) -> u32 {
        self.our_current.keyid
    }

    pub fn our_current_public(&self) -> &num_bigint::BigUint {
        self.our_current.pair.public()
    }

    pub fn their_current_keyid(&self) -> Option<u32> {
        self.their_current.as_ref().map(|k| k.keyid)
    }

    /// Rotate our outbound key pair forward: current becomes previous, a
    /// fresh pair becomes current at `keyid + 1`. Whatever was previously
    /// in `our_previous` falls out of the reachable window entirely, so any
    /// receiving MAC keys recorded against it are now safe to reveal.
    pub fn rotate_ours(&mut self, exponent_bits: usize, rng: &mut impl RngCore) {
        let new_keyid = self.our_current.keyid + 1;
        let new_pair = OurKey { keyid: new_keyid, pair: DhKeyPair::generate(rng, exponent_bits) };
        let old_current = std::mem::replace(&mut self.our_current, new_pair);
        if let Some(dropped) = self.our_previous.replace(old_current) {
            self.retire_our_keyid(dropped.keyid);
        }
    }

    /// Record a newly observed peer public value, promoting it to current
    /// (and demoting the prior current to previous) if it differs from
    /// what we already have. Whatever was previously in `their_previous`
    /// falls out of the reachable window entirely, so any receiving MAC
    /// keys recorded against it are now safe to reveal.
    pub fn observe_their_public(&mut self, public: num_bigint::BigUint) -> u32 {
        if let Some(current) = &self.their_current {
            if current.public == public {
                return current.keyid;
            }
        }
        let new_keyid = self.their_current.as_ref().map(|k| k.keyid + 1).unwrap_or(1);
        let new_key = TheirKey { keyid: new_keyid, public };
        let old_current = std::mem::replace(&mut self.their_current, Some(new_key));
        if let Some(dropped) = std::mem::replace(&mut self.their_previous, old_current) {
            self.retire_their_keyid(dropped.keyid);
        }
        new_keyid
    }

    /// Move every receiving MAC key recorded under our keyid `keyid` (now
    /// unreachable) into the reveal queue.
    fn retire_our_keyid(&mut self, keyid: u32) {
        let retired: Vec<[u8; 20]> = self
            .used_receiving_macs
            .iter()
            .filter(|((_, our_keyid), _)| *our_keyid == keyid)
            .map(|(_, mac)| *mac)
            .collect();
        self.used_receiving_macs.retain(|(_, our_keyid), _| *our_keyid != keyid);
        for mac in retired {
            self.queue_mac_key_for_reveal(mac);
        }
    }

    /// Move every receiving MAC key recorded under their keyid `keyid` (now
    /// unreachable) into the reveal queue.
    fn retire_their_keyid(&mut self, keyid: u32) {
        let retired: Vec<[u8; 20]> = self
            .used_receiving_macs
            .iter()
            .filter(|((their_keyid, _), _)| *their_keyid == keyid)
            .map(|(_, mac)| *mac)
            .collect();
        self.used_receiving_macs.retain(|(their_keyid, _), _| *their_keyid != keyid);
        for mac in retired {
            self.queue_mac_key_for_reveal(mac);
        }
    }

    /// Record that `mac_key` decrypted a message under (their_keyid,
    /// our_keyid); queued for revelation once that key pair is retired
    /// (spec.md §3: revealed only after the key is superseded), not
    /// immediately, so a peer retransmitting under the same key pair
    /// doesn't get its still-live MAC key revealed out from under it.
    pub fn note_receiving_mac_used(&mut self, their_keyid: u32, our_keyid: u32, mac_key: [u8; 20]) {
        self.used_receiving_macs.insert((their_keyid, our_keyid), mac_key);
    }

    fn our_pair(&self, keyid: u32) -> Option<&DhKeyPair> {
        if self.our_current.keyid == keyid {
            return Some(&self.our_current.pair);
        }
        self.our_previous.as_ref().filter(|k| k.keyid == keyid).map(|k| &k.pair)
    }

    fn their_public(&self, keyid: u32) -> Option<&num_bigint::BigUint> {
        if let Some(k) = &self.their_current {
            if k.keyid == keyid {
                return Some(&k.public);
            }
        }
        self.their_previous.as_ref().filter(|k| k.keyid == keyid).map(|k| &k.public)
    }

    /// Derive (and cache) the session keys for a given (our_keyid,
    /// their_keyid) pair.
    pub fn session_keys(&mut self, our_keyid: u32, their_keyid: u32) -> Option<&SessionKeys> {
        if !self.session_cache.contains_key(&(our_keyid, their_keyid)) {
            let our_pair = self.our_pair(our_keyid)?;
            let their_public = self.their_public(their_keyid)?.clone();
            let shared = our_pair.shared_secret(&their_public).ok()?;
            let we_are_lower = *our_pair.public() < their_public;
            let keys = derive_session_keys(&shared, we_are_lower);
            self.session_cache.insert((our_keyid, their_keyid), keys);
        }
        self.session_cache.get(&(our_keyid, their_keyid))
    }

    /// Bump and return the next outbound CTR top-half for (our_keyid,
    /// their_keyid); panics never — wraps are astronomically unreachable
    /// within a conversation's lifetime.
    pub fn next_outbound_counter(&mut self, our_keyid: u32, their_keyid: u32) -> u64 {
        let counter = self.outbound_counters.entry((our_keyid, their_keyid)).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Replay rejection: the CTR top-half on an inbound message must be
    /// strictly greater than the highest previously accepted under the
    /// same key pair.
    pub fn check_and_record_inbound_counter(&mut self, their_keyid: u32, our_keyid: u32, counter_top: u64) -> bool {
        let entry = self.inbound_high_water.entry((their_keyid, our_keyid)).or_insert(0);
        if counter_top <= *entry {
            return false;
        }
        *entry = counter_top;
        true
    }

    pub fn queue_mac_key_for_reveal(&mut self, mac_key: [u8; 20]) {
        self.pending_reveal.push(mac_key);
    }

    /// Drain the revealed-MAC-keys queue as a single concatenated blob,
    /// ready for `DataMessage`'s `revealed_mac_keys` field.
    pub fn drain_revealed_mac_keys(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pending_reveal.len() * 20);
        for key in self.pending_reveal.drain(..) {
            out.extend_from_slice(&key);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyids_never_decrease_on_rotation() {
        let mut rng = rand::thread_rng();
        let mut km = KeyManagement::new(320, &mut rng);
        assert_eq!(km.our_current_keyid(), 1);
        km.rotate_ours(320, &mut rng);
        assert_eq!(km.our_current_keyid(), 2);
        km.rotate_ours(320, &mut rng);
        assert_eq!(km.our_current_keyid(), 3);
    }

    #[test]
    fn outbound_counter_strictly_increases() {
        let mut rng = rand::thread_rng();
        let mut km = KeyManagement::new(320, &mut rng);
        let a = km.next_outbound_counter(1, 1);
        let b = km.next_outbound_counter(1, 1);
        assert!(b > a);
    }

    #[test]
    fn replay_is_rejected() {
        let mut rng = rand::thread_rng();
        let mut km = KeyManagement::new(320, &mut rng);
        assert!(km.check_and_record_inbound_counter(1, 1, 5));
        assert!(!km.check_and_record_inbound_counter(1, 1, 5));
        assert!(!km.check_and_record_inbound_counter(1, 1, 4));
        assert!(km.check_and_record_inbound_counter(1, 1, 6));
    }

    #[test]
    fn mac_reveal_queue_is_fifo_and_drains_once() {
        let mut rng = rand::thread_rng();
        let mut km = KeyManagement::new(320, &mut rng);
        km.queue_mac_key_for_reveal([1u8; 20]);
        km.queue_mac_key_for_reveal([2u8; 20]);
        let blob = km.drain_revealed_mac_keys();
        assert_eq!(blob.len(), 40);
        assert_eq!(&blob[..20], &[1u8; 20]);
        assert!(km.drain_revealed_mac_keys().is_empty());
    }

    #[test]
    fn receiving_mac_is_not_revealed_while_still_reachable() {
        let mut rng = rand::thread_rng();
        let mut km = KeyManagement::new(320, &mut rng);
        km.note_receiving_mac_used(1, 1, [9u8; 20]);
        // One rotation only pushes the in-use keyid into `our_previous` —
        // still reachable, so nothing should be queued yet.
        km.rotate_ours(320, &mut rng);
        assert!(km.drain_revealed_mac_keys().is_empty());
    }

    #[test]
    fn receiving_mac_is_revealed_once_its_keyid_falls_out_of_window() {
        let mut rng = rand::thread_rng();
        let mut km = KeyManagement::new(320, &mut rng);
        km.note_receiving_mac_used(1, 1, [9u8; 20]);
        km.rotate_ours(320, &mut rng); // keyid 1 -> our_previous
        km.rotate_ours(320, &mut rng); // keyid 1 drops out entirely
        let blob = km.drain_revealed_mac_keys();
        assert_eq!(blob, [9u8; 20]);
    }
}
