//! The Authenticated Key Exchange state machine, per spec.md §4.3. Four
//! states dispatched as a tagged variant rather than by object identity
//! (spec.md §9, Design Notes), so the transition table stays auditable in
//! one place.

use crate::error::Error;
use otr_crypto::aes_ctr;
use otr_crypto::dh::{self, DhKeyPair};
use otr_crypto::dsa::{DsaKeyPair, DsaPublicKey};
use otr_crypto::hash::{hmac_sha1_160, hmac_sha256, sha256, verify_hmac_sha1_160};
use otr_crypto::kdf::{derive_ake_keys, derive_ssid, AkeKeys};
use otr_proto::ake::{DhCommit, DhKey, RevealSig, Sig};
use otr_proto::wire::write_mpi;
use num_bigint::BigUint;
use rand::RngCore;
use tracing::{debug, trace, warn};

const INITIAL_KEYID: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    None,
    AwaitingDhKey,
    AwaitingRevealSig,
    AwaitingSig,
}

/// Everything the completed handshake hands off to the conversation: the
/// DH key pair and peer value to seed the ratchet at keyID 1, the ssid for
/// UX comparison, and the peer's long-term DSA public key.
pub struct AkeOutcome {
    pub our_dh: DhKeyPair,
    pub their_dh_pub: BigUint,
    pub ssid: [u8; 8],
    pub peer_dsa_public: DsaPublicKey,
}

/// Result of feeding one AKE event through the machine.
#[derive(Default)]
pub struct AkeStep {
    pub outbound: Option<Vec<u8>>,
    pub outcome: Option<AkeOutcome>,
}

impl AkeStep {
    fn send(bytes: Vec<u8>) -> Self {
        Self { outbound: Some(bytes), outcome: None }
    }

    fn none() -> Self {
        Self::default()
    }
}

#[derive(Default)]
pub struct AkeMachine {
    pub state: State,
    version: u16,
    our_instance_tag: u32,
    their_instance_tag: u32,

    // Committer-side transient state (we sent DH-Commit).
    our_x: Option<DhKeyPair>,
    r: Option<[u8; 16]>,
    our_hashed_gx: Option<[u8; 32]>,
    stored_dh_commit: Option<Vec<u8>>,
    stored_reveal_sig: Option<Vec<u8>>,
    their_gy_for_reveal_sig: Option<BigUint>,

    // Responder-side transient state (we sent DH-Key).
    our_y: Option<DhKeyPair>,
    their_encrypted_gx: Option<Vec<u8>>,
    their_hashed_gx: Option<[u8; 32]>,
    stored_dh_key: Option<Vec<u8>>,

    // Keys derived once both DH values are known; kept across the
    // DH-Key/Reveal-Sig boundary on the committer side, and across the
    // Reveal-Sig/Sig boundary is unnecessary (responder derives and uses
    // immediately).
    ake_keys: Option<AkeKeys>,
}

impl Default for State {
    fn default() -> Self {
        State::None
    }
}

impl AkeMachine {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    /// NONE/any + Query: become the committer, emit DH-Commit, ->
    /// AWAITING_DHKEY. A query always restarts any in-progress AKE
    /// (spec.md §4.4).
    pub fn start(
        &mut self,
        version: u16,
        our_instance_tag: u32,
        their_instance_tag: u32,
        rng: &mut impl RngCore,
    ) -> Vec<u8> {
        self.reset();
        self.version = version;
        self.our_instance_tag = our_instance_tag;
        self.their_instance_tag = their_instance_tag;
        let exponent_bits = if version == 3 { 1536 } else { 320 };
        let x = DhKeyPair::generate(rng, exponent_bits);
        let mut r = [0u8; 16];
        rng.fill_bytes(&mut r);
        let gx_mpi = mpi_bytes(x.public());
        let hashed_gx = sha256(&gx_mpi);
        let encrypted_gx = aes_ctr::encrypt(&r, [0u8; 8], &gx_mpi);
        let bytes = DhCommit::build(version, our_instance_tag, their_instance_tag, encrypted_gx, hashed_gx);
        self.stored_dh_commit = Some(bytes.clone());
        self.our_hashed_gx = Some(hashed_gx);
        self.our_x = Some(x);
        self.r = Some(r);
        self.state = State::AwaitingDhKey;
        debug!(version, "AKE: emitted DH-Commit, awaiting DH-Key");
        bytes
    }

    pub fn on_dh_commit(
        &mut self,
        msg: &DhCommit,
        our_instance_tag: u32,
        their_instance_tag: u32,
        rng: &mut impl RngCore,
    ) -> Result<AkeStep, Error> {
        match self.state {
            State::None => Ok(AkeStep::send(self.become_responder(msg, our_instance_tag, their_instance_tag, rng))),
            State::AwaitingDhKey => {
                let our_hash = self.our_hashed_gx.expect("set in start()");
                if our_hash > msg.hashed_gx {
                    trace!("AKE: tie-break favors us, resending DH-Commit");
                    Ok(AkeStep::send(self.stored_dh_commit.clone().expect("set in start()")))
                } else {
                    trace!("AKE: tie-break favors peer, switching to responder role");
                    Ok(AkeStep::send(self.become_responder(msg, our_instance_tag, their_instance_tag, rng)))
                }
            }
            State::AwaitingRevealSig => {
                self.their_encrypted_gx = Some(msg.encrypted_gx.clone());
                self.their_hashed_gx = Some(msg.hashed_gx);
                Ok(AkeStep::send(self.stored_dh_key.clone().expect("set when entering AWAITING_REVEALSIG")))
            }
            State::AwaitingSig => {
                if self.their_hashed_gx == Some(msg.hashed_gx) {
                    if let Some(bytes) = &self.stored_dh_key {
                        return Ok(AkeStep::send(bytes.clone()));
                    }
                }
                warn!("AKE: unrecognized DH-Commit while AWAITING_SIG, ignoring");
                Ok(AkeStep::none())
            }
        }
    }

    fn become_responder(
        &mut self,
        msg: &DhCommit,
        our_instance_tag: u32,
        their_instance_tag: u32,
        rng: &mut impl RngCore,
    ) -> Vec<u8> {
        let version = msg.header.version;
        self.reset();
        self.version = version;
        self.our_instance_tag = our_instance_tag;
        self.their_instance_tag = their_instance_tag;
        let exponent_bits = if version == 3 { 1536 } else { 320 };
        let y = DhKeyPair::generate(rng, exponent_bits);
        let bytes = DhKey::build(version, our_instance_tag, their_instance_tag, y.public());
        self.stored_dh_key = Some(bytes.clone());
        self.their_encrypted_gx = Some(msg.encrypted_gx.clone());
        self.their_hashed_gx = Some(msg.hashed_gx);
        self.our_y = Some(y);
        self.state = State::AwaitingRevealSig;
        debug!(version, "AKE: emitted DH-Key, awaiting Reveal-Signature");
        bytes
    }

    pub fn on_dh_key(
        &mut self,
        msg: &DhKey,
        our_dsa: &DsaKeyPair,
        rng: &mut impl RngCore,
    ) -> Result<AkeStep, Error> {
        match self.state {
            State::AwaitingDhKey => {
                dh::validate_public_value(&msg.gy).map_err(|_| {
                    self.reset();
                    Error::HandshakeFailure("peer DH-Key value out of range".into())
                })?;
                let our_x = self.our_x.as_ref().expect("set in start()");
                let s = our_x.shared_secret(&msg.gy).map_err(|e| {
                    self.reset();
                    Error::HandshakeFailure(e.to_string())
                })?;
                let keys = derive_ake_keys(&s);

                let gx_mpi = mpi_bytes(our_x.public());
                let gy_mpi = mpi_bytes(&msg.gy);
                let pub_bytes = our_dsa.public().serialize();
                let keyid_bytes = INITIAL_KEYID.to_be_bytes();
                let mb = mb_hash(&keys.m1, &gx_mpi, &gy_mpi, &pub_bytes, &keyid_bytes);
                let sig = our_dsa.sign(rng, &mb);

                let mut sig_payload = pub_bytes;
                sig_payload.extend_from_slice(&keyid_bytes);
                sig_payload.extend_from_slice(&sig);

                let encrypted_sig = aes_ctr::encrypt(&keys.c, [0u8; 8], &sig_payload);
                let r = self.r.expect("set in start()");
                let prefix = RevealSig::authenticated_prefix(&r, &encrypted_sig);
                let mac = hmac_sha1_160(&keys.m2, &prefix);

                let bytes = RevealSig::build(self.version, self.our_instance_tag, self.their_instance_tag, &r, &encrypted_sig, mac);
                self.stored_reveal_sig = Some(bytes.clone());
                self.their_gy_for_reveal_sig = Some(msg.gy.clone());
                self.ake_keys = Some(keys);
                self.state = State::AwaitingSig;
                debug!("AKE: emitted Reveal-Signature, awaiting Signature");
                Ok(AkeStep::send(bytes))
            }
            State::AwaitingSig => {
                if self.their_gy_for_reveal_sig.as_ref() == Some(&msg.gy) {
                    let bytes = self.stored_reveal_sig.clone().expect("set above");
                    return Ok(AkeStep::send(bytes));
                }
                Ok(AkeStep::none())
            }
            _ => Ok(AkeStep::none()),
        }
    }

    pub fn on_reveal_sig(&mut self, msg: &RevealSig, our_dsa: &DsaKeyPair, rng: &mut impl RngCore) -> Result<AkeStep, Error> {
        if self.state != State::AwaitingRevealSig {
            return Ok(AkeStep::none());
        }
        let encrypted_gx = self.their_encrypted_gx.clone().expect("set when entering AWAITING_REVEALSIG");
        if msg.r.len() != 16 {
            self.reset();
            return Err(Error::HandshakeFailure("revealed r is not 16 bytes".into()));
        }
        let mut r = [0u8; 16];
        r.copy_from_slice(&msg.r);
        let gx_mpi_bytes = aes_ctr::decrypt(&r, [0u8; 8], &encrypted_gx);

        let verify_hash = sha256(&gx_mpi_bytes);
        if Some(verify_hash) != self.their_hashed_gx {
            self.reset();
            return Err(Error::HandshakeFailure("revealed g^x does not match committed hash".into()));
        }
        let gx = parse_mpi_bytes(&gx_mpi_bytes).ok_or_else(|| {
            self.reset();
            Error::HandshakeFailure("malformed revealed g^x".into())
        })?;
        dh::validate_public_value(&gx).map_err(|_| {
            self.reset();
            Error::HandshakeFailure("revealed g^x out of range".into())
        })?;

        let our_y = self.our_y.as_ref().expect("set when entering AWAITING_REVEALSIG");
        let s = our_y.shared_secret(&gx).map_err(|e| {
            self.reset();
            Error::HandshakeFailure(e.to_string())
        })?;
        let keys = derive_ake_keys(&s);

        let prefix = RevealSig::authenticated_prefix(&msg.r, &msg.encrypted_sig);
        if !verify_hmac_sha1_160(&keys.m2, &prefix, &msg.mac) {
            self.reset();
            return Err(Error::HandshakeFailure("Reveal-Signature MAC mismatch".into()));
        }

        let sig_payload = aes_ctr::decrypt(&keys.c, [0u8; 8], &msg.encrypted_sig);
        let (peer_pub, consumed) = DsaPublicKey::parse(&sig_payload).map_err(|e| {
            self.reset();
            Error::HandshakeFailure(e.to_string())
        })?;
        if sig_payload.len() < consumed + 4 + 40 {
            self.reset();
            return Err(Error::HandshakeFailure("sig_payload truncated".into()));
        }
        let peer_keyid = u32::from_be_bytes(sig_payload[consumed..consumed + 4].try_into().unwrap());
        let signature = &sig_payload[consumed + 4..consumed + 4 + 40];

        let gx_mpi = mpi_bytes(&gx);
        let gy_mpi = mpi_bytes(our_y.public());
        let mb = mb_hash(&keys.m1, &gx_mpi, &gy_mpi, &sig_payload[..consumed], &peer_keyid.to_be_bytes());
        peer_pub.verify(&mb, signature).map_err(|_| {
            self.reset();
            Error::HandshakeFailure("peer DSA signature verification failed".into())
        })?;

        // We are the responder: build our own Signature message with the
        // primed key set.
        let our_pub_bytes = our_dsa.public().serialize();
        let our_keyid_bytes = INITIAL_KEYID.to_be_bytes();
        let our_mb = mb_hash(&keys.m1_prime, &gx_mpi, &gy_mpi, &our_pub_bytes, &our_keyid_bytes);
        let our_sig = our_dsa.sign(rng, &our_mb);
        let mut our_sig_payload = our_pub_bytes;
        our_sig_payload.extend_from_slice(&our_keyid_bytes);
        our_sig_payload.extend_from_slice(&our_sig);
        let our_encrypted_sig = aes_ctr::encrypt(&keys.c_prime, [0u8; 8], &our_sig_payload);
        let our_prefix = Sig::authenticated_prefix(&our_encrypted_sig);
        let our_mac = hmac_sha1_160(&keys.m2_prime, &our_prefix);
        let sig_bytes = Sig::build(self.version, self.our_instance_tag, self.their_instance_tag, &our_encrypted_sig, our_mac);

        let ssid = derive_ssid(&s);
        let our_dh = self.our_y.take().expect("checked above");
        self.reset();
        Ok(AkeStep {
            outbound: Some(sig_bytes),
            outcome: Some(AkeOutcome { our_dh, their_dh_pub: gx, ssid, peer_dsa_public: peer_pub }),
        })
    }

    pub fn on_sig(&mut self, msg: &Sig) -> Result<AkeStep, Error> {
        if self.state != State::AwaitingSig {
            return Ok(AkeStep::none());
        }
        let keys = self.ake_keys.as_ref().expect("set in on_dh_key");
        let prefix = Sig::authenticated_prefix(&msg.encrypted_sig);
        if !verify_hmac_sha1_160(&keys.m2_prime, &prefix, &msg.mac) {
            self.reset();
            return Err(Error::HandshakeFailure("Signature MAC mismatch".into()));
        }
        let sig_payload = aes_ctr::decrypt(&keys.c_prime, [0u8; 8], &msg.encrypted_sig);
        let (peer_pub, consumed) = DsaPublicKey::parse(&sig_payload).map_err(|e| {
            self.reset();
            Error::HandshakeFailure(e.to_string())
        })?;
        if sig_payload.len() < consumed + 4 + 40 {
            self.reset();
            return Err(Error::HandshakeFailure("sig_payload truncated".into()));
        }
        let peer_keyid = u32::from_be_bytes(sig_payload[consumed..consumed + 4].try_into().unwrap());
        let signature = &sig_payload[consumed + 4..consumed + 4 + 40];

        let our_x = self.our_x.as_ref().expect("set in start()");
        let their_gy = self.their_gy_for_reveal_sig.clone().expect("set in on_dh_key");
        let gx_mpi = mpi_bytes(our_x.public());
        let gy_mpi = mpi_bytes(&their_gy);
        let mb = mb_hash(&keys.m1_prime, &gx_mpi, &gy_mpi, &sig_payload[..consumed], &peer_keyid.to_be_bytes());
        peer_pub.verify(&mb, signature).map_err(|_| {
            self.reset();
            Error::HandshakeFailure("peer DSA signature verification failed".into())
        })?;

        let ssid = {
            let our_x = self.our_x.as_ref().unwrap();
            let s = our_x.shared_secret(&their_gy).expect("validated earlier in the handshake");
            derive_ssid(&s)
        };
        let our_dh = self.our_x.take().expect("checked above");
        self.reset();
        Ok(AkeStep {
            outbound: None,
            outcome: Some(AkeOutcome { our_dh, their_dh_pub: their_gy, ssid, peer_dsa_public: peer_pub }),
        })
    }
}

fn mpi_bytes(value: &BigUint) -> Vec<u8> {
    let mut out = Vec::new();
    write_mpi(&mut out, value);
    out
}

fn parse_mpi_bytes(buf: &[u8]) -> Option<BigUint> {
    let mut reader = otr_proto::wire::Reader::new(buf);
    reader.read_mpi().ok()
}

fn mb_hash(key: &[u8], gx_mpi: &[u8], gy_mpi: &[u8], pub_bytes: &[u8], keyid_bytes: &[u8]) -> [u8; 32] {
    let mut input = Vec::with_capacity(gx_mpi.len() + gy_mpi.len() + pub_bytes.len() + keyid_bytes.len());
    input.extend_from_slice(gx_mpi);
    input.extend_from_slice(gy_mpi);
    input.extend_from_slice(pub_bytes);
    input.extend_from_slice(keyid_bytes);
    hmac_sha256(key, &input)
}
