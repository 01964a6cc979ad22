//! The router and top-level `Conversation` entity, per spec.md §4.4/§6: a
//! single per-peer OTR endpoint classifying inbound bytes and driving the
//! AKE, key management, and data-message layers accordingly.

use crate::ake::{AkeMachine, AkeOutcome};
use crate::data_message;
use crate::error::Error;
use crate::fragment::{self, FragmentContext};
use crate::keys::KeyManagement;
use crate::policy::{ConversationConfig, Policy};
use crate::version::VersionCapabilities;
use crate::whitespace;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use otr_crypto::dsa::{DsaKeyPair, DsaPublicKey};
use otr_proto::ake::{DhCommit, DhKey, RevealSig, Sig};
use otr_proto::data::DataMessage;
use otr_proto::header::{
    INSTANCE_TAG_MIN, MSG_TYPE_DATA, MSG_TYPE_DH_COMMIT, MSG_TYPE_DH_KEY, MSG_TYPE_REVEAL_SIG, MSG_TYPE_SIG,
};
use otr_proto::tlv::Tlv;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, instrument, trace, warn};

const QUERY_PREFIX: &str = "?OTR";
const ERROR_PREFIX: &str = "?OTR Error:";
const FRAGMENT_PREFIX: &str = "?OTR,";
const FRAGMENT_PREFIX_V3: &str = "?OTR|";
const ENCODED_PREFIX: &str = "?OTR:";
const ENCODED_SUFFIX: char = '.';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Plaintext,
    Encrypted,
    Finished,
}

enum Classified<'a> {
    Error(&'a str),
    Fragment(&'a str),
    Query(&'a str),
    Encoded(Vec<u8>),
    TaggedPlaintext(Vec<u16>, Vec<u8>),
    Plaintext(&'a [u8]),
    NotOtr,
}

/// A single per-peer OTR conversation. Owns all protocol state; performs no
/// I/O of its own (spec.md §5).
pub struct Conversation {
    pub state: MessageState,
    policy: Policy,
    fragment_size: Option<usize>,
    our_instance_tag: u32,
    their_instance_tag: u32,
    version: Option<u16>,
    our_dsa: DsaKeyPair,
    peer_dsa_public: Option<DsaPublicKey>,
    ake: AkeMachine,
    keys: Option<KeyManagement>,
    fragctx: FragmentContext,
    ssid: Option<[u8; 8]>,
    whitespace_tag_sent: bool,
    last_message_hint: Option<Vec<u8>>,
    rng: StdRng,
}

impl Conversation {
    pub fn new(config: ConversationConfig, our_dsa: DsaKeyPair) -> Self {
        let mut rng = StdRng::from_entropy();
        let our_instance_tag = config.instance_tag.unwrap_or_else(|| random_instance_tag(&mut rng));
        Self {
            state: MessageState::Plaintext,
            policy: config.policy,
            fragment_size: config.fragment_size,
            our_instance_tag,
            their_instance_tag: 0,
            version: None,
            our_dsa,
            peer_dsa_public: None,
            ake: AkeMachine::new(),
            keys: None,
            fragctx: FragmentContext::new(),
            ssid: None,
            whitespace_tag_sent: false,
            last_message_hint: None,
            rng,
        }
    }

    pub fn ssid(&self) -> Option<[u8; 8]> {
        self.ssid
    }

    pub fn peer_fingerprint(&self) -> Option<[u8; 20]> {
        self.peer_dsa_public.as_ref().map(DsaPublicKey::fingerprint)
    }

    /// The version-advertising query string for our current policy
    /// (spec.md §6): `?OTRv` followed by one digit per enabled version.
    pub fn query_message(&self) -> String {
        let mut versions = String::new();
        if self.policy.allows_version(2) {
            versions.push('2');
        }
        if self.policy.allows_version(3) {
            versions.push('3');
        }
        format!("?OTRv{versions}?")
    }

    /// The most recent unreadable/error condition's hint for a host that
    /// wants to resend its last plaintext — kept minimal, since full
    /// retransmission queuing is host policy.
    pub fn last_message_hint(&self) -> Option<&[u8]> {
        self.last_message_hint.as_deref()
    }

    #[instrument(skip(self, bytes))]
    pub fn receive(&mut self, bytes: &[u8]) -> Result<(Option<Vec<u8>>, Vec<Vec<u8>>), Error> {
        if bytes.is_empty() {
            return Ok((None, Vec::new()));
        }
        match self.classify(bytes) {
            Classified::Error(text) => {
                warn!(%text, "received OTR error envelope");
                self.last_message_hint = Some(text.as_bytes().to_vec());
                if self.policy.contains(Policy::ERROR_START_AKE) {
                    let query = self.query_message();
                    return Ok((None, vec![query.into_bytes()]));
                }
                Ok((None, Vec::new()))
            }
            Classified::Fragment(text) => {
                if let Some(reassembled) = self.receive_fragment(text)? {
                    self.receive(&reassembled)
                } else {
                    Ok((None, Vec::new()))
                }
            }
            Classified::Query(text) => {
                let outbound = self.start_ake_from_query(text)?;
                Ok((None, outbound))
            }
            Classified::Encoded(decoded) => self.dispatch_encoded(&decoded),
            Classified::TaggedPlaintext(versions, stripped) => {
                trace!(?versions, "received whitespace-tagged plaintext");
                let mut outbound = Vec::new();
                if self.policy.contains(Policy::WHITESPACE_START_AKE) && self.ake_is_idle() {
                    if let Some(version) = self.pick_version(&versions) {
                        outbound = self.begin_ake(version);
                    }
                }
                if self.policy.contains(Policy::REQUIRE_ENCRYPTION) {
                    debug!("plaintext received while REQUIRE_ENCRYPTION is set");
                }
                Ok((Some(stripped), outbound))
            }
            Classified::Plaintext(text) => {
                if self.policy.contains(Policy::REQUIRE_ENCRYPTION) {
                    debug!("plaintext received while REQUIRE_ENCRYPTION is set");
                }
                Ok((Some(text.to_vec()), Vec::new()))
            }
            Classified::NotOtr => Ok((Some(bytes.to_vec()), Vec::new())),
        }
    }

    #[instrument(skip(self, plaintext))]
    pub fn send(&mut self, plaintext: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
        match self.state {
            MessageState::Finished => Err(Error::StateError),
            MessageState::Plaintext => {
                let out = if self.policy.contains(Policy::SEND_WHITESPACE_TAG) && !self.whitespace_tag_sent {
                    self.whitespace_tag_sent = true;
                    whitespace::append_tag(plaintext, &self.advertised_versions())
                } else {
                    plaintext.to_vec()
                };
                Ok(vec![out])
            }
            MessageState::Encrypted => {
                let version = self.version.ok_or(Error::StateError)?;
                let exponent_bits = VersionCapabilities::for_version(version).map(|c| c.exponent_bits).unwrap_or(1536);
                let keys = self.keys.as_mut().ok_or(Error::StateError)?;
                let bytes = data_message::encrypt(
                    keys,
                    version,
                    self.our_instance_tag,
                    self.their_instance_tag,
                    plaintext,
                    &[],
                    exponent_bits,
                    &mut self.rng,
                )?;
                Ok(self.fragment_outbound(vec![bytes]))
            }
        }
    }

    /// Produce a disconnect-TLV data message (if ENCRYPTED) and transition
    /// to PLAINTEXT.
    pub fn end(&mut self) -> Result<Vec<Vec<u8>>, Error> {
        if self.state != MessageState::Encrypted {
            self.state = MessageState::Plaintext;
            return Ok(Vec::new());
        }
        let version = self.version.ok_or(Error::StateError)?;
        let exponent_bits = VersionCapabilities::for_version(version).map(|c| c.exponent_bits).unwrap_or(1536);
        let keys = self.keys.as_mut().ok_or(Error::StateError)?;
        let bytes = data_message::encrypt(
            keys,
            version,
            self.our_instance_tag,
            self.their_instance_tag,
            b"",
            &[Tlv::disconnect()],
            exponent_bits,
            &mut self.rng,
        )?;
        self.state = MessageState::Plaintext;
        Ok(self.fragment_outbound(vec![bytes]))
    }

    /// An empty data message (spec.md §4.5 step 6 / §4 glossary): its sole
    /// purpose is advancing the DH ratchet in reply to a received message,
    /// not carrying content.
    fn send_heartbeat(&mut self) -> Result<Vec<Vec<u8>>, Error> {
        let version = self.version.ok_or(Error::StateError)?;
        let exponent_bits = VersionCapabilities::for_version(version).map(|c| c.exponent_bits).unwrap_or(1536);
        let keys = self.keys.as_mut().ok_or(Error::StateError)?;
        let bytes = data_message::encrypt(
            keys,
            version,
            self.our_instance_tag,
            self.their_instance_tag,
            b"",
            &[],
            exponent_bits,
            &mut self.rng,
        )?;
        Ok(self.fragment_outbound(vec![bytes]))
    }

    fn ake_is_idle(&self) -> bool {
        self.ake.state == crate::ake::State::None
    }

    fn advertised_versions(&self) -> Vec<u16> {
        let mut versions = Vec::new();
        if self.policy.allows_version(2) {
            versions.push(2);
        }
        if self.policy.allows_version(3) {
            versions.push(3);
        }
        versions
    }

    fn pick_version(&self, offered: &[u16]) -> Option<u16> {
        offered.iter().copied().filter(|v| self.policy.allows_version(*v)).max()
    }

    fn classify<'a>(&self, bytes: &'a [u8]) -> Classified<'a> {
        if let Ok(text) = std::str::from_utf8(bytes) {
            if let Some(rest) = text.strip_prefix(ERROR_PREFIX) {
                return Classified::Error(rest.trim_start());
            }
            if text.starts_with(FRAGMENT_PREFIX) || text.starts_with(FRAGMENT_PREFIX_V3) {
                return Classified::Fragment(text);
            }
            if text.starts_with(QUERY_PREFIX) {
                if let Some(after) = text.strip_prefix("?OTR") {
                    if after.starts_with('?') || after.starts_with('v') {
                        return Classified::Query(text);
                    }
                }
            }
            if let Some(body) = text.strip_prefix(ENCODED_PREFIX) {
                if let Some(body) = body.strip_suffix(ENCODED_SUFFIX) {
                    if let Ok(decoded) = STANDARD.decode(body) {
                        return Classified::Encoded(decoded);
                    }
                }
            }
            if let Some((versions, stripped)) = whitespace::detect(bytes) {
                return Classified::TaggedPlaintext(versions, stripped);
            }
            return Classified::Plaintext(bytes);
        }
        Classified::NotOtr
    }

    fn receive_fragment(&mut self, text: &str) -> Result<Option<Vec<u8>>, Error> {
        let (k, n, sender_tag, receiver_tag, payload) = parse_fragment(text).ok_or_else(|| Error::MalformedMessage("unparseable fragment envelope".into()))?;
        if receiver_tag != 0 && receiver_tag != self.our_instance_tag {
            return Err(Error::WrongInstanceTag);
        }
        self.their_instance_tag = sender_tag.max(self.their_instance_tag);
        Ok(self.fragctx.receive(k, n, payload.as_bytes()))
    }

    fn dispatch_encoded(&mut self, decoded: &[u8]) -> Result<(Option<Vec<u8>>, Vec<Vec<u8>>), Error> {
        if decoded.len() < 3 {
            return Err(Error::MalformedMessage("encoded message too short for a header".into()));
        }
        let version = u16::from_be_bytes([decoded[0], decoded[1]]);
        if !self.policy.allows_version(version) {
            debug!(version, "discarding message for disallowed protocol version");
            return Ok((None, Vec::new()));
        }
        let message_type = decoded[2];

        if version == 3 {
            if decoded.len() < 11 {
                return Err(Error::MalformedMessage("v3 header truncated".into()));
            }
            let receiver_tag = u32::from_be_bytes(decoded[7..11].try_into().unwrap());
            if receiver_tag != 0 && receiver_tag != self.our_instance_tag {
                return Err(Error::WrongInstanceTag);
            }
            let sender_tag = u32::from_be_bytes(decoded[3..7].try_into().unwrap());
            self.their_instance_tag = sender_tag;
        }

        match message_type {
            MSG_TYPE_DH_COMMIT => {
                let msg = DhCommit::parse(decoded)?;
                self.version = Some(msg.header.version);
                let step = self.ake.on_dh_commit(&msg, self.our_instance_tag, self.their_instance_tag, &mut self.rng)?;
                Ok((None, self.fragment_outbound(step.outbound.into_iter().collect())))
            }
            MSG_TYPE_DH_KEY => {
                let msg = DhKey::parse(decoded)?;
                let step = self.ake.on_dh_key(&msg, &self.our_dsa, &mut self.rng)?;
                self.apply_ake_outcome(step.outcome);
                Ok((None, self.fragment_outbound(step.outbound.into_iter().collect())))
            }
            MSG_TYPE_REVEAL_SIG => {
                let msg = RevealSig::parse(decoded)?;
                let step = self.ake.on_reveal_sig(&msg, &self.our_dsa, &mut self.rng)?;
                self.apply_ake_outcome(step.outcome);
                Ok((None, self.fragment_outbound(step.outbound.into_iter().collect())))
            }
            MSG_TYPE_SIG => {
                let msg = Sig::parse(decoded)?;
                let step = self.ake.on_sig(&msg)?;
                self.apply_ake_outcome(step.outcome);
                Ok((None, Vec::new()))
            }
            MSG_TYPE_DATA => {
                if self.state != MessageState::Encrypted {
                    return Err(Error::UnreadableMessage("data message received outside ENCRYPTED state".into()));
                }
                let msg = DataMessage::parse(decoded)?;
                let keys = self.keys.as_mut().ok_or(Error::StateError)?;
                let decrypted = data_message::decrypt(keys, &msg)?;
                if decrypted.disconnected {
                    self.state = MessageState::Finished;
                    debug!("peer sent disconnect TLV");
                    return Ok((None, Vec::new()));
                }
                let outbound = if !decrypted.plaintext.is_empty() {
                    trace!("replying with a heartbeat to advance the ratchet");
                    self.send_heartbeat()?
                } else {
                    Vec::new()
                };
                let plaintext = if decrypted.plaintext.is_empty() { None } else { Some(decrypted.plaintext) };
                Ok((plaintext, outbound))
            }
            other => Err(Error::MalformedMessage(format!("unknown message type {other:#04x}"))),
        }
    }

    fn apply_ake_outcome(&mut self, outcome: Option<AkeOutcome>) {
        if let Some(AkeOutcome { our_dh, their_dh_pub, ssid, peer_dsa_public }) = outcome {
            self.keys = Some(KeyManagement::from_ake(our_dh, their_dh_pub));
            self.ssid = Some(ssid);
            self.peer_dsa_public = Some(peer_dsa_public);
            self.state = MessageState::Encrypted;
            debug!("AKE completed, conversation is ENCRYPTED");
        }
    }

    fn start_ake_from_query(&mut self, text: &str) -> Result<Vec<Vec<u8>>, Error> {
        let offered = parse_query_versions(text);
        let version = offered.into_iter().filter(|v| self.policy.allows_version(*v)).max().ok_or(Error::WrongVersion)?;
        Ok(self.begin_ake(version))
    }

    fn begin_ake(&mut self, version: u16) -> Vec<Vec<u8>> {
        self.version = Some(version);
        let bytes = self.ake.start(version, self.our_instance_tag, self.their_instance_tag, &mut self.rng);
        self.fragment_outbound(vec![bytes])
    }

    fn fragment_outbound(&self, messages: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        let Some(fragment_size) = self.fragment_size else {
            return messages.into_iter().map(|m| wrap_encoded(&m)).collect();
        };
        let Some(version) = self.version else {
            return messages.into_iter().map(|m| wrap_encoded(&m)).collect();
        };
        let Some(caps) = VersionCapabilities::for_version(version) else {
            return messages.into_iter().map(|m| wrap_encoded(&m)).collect();
        };
        messages
            .into_iter()
            .flat_map(|m| {
                let envelope = wrap_encoded(&m);
                let payload = std::str::from_utf8(&envelope).expect("base64 envelope is ASCII");
                fragment::split(payload, fragment_size, &caps, self.our_instance_tag, self.their_instance_tag)
                    .into_iter()
                    .map(|s| s.into_bytes())
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

fn wrap_encoded(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::from(ENCODED_PREFIX.as_bytes());
    out.extend_from_slice(STANDARD.encode(body).as_bytes());
    out.push(b'.');
    out
}

fn random_instance_tag(rng: &mut impl RngCore) -> u32 {
    loop {
        let candidate = rng.next_u32();
        if candidate >= INSTANCE_TAG_MIN {
            return candidate;
        }
    }
}

fn parse_query_versions(text: &str) -> Vec<u16> {
    let mut versions = Vec::new();
    if text.starts_with("?OTR?") {
        versions.push(2);
    }
    if let Some(rest) = text.strip_prefix("?OTRv") {
        for c in rest.chars() {
            if let Some(d) = c.to_digit(10) {
                versions.push(d as u16);
            } else {
                break;
            }
        }
    }
    versions
}

fn parse_fragment(text: &str) -> Option<(u16, u16, u32, u32, String)> {
    let rest = text.strip_prefix(FRAGMENT_PREFIX_V3);
    let (sender_tag, receiver_tag, rest) = if let Some(rest) = rest {
        let mut parts = rest.splitn(3, '|');
        let sender = parts.next()?;
        let receiver_and_rest = parts.next()?;
        let mut receiver_parts = receiver_and_rest.splitn(2, ',');
        let receiver = receiver_parts.next()?;
        let tail = receiver_parts.next()?;
        (u32::from_str_radix(sender, 16).ok()?, u32::from_str_radix(receiver, 16).ok()?, tail)
    } else {
        (0, 0, text.strip_prefix(FRAGMENT_PREFIX)?)
    };
    let mut fields = rest.splitn(3, ',');
    let k: u16 = fields.next()?.parse().ok()?;
    let n: u16 = fields.next()?.parse().ok()?;
    let tail = fields.next()?;
    let payload = tail.strip_suffix(',')?;
    Some((k, n, sender_tag, receiver_tag, payload.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_conversation() -> Conversation {
        let mut rng = rand::thread_rng();
        let dsa = DsaKeyPair::generate(&mut rng);
        Conversation::new(ConversationConfig::default(), dsa)
    }

    #[test]
    fn query_message_reflects_policy() {
        let convo = new_conversation();
        assert_eq!(convo.query_message(), "?OTRv23?");
    }

    #[test]
    fn finished_conversation_rejects_send() {
        let mut convo = new_conversation();
        convo.state = MessageState::Finished;
        assert!(convo.send(b"hi").is_err());
    }

    #[test]
    fn plaintext_passes_through_unmodified_without_whitespace_policy() {
        let mut convo = new_conversation();
        convo.policy.remove(Policy::SEND_WHITESPACE_TAG);
        let out = convo.send(b"hello").unwrap();
        assert_eq!(out, vec![b"hello".to_vec()]);
    }

    #[test]
    fn fragment_envelope_round_trips_through_reassembly() {
        let text = "?OTR|101|202,1,2,AAAA,";
        let parsed = parse_fragment(text).unwrap();
        assert_eq!(parsed, (1, 2, 0x101, 0x202, "AAAA".to_string()));
    }
}
