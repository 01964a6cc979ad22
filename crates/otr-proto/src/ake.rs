//! AKE message shapes: DH-Commit, DH-Key, Reveal-Signature, Signature, per
//! spec.md §4.3. These structs carry wire bytes only — encryption,
//! decryption, and MAC verification are driven by the AKE state machine,
//! which holds the derived keys these messages don't.

use crate::error::ProtoError;
use crate::header::{Header, MSG_TYPE_DH_COMMIT, MSG_TYPE_DH_KEY, MSG_TYPE_REVEAL_SIG, MSG_TYPE_SIG};
use crate::wire::{write_data, write_mpi, Reader};
use num_bigint::BigUint;

#[derive(Debug, Clone)]
pub struct DhCommit {
    pub header: Header,
    /// AES-128-CTR(r, MPI(g^x)) — the encrypted commitment to our public value.
    pub encrypted_gx: Vec<u8>,
    /// SHA-256(MPI(g^x)) — the hash used for tie-breaking.
    pub hashed_gx: [u8; 32],
}

impl DhCommit {
    pub fn build(version: u16, sender_tag: u32, receiver_tag: u32, encrypted_gx: Vec<u8>, hashed_gx: [u8; 32]) -> Vec<u8> {
        let header = if version == 3 { Header::v3(MSG_TYPE_DH_COMMIT, sender_tag, receiver_tag) } else { Header::v2(MSG_TYPE_DH_COMMIT) };
        let mut out = Vec::new();
        header.write(&mut out);
        write_data(&mut out, &encrypted_gx);
        write_data(&mut out, &hashed_gx);
        out
    }

    pub fn parse(buf: &[u8]) -> Result<Self, ProtoError> {
        let mut r = Reader::new(buf);
        let header = Header::parse(&mut r)?;
        let encrypted_gx = r.read_data()?.to_vec();
        let hashed_slice = r.read_data()?;
        r.finish()?;
        let mut hashed_gx = [0u8; 32];
        if hashed_slice.len() != 32 {
            return Err(ProtoError::TooShort { needed: 32, have: hashed_slice.len() });
        }
        hashed_gx.copy_from_slice(hashed_slice);
        Ok(Self { header, encrypted_gx, hashed_gx })
    }
}

#[derive(Debug, Clone)]
pub struct DhKey {
    pub header: Header,
    pub gy: BigUint,
}

impl DhKey {
    pub fn build(version: u16, sender_tag: u32, receiver_tag: u32, gy: &BigUint) -> Vec<u8> {
        let header = if version == 3 { Header::v3(MSG_TYPE_DH_KEY, sender_tag, receiver_tag) } else { Header::v2(MSG_TYPE_DH_KEY) };
        let mut out = Vec::new();
        header.write(&mut out);
        write_mpi(&mut out, gy);
        out
    }

    pub fn parse(buf: &[u8]) -> Result<Self, ProtoError> {
        let mut r = Reader::new(buf);
        let header = Header::parse(&mut r)?;
        let gy = r.read_mpi()?;
        r.finish()?;
        Ok(Self { header, gy })
    }
}

#[derive(Debug, Clone)]
pub struct RevealSig {
    pub header: Header,
    /// The revealed AES key `r` that decrypts the peer's DH-Commit.
    pub r: Vec<u8>,
    /// AES-128-CTR(c, sig_payload).
    pub encrypted_sig: Vec<u8>,
    /// MAC_SHA1-160(m2, DATA(r) ‖ DATA(encrypted_sig)).
    pub mac: [u8; 20],
}

impl RevealSig {
    pub fn authenticated_prefix(r: &[u8], encrypted_sig: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_data(&mut out, r);
        write_data(&mut out, encrypted_sig);
        out
    }

    pub fn build(version: u16, sender_tag: u32, receiver_tag: u32, r: &[u8], encrypted_sig: &[u8], mac: [u8; 20]) -> Vec<u8> {
        let header = if version == 3 { Header::v3(MSG_TYPE_REVEAL_SIG, sender_tag, receiver_tag) } else { Header::v2(MSG_TYPE_REVEAL_SIG) };
        let mut out = Vec::new();
        header.write(&mut out);
        out.extend_from_slice(&Self::authenticated_prefix(r, encrypted_sig));
        out.extend_from_slice(&mac);
        out
    }

    pub fn parse(buf: &[u8]) -> Result<Self, ProtoError> {
        let mut reader = Reader::new(buf);
        let header = Header::parse(&mut reader)?;
        let r = reader.read_data()?.to_vec();
        let encrypted_sig = reader.read_data()?.to_vec();
        let mac_slice = reader.read_exact(20)?;
        reader.finish()?;
        let mut mac = [0u8; 20];
        mac.copy_from_slice(mac_slice);
        Ok(Self { header, r, encrypted_sig, mac })
    }
}

#[derive(Debug, Clone)]
pub struct Sig {
    pub header: Header,
    pub encrypted_sig: Vec<u8>,
    /// MAC_SHA1-160(m2', DATA(encrypted_sig)).
    pub mac: [u8; 20],
}

impl Sig {
    pub fn authenticated_prefix(encrypted_sig: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_data(&mut out, encrypted_sig);
        out
    }

    pub fn build(version: u16, sender_tag: u32, receiver_tag: u32, encrypted_sig: &[u8], mac: [u8; 20]) -> Vec<u8> {
        let header = if version == 3 { Header::v3(MSG_TYPE_SIG, sender_tag, receiver_tag) } else { Header::v2(MSG_TYPE_SIG) };
        let mut out = Vec::new();
        header.write(&mut out);
        out.extend_from_slice(&Self::authenticated_prefix(encrypted_sig));
        out.extend_from_slice(&mac);
        out
    }

    pub fn parse(buf: &[u8]) -> Result<Self, ProtoError> {
        let mut reader = Reader::new(buf);
        let header = Header::parse(&mut reader)?;
        let encrypted_sig = reader.read_data()?.to_vec();
        let mac_slice = reader.read_exact(20)?;
        reader.finish()?;
        let mut mac = [0u8; 20];
        mac.copy_from_slice(mac_slice);
        Ok(Self { header, encrypted_sig, mac })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn dh_commit_roundtrip() {
        let bytes = DhCommit::build(3, 0x101, 0x202, vec![1, 2, 3, 4], [9u8; 32]);
        let parsed = DhCommit::parse(&bytes).unwrap();
        assert_eq!(parsed.encrypted_gx, vec![1, 2, 3, 4]);
        assert_eq!(parsed.hashed_gx, [9u8; 32]);
        assert_eq!(parsed.header.version, 3);
    }

    #[test]
    fn dh_key_roundtrip() {
        let gy = BigUint::from_u64(987654321).unwrap();
        let bytes = DhKey::build(3, 0x101, 0x202, &gy);
        let parsed = DhKey::parse(&bytes).unwrap();
        assert_eq!(parsed.gy, gy);
    }

    #[test]
    fn reveal_sig_roundtrip() {
        let r = vec![0xAAu8; 16];
        let enc = vec![0xBBu8; 40];
        let mac = [0xCCu8; 20];
        let bytes = RevealSig::build(3, 1, 2, &r, &enc, mac);
        let parsed = RevealSig::parse(&bytes).unwrap();
        assert_eq!(parsed.r, r);
        assert_eq!(parsed.encrypted_sig, enc);
        assert_eq!(parsed.mac, mac);
    }

    #[test]
    fn sig_roundtrip() {
        let enc = vec![0xDDu8; 40];
        let mac = [0xEEu8; 20];
        let bytes = Sig::build(3, 1, 2, &enc, mac);
        let parsed = Sig::parse(&bytes).unwrap();
        assert_eq!(parsed.encrypted_sig, enc);
        assert_eq!(parsed.mac, mac);
    }
}
