//! Key derivation for the AKE: deriving `c`/`c'`/`m1`/`m1'`/`m2`/`m2'` from
//! the DH shared secret `s`, per spec.md §3/§4.3.
//!
//! OTR's `h2(b) = SHA-256(byte(b) || MPI(s))` construction: a single SHA-256
//! call per derived value, domain-separated by a leading tag byte.

use crate::hash::sha256;
use num_bigint::BigUint;
use zeroize::Zeroize;

/// The six values derived from the AKE shared secret. `c`/`c'` are AES-128
/// keys (16 bytes); `m1`/`m1'`/`m2`/`m2'` are HMAC keys (32 bytes, truncated
/// to whatever the MAC needs at use time).
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct AkeKeys {
    pub c: [u8; 16],
    pub c_prime: [u8; 16],
    pub m1: [u8; 32],
    pub m2: [u8; 32],
    pub m1_prime: [u8; 32],
    pub m2_prime: [u8; 32],
}

fn h2(tag: u8, secbytes: &[u8]) -> [u8; 32] {
    let mut input = Vec::with_capacity(1 + secbytes.len());
    input.push(tag);
    input.extend_from_slice(secbytes);
    sha256(&input)
}

fn mpi_bytes(s: &BigUint) -> Vec<u8> {
    let payload = s.to_bytes_be();
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    out
}

pub fn derive_ake_keys(shared_secret: &BigUint) -> AkeKeys {
    let secbytes = mpi_bytes(shared_secret);
    let h1 = h2(0x01, &secbytes);
    let mut c = [0u8; 16];
    let mut c_prime = [0u8; 16];
    c.copy_from_slice(&h1[..16]);
    c_prime.copy_from_slice(&h1[16..]);
    let m1 = h2(0x02, &secbytes);
    let m2 = h2(0x03, &secbytes);
    let m1_prime = h2(0x04, &secbytes);
    let m2_prime = h2(0x05, &secbytes);
    AkeKeys { c, c_prime, m1, m2, m1_prime, m2_prime }
}

/// The `ssid`: first 8 bytes of `h2(0x00, secbytes)`, used for the
/// human-comparison session id (spec.md GLOSSARY).
pub fn derive_ssid(shared_secret: &BigUint) -> [u8; 8] {
    let secbytes = mpi_bytes(shared_secret);
    let h0 = h2(0x00, &secbytes);
    let mut ssid = [0u8; 8];
    ssid.copy_from_slice(&h0[..8]);
    ssid
}

/// Per-keyID session keys derived from a fresh DH shared secret during the
/// data-message ratchet (spec.md §4.5 step 2): distinct AES/MAC keys for
/// each direction, both derived from the same `s` with direction-tagged
/// domain separation.
#[derive(Clone)]
pub struct SessionKeys {
    pub sending_aes: [u8; 16],
    pub sending_mac: [u8; 20],
    pub receiving_aes: [u8; 16],
    pub receiving_mac: [u8; 20],
}

pub fn derive_session_keys(shared_secret: &BigUint, we_are_lower: bool) -> SessionKeys {
    let secbytes = mpi_bytes(shared_secret);
    let (send_tag, recv_tag) = if we_are_lower { (0x01u8, 0x02u8) } else { (0x02u8, 0x01u8) };
    let send_seed = h2(send_tag, &secbytes);
    let recv_seed = h2(recv_tag, &secbytes);

    let mut sending_aes = [0u8; 16];
    sending_aes.copy_from_slice(&send_seed[..16]);
    let sending_mac = sha256(&sending_aes);
    let mut sending_mac20 = [0u8; 20];
    sending_mac20.copy_from_slice(&sending_mac[..20]);

    let mut receiving_aes = [0u8; 16];
    receiving_aes.copy_from_slice(&recv_seed[..16]);
    let receiving_mac = sha256(&receiving_aes);
    let mut receiving_mac20 = [0u8; 20];
    receiving_mac20.copy_from_slice(&receiving_mac[..20]);

    SessionKeys {
        sending_aes,
        sending_mac: sending_mac20,
        receiving_aes,
        receiving_mac: receiving_mac20,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn ake_keys_are_deterministic() {
        let s = BigUint::from_u64(123456789).unwrap();
        let a = derive_ake_keys(&s);
        let b = derive_ake_keys(&s);
        assert_eq!(a.c, b.c);
        assert_eq!(a.m1, b.m1);
    }

    #[test]
    fn session_keys_differ_by_direction() {
        let s = BigUint::from_u64(42).unwrap();
        let alice = derive_session_keys(&s, true);
        let bob = derive_session_keys(&s, false);
        assert_eq!(alice.sending_aes, bob.receiving_aes);
        assert_eq!(alice.receiving_aes, bob.sending_aes);
    }
}
