//! DSA-1024 signing/verification with the fixed-width `(r‖s)` encoding OTR
//! uses instead of DER. Implemented directly over `num-bigint` rather than
//! pulling in a signature crate: OTR signs a value that is already the
//! truncated output of an HMAC, not a message run through the signer's own
//! hash, so the usual `Signer`/`Digest` split doesn't fit — the raw
//! modular-arithmetic operations spec.md's design notes call for are the
//! natural fit here.

use crate::error::CryptoError;
use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::RngCore;
use zeroize::Zeroizing;

/// Bit length of `q`, the DSA subgroup order — fixed at 160 for DSA-1024.
const Q_BITS: usize = 160;

#[derive(Clone, PartialEq, Eq)]
pub struct DsaPublicKey {
    pub p: BigUint,
    pub q: BigUint,
    pub g: BigUint,
    pub y: BigUint,
}

pub struct DsaKeyPair {
    pub public: DsaPublicKey,
    x: Zeroizing<BigUint>,
}

impl DsaPublicKey {
    /// OTR's DSA pubkey wire type: `0x0000` ‖ MPI(p) ‖ MPI(q) ‖ MPI(g) ‖ MPI(y).
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0u16.to_be_bytes());
        for component in [&self.p, &self.q, &self.g, &self.y] {
            write_mpi(&mut out, component);
        }
        out
    }

    pub fn parse(buf: &[u8]) -> Result<(Self, usize), CryptoError> {
        if buf.len() < 2 {
            return Err(CryptoError::InvalidPublicKey("buffer too short for key type".into()));
        }
        let key_type = u16::from_be_bytes([buf[0], buf[1]]);
        if key_type != 0 {
            return Err(CryptoError::InvalidPublicKey(format!("unknown key type {key_type}")));
        }
        let mut offset = 2;
        let mut read_next = || -> Result<BigUint, CryptoError> {
            let (value, consumed) = read_mpi(&buf[offset..])?;
            offset += consumed;
            Ok(value)
        };
        let p = read_next()?;
        let q = read_next()?;
        let g = read_next()?;
        let y = read_next()?;
        Ok((Self { p, q, g, y }, offset))
    }

    /// SHA-1 fingerprint of the serialized public key, minus the 2-byte
    /// type prefix, per the original implementation's convention.
    pub fn fingerprint(&self) -> [u8; 20] {
        let full = self.serialize();
        crate::hash::sha1(&full[2..])
    }

    pub fn verify(&self, message_hash: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        if signature.len() != 40 {
            return Err(CryptoError::InvalidPublicKey("DSA signature is not 40 bytes".into()));
        }
        let r = BigUint::from_bytes_be(&signature[..20]);
        let s = BigUint::from_bytes_be(&signature[20..]);
        if r.is_zero() || s.is_zero() || r >= self.q || s >= self.q {
            return Err(CryptoError::SignatureVerification);
        }
        let w = mod_inverse(&s, &self.q).ok_or(CryptoError::SignatureVerification)?;
        let z = truncate_to_q(message_hash, &self.q);
        let u1 = (&z * &w) % &self.q;
        let u2 = (&r * &w) % &self.q;
        let v = ((self.g.modpow(&u1, &self.p) * self.y.modpow(&u2, &self.p)) % &self.p) % &self.q;
        if v == r {
            Ok(())
        } else {
            Err(CryptoError::SignatureVerification)
        }
    }
}

impl DsaKeyPair {
    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        let q = random_prime_bits(rng, Q_BITS);
        let p = derive_group_prime(rng, &q);
        let g = find_generator(&p, &q);
        let x = Zeroizing::new(random_below(rng, &q));
        let y = g.modpow(&x, &p);
        Self {
            public: DsaPublicKey { p, q, g, y },
            x,
        }
    }

    pub fn public(&self) -> &DsaPublicKey {
        &self.public
    }

    /// Sign `message_hash` (already hashed/truncated by the caller per
    /// spec.md §4.3's `sig_payload` construction), producing the fixed
    /// 40-byte `(r‖s)` encoding.
    pub fn sign<R: RngCore>(&self, rng: &mut R, message_hash: &[u8]) -> Vec<u8> {
        let DsaPublicKey { p, q, g, .. } = &self.public;
        let z = truncate_to_q(message_hash, q);
        loop {
            let k = random_below(rng, q);
            if k.is_zero() {
                continue;
            }
            let r = g.modpow(&k, p) % q;
            if r.is_zero() {
                continue;
            }
            let k_inv = match mod_inverse(&k, q) {
                Some(v) => v,
                None => continue,
            };
            let s = (&k_inv * (&z + &r * &self.x)) % q;
            if s.is_zero() {
                continue;
            }
            let mut out = Vec::with_capacity(40);
            out.extend_from_slice(&left_pad(&r.to_bytes_be(), 20));
            out.extend_from_slice(&left_pad(&s.to_bytes_be(), 20));
            return out;
        }
    }
}

fn truncate_to_q(hash: &[u8], q: &BigUint) -> BigUint {
    let q_bytes = (q.bits() as usize + 7) / 8;
    let slice = if hash.len() > q_bytes { &hash[..q_bytes] } else { hash };
    BigUint::from_bytes_be(slice)
}

fn left_pad(bytes: &[u8], len: usize) -> Vec<u8> {
    if bytes.len() >= len {
        return bytes[bytes.len() - len..].to_vec();
    }
    let mut out = vec![0u8; len - bytes.len()];
    out.extend_from_slice(bytes);
    out
}

fn mod_inverse(value: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    let (g, x, _) = extended_gcd(&value.clone().into(), &modulus.clone().into());
    if g != num_bigint::BigInt::one() {
        return None;
    }
    let m = num_bigint::BigInt::from(modulus.clone());
    let result = ((x % &m) + &m) % &m;
    result.to_biguint()
}

fn extended_gcd(
    a: &num_bigint::BigInt,
    b: &num_bigint::BigInt,
) -> (num_bigint::BigInt, num_bigint::BigInt, num_bigint::BigInt) {
    if b.is_zero() {
        return (a.clone(), num_bigint::BigInt::one(), num_bigint::BigInt::zero());
    }
    let (g, x1, y1) = extended_gcd(b, &(a.mod_floor(b)));
    let q = a.div_floor(b);
    (g, y1.clone(), x1 - &q * &y1)
}

fn random_below<R: RngCore>(rng: &mut R, bound: &BigUint) -> BigUint {
    let bits = bound.bits() as usize;
    loop {
        let candidate = random_bits(rng, bits);
        if candidate < *bound {
            return candidate;
        }
    }
}

fn random_bits<R: RngCore>(rng: &mut R, bits: usize) -> BigUint {
    let byte_len = (bits + 7) / 8;
    let mut buf = vec![0u8; byte_len];
    rng.fill_bytes(&mut buf);
    let excess = byte_len * 8 - bits;
    if excess > 0 {
        buf[0] &= 0xFFu8 >> excess;
    }
    BigUint::from_bytes_be(&buf)
}

fn random_prime_bits<R: RngCore>(rng: &mut R, bits: usize) -> BigUint {
    loop {
        let mut candidate = random_bits(rng, bits) | BigUint::one();
        candidate.set_bit((bits - 1) as u64, true);
        if is_probably_prime(&candidate) {
            return candidate;
        }
    }
}

/// Derive a 1024-bit prime `p` such that `q` divides `p - 1`, the classic
/// DSA domain-parameter construction (FIPS 186, simplified — this crate
/// does not implement the full seeded-prime-generation verification
/// procedure, only parameter generation for fresh keys).
fn derive_group_prime<R: RngCore>(rng: &mut R, q: &BigUint) -> BigUint {
    loop {
        let x = random_bits(rng, 1024 - Q_BITS);
        let candidate = &x * q + BigUint::one();
        if candidate.bits() == 1024 && is_probably_prime(&candidate) {
            return candidate;
        }
    }
}

fn find_generator(p: &BigUint, q: &BigUint) -> BigUint {
    let e = (p - BigUint::one()) / q;
    let mut h = BigUint::from(2u8);
    loop {
        let g = h.modpow(&e, p);
        if g > BigUint::one() {
            return g;
        }
        h += BigUint::one();
    }
}

fn is_probably_prime(n: &BigUint) -> bool {
    if *n < BigUint::from(2u8) {
        return false;
    }
    let small_primes: [u32; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    for p in small_primes {
        let p = BigUint::from(p);
        if *n == p {
            return true;
        }
        if (n % &p).is_zero() {
            return false;
        }
    }
    miller_rabin(n, 20)
}

fn miller_rabin(n: &BigUint, rounds: u32) -> bool {
    let one = BigUint::one();
    let two = BigUint::from(2u8);
    let n_minus_one = n - &one;
    let mut d = n_minus_one.clone();
    let mut r = 0u32;
    while (&d % &two).is_zero() {
        d /= &two;
        r += 1;
    }
    let mut rng = rand::thread_rng();
    'witness: for _ in 0..rounds {
        let a = random_below(&mut rng, &(n - &two)) + &two;
        let mut x = a.modpow(&d, n);
        if x == one || x == n_minus_one {
            continue;
        }
        for _ in 0..r.saturating_sub(1) {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

fn write_mpi(out: &mut Vec<u8>, value: &BigUint) {
    let bytes = if value.is_zero() { Vec::new() } else { value.to_bytes_be() };
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&bytes);
}

fn read_mpi(buf: &[u8]) -> Result<(BigUint, usize), CryptoError> {
    if buf.len() < 4 {
        return Err(CryptoError::InvalidPublicKey("MPI length prefix truncated".into()));
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if buf.len() < 4 + len {
        return Err(CryptoError::InvalidPublicKey("MPI payload truncated".into()));
    }
    Ok((BigUint::from_bytes_be(&buf[4..4 + len]), 4 + len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let mut rng = rand::thread_rng();
        let pair = DsaKeyPair::generate(&mut rng);
        let hash = crate::hash::sha256(b"sig_payload bytes");
        let sig = pair.sign(&mut rng, &hash);
        assert_eq!(sig.len(), 40);
        assert!(pair.public().verify(&hash, &sig).is_ok());
    }

    #[test]
    fn rejects_tampered_signature() {
        let mut rng = rand::thread_rng();
        let pair = DsaKeyPair::generate(&mut rng);
        let hash = crate::hash::sha256(b"sig_payload bytes");
        let mut sig = pair.sign(&mut rng, &hash);
        sig[0] ^= 0xFF;
        assert!(pair.public().verify(&hash, &sig).is_err());
    }

    #[test]
    fn pubkey_serialize_roundtrip() {
        let mut rng = rand::thread_rng();
        let pair = DsaKeyPair::generate(&mut rng);
        let bytes = pair.public().serialize();
        let (parsed, consumed) = DsaPublicKey::parse(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed, pair.public);
    }
}
