//! The OTR Diffie-Hellman group: the 1536-bit Oakley group 5 MODP prime
//! (RFC 3526 §4) with generator 2.

use crate::error::CryptoError;
use num_bigint::BigUint;
use num_traits::{FromPrimitive, One};
use rand::RngCore;
use zeroize::Zeroizing;

const MODULUS_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD",
    "129024E088A67CC74020BBEA63B139B22514A08798E3404",
    "DDEF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C",
    "245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B",
    "7EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE4",
    "5B3DC2007CB8A163BF0598DA48361C55D39A69163FA8FD2",
    "4CF5F83655D23DCA3AD961C62F356208552BB9ED529077",
    "096966D670C354E4ABC9804F1746C08CA237327FFFFFFFF",
    "FFFFFFFF",
);

/// Draw the DH modulus. Parsed lazily on every call rather than cached in
/// a `once_cell` to keep this crate free of that dependency; `BigUint`
/// parsing of a fixed 1536-bit constant is cheap relative to any DH
/// operation that follows.
pub fn modulus() -> BigUint {
    BigUint::parse_bytes(MODULUS_HEX.as_bytes(), 16).expect("OTR DH modulus is a valid hex literal")
}

pub fn generator() -> BigUint {
    BigUint::from_u8(2).unwrap()
}

/// `2 <= value <= p - 2`, the range check spec.md §4.2 requires of every
/// received DH public value.
pub fn validate_public_value(value: &BigUint) -> Result<(), CryptoError> {
    let p = modulus();
    let two = BigUint::from_u8(2).unwrap();
    let p_minus_2 = &p - &two;
    if *value < two || *value > p_minus_2 {
        return Err(CryptoError::DhValueOutOfRange);
    }
    Ok(())
}

/// An ephemeral DH key pair. The private exponent is zeroized on drop;
/// callers must not retain `secret_bytes()` beyond the AKE step that needs
/// it.
pub struct DhKeyPair {
    secret: Zeroizing<BigUint>,
    public: BigUint,
}

impl DhKeyPair {
    /// `exponent_bits` is 320 for OTRv2, 1536 for OTRv3 (spec.md §4.2); the
    /// caller selects it from the negotiated version's capability record.
    pub fn generate<R: RngCore>(rng: &mut R, exponent_bits: usize) -> Self {
        let byte_len = (exponent_bits + 7) / 8;
        let mut buf = vec![0u8; byte_len];
        rng.fill_bytes(&mut buf);
        let secret = Zeroizing::new(BigUint::from_bytes_be(&buf) | BigUint::one());
        let public = generator().modpow(&secret, &modulus());
        Self { secret, public }
    }

    pub fn public(&self) -> &BigUint {
        &self.public
    }

    pub fn secret(&self) -> &BigUint {
        &self.secret
    }

    /// The shared secret `s = peer_public^our_secret mod p`, after
    /// validating `peer_public` is in range.
    pub fn shared_secret(&self, peer_public: &BigUint) -> Result<BigUint, CryptoError> {
        validate_public_value(peer_public)?;
        Ok(peer_public.modpow(&self.secret, &modulus()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_public_value_is_in_range() {
        let mut rng = rand::thread_rng();
        let pair = DhKeyPair::generate(&mut rng, 320);
        assert!(validate_public_value(pair.public()).is_ok());
    }

    #[test]
    fn shared_secret_agrees() {
        let mut rng = rand::thread_rng();
        let alice = DhKeyPair::generate(&mut rng, 1536);
        let bob = DhKeyPair::generate(&mut rng, 1536);
        let s1 = alice.shared_secret(bob.public()).unwrap();
        let s2 = bob.shared_secret(alice.public()).unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn rejects_out_of_range_value() {
        assert!(validate_public_value(&BigUint::from_u8(1).unwrap()).is_err());
        assert!(validate_public_value(&(modulus() - BigUint::one())).is_err());
    }
}
