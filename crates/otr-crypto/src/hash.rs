//! Hash and HMAC primitives: SHA-256 for AKE-bound key derivation and
//! whitespace-tag material, SHA-1 for data-message MAC (HMAC-SHA1) and
//! fingerprint computation, per spec.md §4.2.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};

pub fn sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// The full HMAC-SHA1 tag (SHA-1's output is already 160 bits), named to
/// match spec.md's `MAC_SHA1-160` notation.
pub fn hmac_sha1_160(key: &[u8], data: &[u8]) -> [u8; 20] {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

pub fn verify_hmac_sha1_160(key: &[u8], data: &[u8], expected: &[u8]) -> bool {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.verify_slice(expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha1_verifies() {
        let key = b"session mac key";
        let data = b"data message prefix bytes";
        let tag = hmac_sha1_160(key, data);
        assert!(verify_hmac_sha1_160(key, data, &tag));
    }

    #[test]
    fn hmac_sha1_rejects_tampered_data() {
        let key = b"session mac key";
        let tag = hmac_sha1_160(key, b"original");
        assert!(!verify_hmac_sha1_160(key, b"tampered", &tag));
    }
}
