//! AES-128-CTR with OTR's counter convention: the 16-byte counter is an
//! 8-byte "top half" that is transmitted on the wire and an 8-byte
//! "bottom half" that is always zero (spec.md §4.2).

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Encrypt (or decrypt — CTR mode is its own inverse) `data` in place under
/// `key` with the counter's top half set to `counter_top`.
pub fn apply_keystream(key: &[u8; 16], counter_top: [u8; 8], data: &mut [u8]) {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&counter_top);
    let mut cipher = Aes128Ctr::new(key.into(), &iv.into());
    cipher.apply_keystream(data);
}

pub fn encrypt(key: &[u8; 16], counter_top: [u8; 8], plaintext: &[u8]) -> Vec<u8> {
    let mut buf = plaintext.to_vec();
    apply_keystream(key, counter_top, &mut buf);
    buf
}

pub fn decrypt(key: &[u8; 16], counter_top: [u8; 8], ciphertext: &[u8]) -> Vec<u8> {
    encrypt(key, counter_top, ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [0x42u8; 16];
        let counter = [0u8; 8];
        let plaintext = b"g^x MPI bytes go here";
        let ciphertext = encrypt(&key, counter, plaintext);
        assert_ne!(ciphertext, plaintext);
        let recovered = decrypt(&key, counter, &ciphertext);
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn different_counters_yield_different_ciphertext() {
        let key = [0x01u8; 16];
        let plaintext = b"same plaintext bytes";
        let c1 = encrypt(&key, [0u8; 8], plaintext);
        let c2 = encrypt(&key, [0, 0, 0, 0, 0, 0, 0, 1], plaintext);
        assert_ne!(c1, c2);
    }
}
