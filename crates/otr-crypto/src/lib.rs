//! otr-crypto — cryptographic primitives for the OTR v2/3 conversation core
//!
//! # Design principles
//! - No custom cryptography beyond the fixed-width encodings OTR itself
//!   specifies (the 40-byte DSA signature, the half-counter AES-CTR IV);
//!   the underlying primitives come from audited Rust crates.
//! - Ephemeral secret material (`DhKeyPair`, `AkeKeys`) is zeroized on drop.
//!
//! # Module layout
//! - `dh`       — the 1536-bit OTR DH group, key pairs, range validation
//! - `dsa`      — DSA-1024 key pairs, signing, verification, fixed encoding
//! - `hash`     — SHA-1, SHA-256, HMAC-SHA1, HMAC-SHA256
//! - `kdf`      — AKE key derivation (c/c'/m1/m1'/m2/m2', ssid, session keys)
//! - `aes_ctr`  — AES-128-CTR with OTR's half-zero counter convention
//! - `identity` — fingerprint rendering and comparison helpers
//! - `error`    — unified error type

pub mod aes_ctr;
pub mod dh;
pub mod dsa;
pub mod error;
pub mod hash;
pub mod identity;
pub mod kdf;

pub use error::CryptoError;
