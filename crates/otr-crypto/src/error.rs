use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("DH public value out of range [2, p-2]")]
    DhValueOutOfRange,

    #[error("DSA signature verification failed")]
    SignatureVerification,

    #[error("DSA key generation failed: {0}")]
    KeyGeneration(String),

    #[error("DSA public key is malformed: {0}")]
    InvalidPublicKey(String),

    #[error("AES-CTR operation failed: {0}")]
    CipherFailure(String),

    #[error("HMAC authentication failed")]
    MacMismatch,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
