use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("buffer too short: needed at least {needed} bytes, have {have}")]
    TooShort { needed: usize, have: usize },

    #[error("unknown message type byte: 0x{0:02x}")]
    UnknownMessageType(u8),

    #[error("unknown TLV type: 0x{0:04x}")]
    UnknownTlvType(u16),

    #[error("trailing bytes after parsing a fixed-shape message")]
    TrailingBytes,

    #[error(transparent)]
    Crypto(#[from] otr_crypto::CryptoError),
}
