//! The top-level error type, distinguishing the host-facing outcomes of
//! spec.md §7 as explicit variants rather than collapsing them — hosts
//! branch on these (drop silently, notify, reset AKE, surface to caller).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("unreadable message: {0}")]
    UnreadableMessage(String),

    #[error("protocol version not enabled by policy")]
    WrongVersion,

    #[error("receiver instance tag does not match ours")]
    WrongInstanceTag,

    #[error("handshake failed: {0}")]
    HandshakeFailure(String),

    #[error("operation not valid in the current conversation state")]
    StateError,

    #[error(transparent)]
    Proto(#[from] otr_proto::ProtoError),

    #[error(transparent)]
    Crypto(#[from] otr_crypto::CryptoError),
}
