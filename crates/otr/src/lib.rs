//! A per-peer OTR (Off-the-Record Messaging) v2/3 conversation endpoint:
//! the AKE state machine, message router, data-message encryption
//! pipeline, and fragmentation layer. Entirely passive with respect to
//! I/O — the host owns the transport, persistent key storage, and timers.

pub mod ake;
pub mod conversation;
pub mod data_message;
pub mod error;
pub mod fragment;
pub mod keys;
pub mod policy;
pub mod version;
pub mod whitespace;

pub use conversation::{Conversation, MessageState};
pub use error::Error;
pub use policy::{ConversationConfig, Policy};

pub use otr_crypto::dsa::{DsaKeyPair, DsaPublicKey};
