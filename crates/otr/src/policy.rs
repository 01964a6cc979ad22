//! Policy flags a host sets on a `Conversation` at construction time, per
//! spec.md §6.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Policy: u8 {
        const ALLOW_V2             = 0b0000_0001;
        const ALLOW_V3             = 0b0000_0010;
        const REQUIRE_ENCRYPTION   = 0b0000_0100;
        const SEND_WHITESPACE_TAG  = 0b0000_1000;
        const WHITESPACE_START_AKE = 0b0001_0000;
        const ERROR_START_AKE      = 0b0010_0000;
    }
}

impl Policy {
    /// `ALLOW_V2 | ALLOW_V3`, the minimal sensible default.
    pub fn default_versions() -> Self {
        Self::ALLOW_V2 | Self::ALLOW_V3
    }

    pub fn allows_version(&self, version: u16) -> bool {
        match version {
            2 => self.contains(Self::ALLOW_V2),
            3 => self.contains(Self::ALLOW_V3),
            _ => false,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::default_versions() | Self::ERROR_START_AKE | Self::WHITESPACE_START_AKE
    }
}

/// Host-tunable knobs beyond the bitflags, passed to `Conversation::new`.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub policy: Policy,
    /// Desired outbound fragment size in bytes; `None` disables fragmentation.
    pub fragment_size: Option<usize>,
    /// Pin a specific instance tag instead of drawing a fresh random one.
    pub instance_tag: Option<u32>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self { policy: Policy::default(), fragment_size: None, instance_tag: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_allows_both_versions() {
        let p = Policy::default();
        assert!(p.allows_version(2));
        assert!(p.allows_version(3));
        assert!(!p.allows_version(1));
    }
}
