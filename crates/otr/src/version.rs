//! Version polymorphism modeled as a capability record (spec.md §9,
//! Design Notes), selected once when a version is negotiated rather than
//! expressed through inheritance or per-call branching.

/// The OTR whitespace-tag header bytes (spec.md §4.4), shared by both
/// versions; the version-specific suffix bytes are appended by
/// `whitespace::tag_for_version`.
pub const WHITESPACE_TAG_BASE: &[u8] = b"\x20\x09\x20\x20\x09\x09\x09\x09\x20\x09\x20\x09\x20\x09\x20\x20";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionCapabilities {
    pub version: u16,
    /// Header length in bytes (SHORT + BYTE, plus two WORDs for v3).
    pub header_len: usize,
    pub needs_instance_tag: bool,
    /// Minimum fragment payload size this version's transport should respect.
    pub min_fragment_size: usize,
    /// Private DH exponent size in bits (spec.md §4.2).
    pub exponent_bits: usize,
}

impl VersionCapabilities {
    pub fn for_version(version: u16) -> Option<Self> {
        match version {
            2 => Some(Self { version: 2, header_len: 3, needs_instance_tag: false, min_fragment_size: 64, exponent_bits: 320 }),
            3 => Some(Self { version: 3, header_len: 11, needs_instance_tag: true, min_fragment_size: 64, exponent_bits: 1536 }),
            _ => None,
        }
    }

    /// Fragment envelope prefix, e.g. `?OTR,1,4,` (v2) or
    /// `?OTR|1010101|0202020,1,4,` (v3; tags lowercase hex).
    pub fn fragment_prefix(&self, k: u16, n: u16, sender_tag: u32, receiver_tag: u32) -> String {
        match self.version {
            3 => format!("?OTR|{sender_tag:x}|{receiver_tag:x},{k},{n},"),
            _ => format!("?OTR,{k},{n},"),
        }
    }

    pub fn whitespace_tag(&self) -> Vec<u8> {
        let mut out = WHITESPACE_TAG_BASE.to_vec();
        out.extend_from_slice(match self.version {
            3 => b"\x20\x20\x09\x09\x20\x20\x09\x09",
            _ => b"\x20\x20\x09\x09\x20\x20\x09\x20",
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_needs_instance_tag_and_1536_bit_exponent() {
        let caps = VersionCapabilities::for_version(3).unwrap();
        assert!(caps.needs_instance_tag);
        assert_eq!(caps.exponent_bits, 1536);
    }

    #[test]
    fn v2_fragment_prefix_has_no_tags() {
        let caps = VersionCapabilities::for_version(2).unwrap();
        assert_eq!(caps.fragment_prefix(1, 4, 0, 0), "?OTR,1,4,");
    }

    #[test]
    fn v3_fragment_prefix_includes_hex_tags() {
        let caps = VersionCapabilities::for_version(3).unwrap();
        assert_eq!(caps.fragment_prefix(2, 5, 0x101, 0x202), "?OTR|101|202,2,5,");
    }
}
