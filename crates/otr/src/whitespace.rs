//! Whitespace-tag generation and detection (spec.md §4.4, supplemented
//! from `whitespace.go` in the original reference — see SPEC_FULL.md §9).
//!
//! A whitespace tag is the fixed 16-byte header followed by one 8-byte
//! suffix per protocol version the sender advertises, appended to an
//! otherwise-plaintext message so OTR-aware clients can silently begin a
//! handshake while non-aware clients just see trailing whitespace.

use crate::version::{VersionCapabilities, WHITESPACE_TAG_BASE};

const V2_SUFFIX: &[u8] = b"\x20\x20\x09\x09\x20\x20\x09\x20";
const V3_SUFFIX: &[u8] = b"\x20\x20\x09\x09\x20\x20\x09\x09";

/// Append a whitespace tag advertising `versions` to `plaintext`.
pub fn append_tag(plaintext: &[u8], versions: &[u16]) -> Vec<u8> {
    let mut out = plaintext.to_vec();
    out.extend_from_slice(WHITESPACE_TAG_BASE);
    for version in versions {
        if let Some(caps) = VersionCapabilities::for_version(*version) {
            out.extend_from_slice(match caps.version {
                3 => V3_SUFFIX,
                _ => V2_SUFFIX,
            });
        }
    }
    out
}

/// Detect a whitespace tag anywhere in `buf`. Returns the advertised
/// versions and the buffer with the tag (base header + every recognized
/// suffix) removed.
pub fn detect(buf: &[u8]) -> Option<(Vec<u16>, Vec<u8>)> {
    let tag_start = find_subslice(buf, WHITESPACE_TAG_BASE)?;
    let mut cursor = tag_start + WHITESPACE_TAG_BASE.len();
    let mut versions = Vec::new();
    loop {
        if buf[cursor..].starts_with(V2_SUFFIX) {
            versions.push(2);
            cursor += V2_SUFFIX.len();
        } else if buf[cursor..].starts_with(V3_SUFFIX) {
            versions.push(3);
            cursor += V3_SUFFIX.len();
        } else {
            break;
        }
    }
    let mut stripped = Vec::with_capacity(buf.len() - (cursor - tag_start));
    stripped.extend_from_slice(&buf[..tag_start]);
    stripped.extend_from_slice(&buf[cursor..]);
    Some((versions, stripped))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_roundtrip_detects_advertised_versions() {
        let tagged = append_tag(b"hello", &[2, 3]);
        let (versions, stripped) = detect(&tagged).unwrap();
        assert_eq!(versions, vec![2, 3]);
        assert_eq!(stripped, b"hello");
    }

    #[test]
    fn no_tag_present_returns_none() {
        assert!(detect(b"plain old text").is_none());
    }
}
