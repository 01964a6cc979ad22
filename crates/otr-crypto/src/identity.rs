//! Human-facing rendering of long-term key material: the hex-spaced
//! fingerprint string hosts show for out-of-band verification, mirroring
//! the fingerprint/verify idiom every long-term key type in this corpus
//! carries even though persistence and UX policy themselves are a host
//! concern.

/// 20-byte SHA-1 fingerprint of a serialized DSA public key
/// (`DsaPublicKey::fingerprint`), rendered as space-separated 4-hex-digit
/// groups for manual comparison.
pub fn to_hex_spaced(fingerprint: &[u8; 20]) -> String {
    let hex = hex::encode(fingerprint);
    hex.as_bytes()
        .chunks(4)
        .map(|c| std::str::from_utf8(c).expect("hex::encode output is ASCII"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Constant-time fingerprint comparison, for the host's "do these two
/// fingerprints match" verification step.
pub fn fingerprints_match(a: &[u8; 20], b: &[u8; 20]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_spaced_groups_of_four() {
        let fp = [0x12u8; 20];
        let rendered = to_hex_spaced(&fp);
        assert_eq!(rendered, "1212 1212 1212 1212 1212 1212 1212 1212 1212 1212");
    }

    #[test]
    fn fingerprints_match_detects_difference() {
        let a = [0u8; 20];
        let mut b = [0u8; 20];
        b[19] = 1;
        assert!(!fingerprints_match(&a, &b));
        assert!(fingerprints_match(&a, &a));
    }
}
