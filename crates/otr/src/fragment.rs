//! Fragmentation: splitting outbound ciphertext envelopes to respect
//! transport MTU, and reassembling inbound fragments, per spec.md §4.6.

use crate::version::VersionCapabilities;

/// Reassembly state. An empty context (`current_len == 0`) means "no
/// assembly in progress".
#[derive(Debug, Default, Clone)]
pub struct FragmentContext {
    buffer: Vec<u8>,
    current_index: u16,
    current_len: u16,
}

impl FragmentContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one received fragment. Returns `Some(reassembled)` once the
    /// final fragment of a sequence arrives; `None` while assembly is
    /// still in progress or the fragment was discarded.
    pub fn receive(&mut self, index: u16, len: u16, data: &[u8]) -> Option<Vec<u8>> {
        if index == 0 || len == 0 || index > len {
            return None;
        }
        if index == 1 {
            self.buffer = data.to_vec();
            self.current_index = 1;
            self.current_len = len;
        } else if index == self.current_index + 1 && len == self.current_len {
            self.buffer.extend_from_slice(data);
            self.current_index = index;
        } else {
            *self = Self::default();
            return None;
        }

        if self.current_index == self.current_len && self.current_len > 0 {
            let reassembled = std::mem::take(&mut self.buffer);
            *self = Self::default();
            Some(reassembled)
        } else {
            None
        }
    }
}

/// Split `payload` (already base64-encoded) into fragment envelopes sized
/// to fit within `fragment_size` bytes each, including header overhead.
/// Returns the payload unwrapped (no envelope) if it already fits.
pub fn split(
    payload: &str,
    fragment_size: usize,
    caps: &VersionCapabilities,
    sender_tag: u32,
    receiver_tag: u32,
) -> Vec<String> {
    let budget_for = |n: usize| -> usize {
        let overhead = caps.fragment_prefix(n as u16, n as u16, sender_tag, receiver_tag).len() + 1;
        fragment_size.saturating_sub(overhead).max(1)
    };

    if payload.len() <= budget_for(1) {
        return vec![payload.to_string()];
    }

    let mut n = 2usize;
    loop {
        let per = budget_for(n);
        let needed = (payload.len() + per - 1) / per;
        if needed <= n {
            n = needed.max(1);
            break;
        }
        n = needed;
    }

    let per = budget_for(n);
    let bytes = payload.as_bytes();
    let mut fragments = Vec::with_capacity(n);
    for k in 1..=n {
        let start = (k - 1) * per;
        let end = (start + per).min(bytes.len());
        let chunk = std::str::from_utf8(&bytes[start..end]).expect("payload is ASCII base64");
        let mut envelope = caps.fragment_prefix(k as u16, n as u16, sender_tag, receiver_tag);
        envelope.push_str(chunk);
        envelope.push(',');
        fragments.push(envelope);
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_payload_is_not_fragmented() {
        let caps = VersionCapabilities::for_version(3).unwrap();
        let fragments = split("short", 200, &caps, 0x101, 0x202);
        assert_eq!(fragments, vec!["short".to_string()]);
    }

    #[test]
    fn large_payload_splits_and_reassembles() {
        let caps = VersionCapabilities::for_version(3).unwrap();
        let payload: String = "A".repeat(700);
        let fragments = split(&payload, 200, &caps, 0x101, 0x202);
        assert!(fragments.len() > 1);

        let mut ctx = FragmentContext::new();
        let n = fragments.len() as u16;
        let mut reassembled = None;
        for (i, frag) in fragments.iter().enumerate() {
            let k = (i + 1) as u16;
            let prefix = caps.fragment_prefix(k, n, 0x101, 0x202);
            let chunk = frag.strip_prefix(&prefix).unwrap().strip_suffix(',').unwrap();
            reassembled = ctx.receive(k, n, chunk.as_bytes());
        }
        assert_eq!(reassembled.unwrap(), payload.as_bytes());
    }

    #[test]
    fn out_of_order_fragment_resets_context() {
        let mut ctx = FragmentContext::new();
        assert!(ctx.receive(1, 3, b"aaa").is_none());
        assert!(ctx.receive(3, 3, b"ccc").is_none());
        assert_eq!(ctx.current_len, 0);
    }

    #[test]
    fn zero_index_is_discarded_without_resetting() {
        let mut ctx = FragmentContext::new();
        ctx.receive(1, 2, b"aa");
        assert!(ctx.receive(0, 2, b"xx").is_none());
        assert_eq!(ctx.current_index, 1);
    }
}
