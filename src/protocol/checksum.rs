//! Internet checksum (RFC 1071) and IPv4 pseudo-header sums
//!
//! Every header checksum in this crate funnels through these helpers so that
//! software recomputation and offload seeding agree on the same arithmetic.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// How the engine finishes checksums after rewriting a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMode {
    /// Recompute IPv4 and L4 checksums in software.
    #[default]
    Software,
    /// Zero the IPv4 checksum and seed the L4 checksum with the pseudo-header
    /// sum, leaving completion to the NIC.
    Offload,
    /// Leave checksum fields untouched.
    None,
}

/// Add `data` to a running one's complement sum (not yet folded).
pub fn sum_words(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for pair in &mut chunks {
        sum = sum.wrapping_add(u16::from_be_bytes([pair[0], pair[1]]) as u32);
    }
    // Pad with zero if odd length
    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add(u16::from_be_bytes([*last, 0]) as u32);
    }
    sum
}

/// Fold a 32-bit running sum to 16 bits (not complemented).
pub fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// Internet checksum of a byte slice.
pub fn internet_checksum(data: &[u8]) -> u16 {
    !fold(sum_words(0, data))
}

/// Unfolded sum of the IPv4 pseudo-header.
///
/// ```text
/// +--------+--------+--------+--------+
/// |          Source Address           |
/// +--------+--------+--------+--------+
/// |        Destination Address        |
/// +--------+--------+--------+--------+
/// |  Zero  |Protocol|   L4 Length     |
/// +--------+--------+--------+--------+
/// ```
pub fn pseudo_header_sum(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, l4_len: usize) -> u32 {
    let mut sum = sum_words(0, &src.octets());
    sum = sum_words(sum, &dst.octets());
    sum = sum.wrapping_add(protocol as u32);
    sum.wrapping_add(l4_len as u32)
}

/// Checksum of an L4 segment including the IPv4 pseudo-header.
pub fn l4_checksum(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, segment: &[u8]) -> u16 {
    let sum = pseudo_header_sum(src, dst, protocol, segment.len());
    !fold(sum_words(sum, segment))
}

/// Folded pseudo-header sum as hardware offload expects it in the L4
/// checksum field (not complemented).
pub fn offload_seed(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, l4_len: usize) -> u16 {
    fold(pseudo_header_sum(src, dst, protocol, l4_len))
}

/// Incrementally update `checksum` after the covered bytes `old` were
/// replaced by `new` (RFC 1624, eqn. 3). Both slices must be word aligned
/// in the original data and of equal length.
pub fn adjust(checksum: u16, old: &[u8], new: &[u8]) -> u16 {
    let mut sum = !checksum as u32;
    for pair in old.chunks(2) {
        let word = u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]);
        sum = sum.wrapping_add(!word as u32);
    }
    !fold(sum_words(sum, new))
}
