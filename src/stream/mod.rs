//! Byte streams over a trail.
//!
//! [`StegoWriter`] and [`StegoReader`] bind the three lower layers
//! together: plaintext is buffered into blocks, armored through an
//! [`ArmorChain`](crate::armor::ArmorChain), and every armored bit is
//! placed at (or fetched from) the address its
//! [`CipherTrail`](crate::crypto::CipherTrail) hop names, XOR-masked
//! with the hop's mask bit. Both streams are strictly sequential,
//! each block's hops start at the bit cursor the previous block left.

mod reader;
mod writer;

pub use reader::StegoReader;
pub use writer::StegoWriter;

use crate::crypto::{CipherTrail, Hop};

/// Pulls exactly `count` sequential hops starting at `start_bit`.
///
/// Batches underdeliver near content-block boundaries, so keep pulling
/// until the block's worth is assembled.
pub(crate) fn collect_hops(trail: &CipherTrail, start_bit: u64, count: usize) -> Vec<Hop> {
    let mut hops = Vec::with_capacity(count);
    while hops.len() < count {
        let batch = trail.find_block_hops(start_bit + hops.len() as u64);
        let take = batch.len().min(count - hops.len());
        hops.extend_from_slice(&batch[..take]);
    }
    hops
}

/// Worker count for intra-block data parallelism.
pub(crate) fn worker_count(items: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus.min(items).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_hops_matches_single_lookups() {
        let trail = CipherTrail::from_key(b"stream-hop-test-key").unwrap();
        for start in [0u64, 100, 127, 128, 5000] {
            let hops = collect_hops(&trail, start, 300);
            assert_eq!(hops.len(), 300);
            for (i, hop) in hops.iter().enumerate() {
                assert_eq!(*hop, trail.find_hop(start + i as u64));
            }
        }
    }

    #[test]
    fn test_worker_count_bounded() {
        assert_eq!(worker_count(0), 1);
        assert_eq!(worker_count(1), 1);
        assert!(worker_count(10_000) >= 1);
    }
}
