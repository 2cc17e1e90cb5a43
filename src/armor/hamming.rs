//! Extended Hamming(8,4) inner armor.
//!
//! Each source byte becomes two codewords, one per nibble. A codeword
//! corrects any single flipped bit; a detected-but-uncorrectable pattern
//! flags the whole byte for the outer erasure layer instead of passing
//! corrupt data upward.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::armor::chain::ArmorCoder;
use crate::armor::packet::DecodedPacket;
use crate::error::{Error, Result};

pub struct HammingCoder {
    error_count: AtomicUsize,
}

impl HammingCoder {
    pub fn new() -> Self {
        Self {
            error_count: AtomicUsize::new(0),
        }
    }

    /// Bit errors seen since construction or the last [`clear`](Self::clear).
    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.error_count.store(0, Ordering::Relaxed);
    }
}

impl Default for HammingCoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes a nibble into an extended Hamming codeword.
///
/// Bit layout, LSB first: p1 p2 d1 p3 d2 d3 d4 p4, with p4 the overall
/// parity bit that distinguishes single from double errors.
fn encode_half(nibble: u8) -> u8 {
    let d1 = nibble & 1;
    let d2 = (nibble >> 1) & 1;
    let d3 = (nibble >> 2) & 1;
    let d4 = (nibble >> 3) & 1;
    let p1 = d1 ^ d2 ^ d4;
    let p2 = d1 ^ d3 ^ d4;
    let p3 = d2 ^ d3 ^ d4;
    let word = p1 | (p2 << 1) | (d1 << 2) | (p3 << 3) | (d2 << 4) | (d3 << 5) | (d4 << 6);
    word | ((word.count_ones() as u8 & 1) << 7)
}

/// Decodes one codeword, correcting a single bit error.
///
/// Returns `None` on a double error. `counter` is bumped once per
/// detected error, corrected or not.
fn decode_half(input: u8, counter: &AtomicUsize) -> Option<u8> {
    let parity = (input & 0x7f).count_ones() as u8 & 1;
    let p1 = input & 1;
    let p2 = (input >> 1) & 1;
    let d1 = (input >> 2) & 1;
    let p3 = (input >> 3) & 1;
    let d2 = (input >> 4) & 1;
    let d3 = (input >> 5) & 1;
    let d4 = (input >> 6) & 1;
    let p4 = (input >> 7) & 1;

    let syndrome =
        ((p3 ^ d2 ^ d3 ^ d4) << 2) | ((p2 ^ d1 ^ d3 ^ d4) << 1) | (p1 ^ d1 ^ d2 ^ d4);

    let mut value = input;
    if p4 != parity {
        counter.fetch_add(1, Ordering::Relaxed);
        if syndrome != 0 {
            value ^= 1 << (syndrome - 1);
        }
    } else if syndrome != 0 {
        // Non-zero syndrome with matching overall parity means at least
        // two bits flipped; the codeword is beyond repair.
        counter.fetch_add(1, Ordering::Relaxed);
        return None;
    }

    Some(((value >> 2) & 1) | ((value >> 3) & 0x0e))
}

impl ArmorCoder for HammingCoder {
    fn max_data(&self) -> usize {
        usize::MAX / 2
    }

    fn max_source_data(&self) -> usize {
        usize::MAX
    }

    fn armor_factor(&self) -> usize {
        2
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut out = vec![0u8; input.len() * 2];
        for (i, &byte) in input.iter().enumerate() {
            out[2 * i] = encode_half(byte & 0x0f);
            out[2 * i + 1] = encode_half(byte >> 4);
        }
        Ok(vec![out])
    }

    fn decode(&self, input: DecodedPacket) -> Result<DecodedPacket> {
        if input.len() % 2 != 0 {
            return Err(Error::InvalidBlockSize {
                expected: input.len() + 1,
                actual: input.len(),
            });
        }
        let out_len = input.len() / 2;
        let mut data = vec![0u8; out_len];
        let mut flags = vec![false; out_len];
        let mut errored = 0usize;
        for i in 0..out_len {
            let low = decode_half(input.data()[2 * i], &self.error_count);
            let high = decode_half(input.data()[2 * i + 1], &self.error_count);
            let input_flagged = input.flags()[2 * i] || input.flags()[2 * i + 1];
            match (low, high) {
                (Some(l), Some(h)) if !input_flagged => data[i] = l | (h << 4),
                _ => {
                    flags[i] = true;
                    errored += 1;
                }
            }
        }
        let ratio = errored as f32 / out_len as f32;
        DecodedPacket::new(data, flags, ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codeword_roundtrip() {
        let coder = HammingCoder::new();
        for nibble in 0..16u8 {
            let word = encode_half(nibble);
            assert_eq!(decode_half(word, &coder.error_count), Some(nibble));
        }
        assert_eq!(coder.error_count(), 0);
    }

    #[test]
    fn test_encode_single_shard() {
        let coder = HammingCoder::new();
        let shards = coder.encode(&[0xab, 0x01]).unwrap();
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].len(), 4);
    }

    #[test]
    fn test_single_bit_flips_corrected() {
        let coder = HammingCoder::new();
        let original = vec![0x5a, 0xc3];
        let armored = coder.encode(&original).unwrap().remove(0);

        let mut expected_errors = 0;
        for byte in 0..armored.len() {
            for bit in 0..8 {
                let mut damaged = armored.clone();
                damaged[byte] ^= 1 << bit;
                let decoded = coder.decode(DecodedPacket::new_clean(damaged)).unwrap();
                assert_eq!(decoded.data(), &original[..]);
                assert_eq!(decoded.error_ratio(), 0.0);
                expected_errors += 1;
                assert_eq!(coder.error_count(), expected_errors);
            }
        }
    }

    #[test]
    fn test_double_bit_flip_flagged() {
        let coder = HammingCoder::new();
        let armored = coder.encode(&[0x5a]).unwrap().remove(0);

        // Two flips within the Hamming bits of one codeword are detected
        // but cannot be corrected.
        let mut damaged = armored.clone();
        damaged[0] ^= 0b0000_0011;
        let decoded = coder.decode(DecodedPacket::new_clean(damaged)).unwrap();
        assert!(decoded.flags()[0]);
        assert_eq!(decoded.data()[0], 0);
        assert_eq!(decoded.error_ratio(), 1.0);
    }

    #[test]
    fn test_input_flags_propagate() {
        let coder = HammingCoder::new();
        let armored = coder.encode(&[0x11, 0x22]).unwrap().remove(0);
        let flags = vec![true, false, false, false];
        let decoded = coder
            .decode(DecodedPacket::new(armored, flags, 0.25).unwrap())
            .unwrap();
        assert!(decoded.flags()[0]);
        assert!(!decoded.flags()[1]);
        assert_eq!(decoded.data()[1], 0x22);
    }

    #[test]
    fn test_odd_length_rejected() {
        let coder = HammingCoder::new();
        assert!(coder.decode(DecodedPacket::new_clean(vec![0; 3])).is_err());
    }

    #[test]
    fn test_error_counter_clears() {
        let coder = HammingCoder::new();
        let mut armored = coder.encode(&[0x0f]).unwrap().remove(0);
        armored[0] ^= 1;
        coder.decode(DecodedPacket::new_clean(armored)).unwrap();
        assert_eq!(coder.error_count(), 1);
        coder.clear();
        assert_eq!(coder.error_count(), 0);
    }
}
