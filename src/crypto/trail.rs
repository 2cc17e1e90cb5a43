//! Keyed pseudorandom trails through a bitfield.
//!
//! A [`CipherTrail`] turns key material into two independent AES-256
//! counter-mode keystreams: the address generator picks, for each logical
//! bit of a hidden stream, a pseudorandom target address in the bitfield;
//! the content generator picks the XOR mask applied to the bit stored
//! there. Both are manual counter modes built from the single-block
//! primitive: block N is the encryption of `IV half || N` (big-endian).

use crate::config::{
    ADDRESSES_PER_BLOCK, BITS_PER_BLOCK, IV_SIZE_BYTES, KEY_AND_IV_SIZE_BYTES, KEY_MATERIAL_BYTES,
    KEY_SIZE_BYTES,
};
use crate::crypto::guarded::{FileSalt, GuardedBuffer};
use crate::crypto::kdf;
use crate::error::{Error, Result};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes256;
use zeroize::Zeroize;

type Block = GenericArray<u8, aes::cipher::consts::U16>;

/// One (target address, XOR mask bit) pair for one bit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    /// Pseudorandom target address in the bitfield, interpreted modulo the
    /// store's data bit length.
    pub address: u64,
    /// Pseudorandom XOR mask for the bit stored at the address.
    pub mask: bool,
}

/// Deterministic, key-derived hop sequence for one hidden stream.
///
/// Generator state is fixed for the trail's lifetime; there is no error
/// path after construction.
pub struct CipherTrail {
    address_cipher: Aes256,
    content_cipher: Aes256,
    address_iv: [u8; IV_SIZE_BYTES],
    content_iv: [u8; IV_SIZE_BYTES],
}

impl CipherTrail {
    /// Trail for a passphrase against a specific blob, diversified by its
    /// file salt and a nonce of caller-controlled length.
    pub fn from_passphrase(salt: &FileSalt, passphrase: &[u8], nonce: &[u8]) -> Result<Self> {
        let material = kdf::derive_from_passphrase(salt, passphrase, nonce)?;
        Self::from_material(&material)
    }

    /// Trail for a raw data key.
    pub fn from_key(key: &[u8]) -> Result<Self> {
        let material = kdf::derive_from_key(key)?;
        Self::from_material(&material)
    }

    fn from_material(material: &GuardedBuffer) -> Result<Self> {
        if material.len() != KEY_MATERIAL_BYTES {
            return Err(Error::InvalidKeyLength {
                expected: KEY_MATERIAL_BYTES,
                actual: material.len(),
            });
        }
        let (address_half, content_half) = material.split_at(KEY_AND_IV_SIZE_BYTES);

        let mut address_iv = [0u8; IV_SIZE_BYTES];
        address_iv.copy_from_slice(&address_half[KEY_SIZE_BYTES..]);
        let mut content_iv = [0u8; IV_SIZE_BYTES];
        content_iv.copy_from_slice(&content_half[KEY_SIZE_BYTES..]);

        Ok(Self {
            address_cipher: Aes256::new(GenericArray::from_slice(&address_half[..KEY_SIZE_BYTES])),
            content_cipher: Aes256::new(GenericArray::from_slice(&content_half[..KEY_SIZE_BYTES])),
            address_iv,
            content_iv,
        })
    }

    fn counter_block(iv: &[u8; IV_SIZE_BYTES], number: u64) -> Block {
        let mut block = Block::default();
        block[..IV_SIZE_BYTES].copy_from_slice(iv);
        block[IV_SIZE_BYTES..].copy_from_slice(&number.to_be_bytes());
        block
    }

    fn keystream_block(cipher: &Aes256, iv: &[u8; IV_SIZE_BYTES], number: u64) -> Block {
        let mut block = Self::counter_block(iv, number);
        cipher.encrypt_block(&mut block);
        block
    }

    fn word_at(block: &Block, word: usize) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&block[word * 8..word * 8 + 8]);
        u64::from_be_bytes(bytes)
    }

    fn bit_at(block: &Block, bit: usize) -> bool {
        block[bit / 8] & (1 << (bit % 8)) != 0
    }

    /// The hop for a single bit position.
    ///
    /// One block-cipher call per axis; use [`CipherTrail::find_block_hops`]
    /// when consuming hops sequentially.
    pub fn find_hop(&self, bit_address: u64) -> Hop {
        let mut address_block = Self::keystream_block(
            &self.address_cipher,
            &self.address_iv,
            bit_address / ADDRESSES_PER_BLOCK,
        );
        let address = Self::word_at(
            &address_block,
            (bit_address % ADDRESSES_PER_BLOCK) as usize,
        );
        address_block.zeroize();

        let mut content_block = Self::keystream_block(
            &self.content_cipher,
            &self.content_iv,
            bit_address / BITS_PER_BLOCK,
        );
        let mask = Self::bit_at(&content_block, (bit_address % BITS_PER_BLOCK) as usize);
        content_block.zeroize();

        Hop { address, mask }
    }

    /// All hops from `first_bit_address` to the end of its content block.
    ///
    /// Batch form of [`CipherTrail::find_hop`]: for every covered address
    /// the result is identical to the single-hop call. That equivalence is
    /// a correctness invariant, not an optimization detail; the hide and
    /// reveal paths may mix both forms freely.
    pub fn find_block_hops(&self, first_bit_address: u64) -> Vec<Hop> {
        let content_offset = (first_bit_address % BITS_PER_BLOCK) as usize;
        let hop_count = BITS_PER_BLOCK as usize - content_offset;

        let mut content_block = Self::keystream_block(
            &self.content_cipher,
            &self.content_iv,
            first_bit_address / BITS_PER_BLOCK,
        );

        let first_word_block = first_bit_address / ADDRESSES_PER_BLOCK;
        let word_offset = (first_bit_address % ADDRESSES_PER_BLOCK) as usize;
        let words_per_block = ADDRESSES_PER_BLOCK as usize;
        let blocks_needed = (word_offset + hop_count + words_per_block - 1) / words_per_block;

        let mut address_blocks: Vec<Block> = (0..blocks_needed as u64)
            .map(|i| Self::counter_block(&self.address_iv, first_word_block + i))
            .collect();
        self.address_cipher.encrypt_blocks(&mut address_blocks);

        let mut hops = Vec::with_capacity(hop_count);
        for i in 0..hop_count {
            let word_index = word_offset + i;
            let address = Self::word_at(
                &address_blocks[word_index / words_per_block],
                word_index % words_per_block,
            );
            let mask = Self::bit_at(&content_block, content_offset + i);
            hops.push(Hop { address, mask });
        }

        content_block.zeroize();
        for block in &mut address_blocks {
            block.zeroize();
        }
        hops
    }
}

impl Drop for CipherTrail {
    fn drop(&mut self) {
        self.address_iv.zeroize();
        self.content_iv.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_trail(seed: u8) -> CipherTrail {
        CipherTrail::from_key(&[seed; 32]).unwrap()
    }

    #[test]
    fn test_block_hops_match_single_hops() {
        let trail = test_trail(42);
        for start in [0u64, 1, 5, 63, 64, 127, 128, 130, 131, 1000, 1 << 33] {
            let batch = trail.find_block_hops(start);
            assert!(!batch.is_empty());
            for (i, hop) in batch.iter().enumerate() {
                assert_eq!(
                    *hop,
                    trail.find_hop(start + i as u64),
                    "divergence at start {start} offset {i}"
                );
            }
        }
    }

    #[test]
    fn test_batch_covers_rest_of_content_block() {
        let trail = test_trail(1);
        assert_eq!(trail.find_block_hops(0).len(), 128);
        assert_eq!(trail.find_block_hops(128).len(), 128);
        assert_eq!(trail.find_block_hops(130).len(), 126);
        assert_eq!(trail.find_block_hops(255).len(), 1);
    }

    #[test]
    fn test_identical_keys_identical_trails() {
        let a = test_trail(9);
        let b = test_trail(9);
        for addr in 0..512u64 {
            assert_eq!(a.find_hop(addr), b.find_hop(addr));
        }
    }

    #[test]
    fn test_different_keys_diverge() {
        let a = test_trail(1);
        let b = test_trail(2);
        let differing = (0..512u64)
            .filter(|&addr| a.find_hop(addr) != b.find_hop(addr))
            .count();
        assert!(differing > 500, "only {differing} of 512 hops differ");
    }

    #[test]
    fn test_mask_bits_balanced() {
        // Mask bits of a keystream should be indistinguishable from fair
        // coin flips; allow a generous band around 50%.
        let trail = test_trail(77);
        let sample = 4096u64;
        let ones: u64 = (0..sample)
            .filter(|&addr| trail.find_hop(addr).mask)
            .count() as u64;
        assert!(
            ones > sample * 40 / 100 && ones < sample * 60 / 100,
            "{ones} of {sample} mask bits set"
        );
    }

    #[test]
    fn test_passphrase_trail_depends_on_salt_and_nonce() {
        let salt_a = FileSalt::from_bytes(vec![1; 32]).unwrap();
        let salt_b = FileSalt::from_bytes(vec![2; 32]).unwrap();
        let base = CipherTrail::from_passphrase(&salt_a, b"alpha", &[0]).unwrap();
        let other_salt = CipherTrail::from_passphrase(&salt_b, b"alpha", &[0]).unwrap();
        let other_nonce = CipherTrail::from_passphrase(&salt_a, b"alpha", &[1]).unwrap();
        assert_ne!(base.find_hop(0), other_salt.find_hop(0));
        assert_ne!(base.find_hop(0), other_nonce.find_hop(0));
    }

    #[test]
    fn test_rejects_short_material() {
        let material = GuardedBuffer::zeroed(KEY_MATERIAL_BYTES - 1);
        assert!(CipherTrail::from_material(&material).is_err());
    }
}
