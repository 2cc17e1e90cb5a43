//! Systematic Reed-Solomon erasure armoring over GF(2^8).

use crate::armor::chain::ArmorCoder;
use crate::armor::packet::DecodedPacket;
use crate::config::reed_solomon_params::{MAX_SHARDS, PARITY_SHARDS};
use crate::error::{Error, Result};
use reed_solomon_erasure::galois_8::ReedSolomon;
use tracing::warn;

/// Reed-Solomon erasure codec with a fixed 128-shard parity budget.
///
/// A block of `data_length` plaintext bytes is spread over
/// `min(data_length, 128)` data shards of `ceil(data_length / data_shards)`
/// bytes each and extended with 128 parity shards. Any `data_shards`
/// intact shards recover the block; fewer produce the soft total-loss
/// value instead of an error, so an outer caller sees a flagged result
/// rather than a crash.
pub struct ReedSolomonCoder {
    data_length: usize,
    data_shards: usize,
    shard_size: usize,
    codec: ReedSolomon,
}

/// Data shard count for a plaintext block length.
pub fn data_shards(data_length: usize) -> usize {
    data_length.min(MAX_SHARDS - PARITY_SHARDS)
}

/// Shard size for a plaintext block length.
pub fn shard_size(data_length: usize) -> usize {
    let shards = data_shards(data_length);
    (data_length + shards - 1) / shards
}

impl ReedSolomonCoder {
    pub fn new(data_length: usize) -> Result<Self> {
        if data_length == 0 {
            return Err(Error::InvalidConfig(
                "Reed-Solomon data length must be non-zero".into(),
            ));
        }
        let data_shards = data_shards(data_length);
        let codec = ReedSolomon::new(data_shards, PARITY_SHARDS)
            .map_err(|e| Error::Erasure(e.to_string()))?;
        Ok(Self {
            data_length,
            data_shards,
            shard_size: shard_size(data_length),
            codec,
        })
    }

    fn total_shards(&self) -> usize {
        self.data_shards + PARITY_SHARDS
    }

    fn soft_total_loss(&self) -> Result<DecodedPacket> {
        DecodedPacket::new(
            vec![0u8; self.data_length],
            vec![true; self.data_length],
            1.0,
        )
    }
}

impl ArmorCoder for ReedSolomonCoder {
    fn max_data(&self) -> usize {
        self.data_length
    }

    fn max_source_data(&self) -> usize {
        self.total_shards() * self.shard_size
    }

    fn armor_factor(&self) -> usize {
        1 + (PARITY_SHARDS + self.data_shards - 1) / self.data_shards
    }

    fn armored_length(&self, data_length: usize, rest: &[Box<dyn ArmorCoder>]) -> Result<usize> {
        let block = self.data_shards * self.shard_size;
        let blocks = (data_length + block - 1) / block;
        let expanded = blocks
            .checked_mul(self.total_shards() * self.shard_size)
            .ok_or_else(|| Error::InvalidConfig("armored length overflow".into()))?;
        match rest.split_first() {
            Some((next, tail)) => next.armored_length(expanded, tail),
            None => Ok(expanded),
        }
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<Vec<u8>>> {
        if input.len() > self.data_length {
            return Err(Error::InvalidBlockSize {
                expected: self.data_length,
                actual: input.len(),
            });
        }
        let mut shards = vec![vec![0u8; self.shard_size]; self.total_shards()];
        for (i, chunk) in input.chunks(self.shard_size).enumerate() {
            shards[i][..chunk.len()].copy_from_slice(chunk);
        }
        self.codec
            .encode(&mut shards)
            .map_err(|e| Error::Erasure(e.to_string()))?;
        Ok(shards)
    }

    fn decode(&self, input: DecodedPacket) -> Result<DecodedPacket> {
        let expected = self.total_shards() * self.shard_size;
        if input.len() != expected {
            return Err(Error::InvalidBlockSize {
                expected,
                actual: input.len(),
            });
        }

        let flagged = input.flags().iter().filter(|&&f| f).count();
        let in_ratio = flagged as f32 / input.len() as f32;

        // A shard is usable only when none of its bytes is flagged.
        let mut shards: Vec<Option<Vec<u8>>> = input
            .data()
            .chunks(self.shard_size)
            .zip(input.flags().chunks(self.shard_size))
            .map(|(bytes, flags)| {
                if flags.iter().any(|&f| f) {
                    None
                } else {
                    Some(bytes.to_vec())
                }
            })
            .collect();
        drop(input);

        let good = shards.iter().filter(|s| s.is_some()).count();
        if good < self.data_shards {
            warn!(
                good,
                needed = self.data_shards,
                "too few good shards, block unrecoverable"
            );
            return self.soft_total_loss();
        }

        self.codec
            .reconstruct(&mut shards)
            .map_err(|e| Error::Erasure(e.to_string()))?;

        let mut result = vec![0u8; self.data_length];
        for (chunk, shard) in result
            .chunks_mut(self.shard_size)
            .zip(shards.iter().take(self.data_shards))
        {
            match shard {
                Some(bytes) => chunk.copy_from_slice(&bytes[..chunk.len()]),
                None => return Err(Error::Erasure("shard missing after reconstruct".into())),
            }
        }

        let shard_ratio = (self.total_shards() - good) as f32 / self.total_shards() as f32;
        let len = result.len();
        DecodedPacket::new(result, vec![false; len], in_ratio.max(shard_ratio))
    }
}
