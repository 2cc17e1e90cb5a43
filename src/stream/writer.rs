//! Hide-side stream.

use std::sync::Mutex;
use std::thread;

use tracing::debug;
use zeroize::Zeroize;

use crate::armor::ArmorChain;
use crate::crypto::CipherTrail;
use crate::error::{Error, Result};
use crate::field::BitField;
use crate::stream::{collect_hops, worker_count};

/// Writes a byte stream onto a trail.
///
/// Plaintext is buffered up to one chain block. A full buffer is
/// armored and scattered bit by bit across the field; hop addresses
/// within one block are independent, so the bit placements run on
/// parallel workers. The stream must be written through once in
/// sequence and finished explicitly, which flushes any partial last
/// block and reports the total plaintext length for metadata use.
pub struct StegoWriter<'a> {
    field: &'a dyn BitField,
    trail: CipherTrail,
    chain: ArmorChain,
    buf: Vec<u8>,
    block_size: usize,
    written_bits: u64,
    length: u64,
}

impl<'a> StegoWriter<'a> {
    pub fn new(field: &'a dyn BitField, trail: CipherTrail, chain: ArmorChain) -> Self {
        let block_size = chain.max_data();
        Self {
            field,
            trail,
            chain,
            buf: Vec::with_capacity(block_size),
            block_size,
            written_bits: 0,
            length: 0,
        }
    }

    /// Appends bytes, flushing whole blocks as the buffer fills.
    pub fn write(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let room = self.block_size - self.buf.len();
            let take = room.min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buf.len() == self.block_size {
                self.flush_block()?;
            }
        }
        Ok(())
    }

    /// Flushes the partial last block and returns the plaintext length.
    pub fn finish(mut self) -> Result<u64> {
        if !self.buf.is_empty() {
            self.flush_block()?;
        }
        debug!(length = self.length, bits = self.written_bits, "stream hidden");
        Ok(self.length)
    }

    fn flush_block(&mut self) -> Result<()> {
        let plaintext = std::mem::take(&mut self.buf);
        self.length += plaintext.len() as u64;
        let armored = self.chain.encode_chain(plaintext)?;
        let bits = armored.len() * 8;

        let hops = collect_hops(&self.trail, self.written_bits, bits);
        self.written_bits += bits as u64;

        let field = self.field;
        let armored = &*armored;
        let errors = Mutex::new(Vec::new());
        let chunk = (bits + worker_count(bits) - 1) / worker_count(bits);
        thread::scope(|s| {
            for (w, hop_chunk) in hops.chunks(chunk).enumerate() {
                let errors = &errors;
                s.spawn(move || {
                    for (i, hop) in hop_chunk.iter().enumerate() {
                        let bit = w * chunk + i;
                        let armored_bit = armored[bit / 8] & (1 << (bit % 8)) != 0;
                        if let Err(e) = field.set_bit(hop.address, hop.mask ^ armored_bit) {
                            if let Ok(mut errors) = errors.lock() {
                                errors.push(e);
                            }
                        }
                    }
                });
            }
        });

        let errors = match errors.into_inner() {
            Ok(errors) => errors,
            Err(poisoned) => poisoned.into_inner(),
        };
        Error::collect_block(errors)
    }
}

impl Drop for StegoWriter<'_> {
    fn drop(&mut self) {
        self.buf.zeroize();
    }
}
