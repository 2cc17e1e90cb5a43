//! Reveal-side stream.

use std::sync::Mutex;
use std::thread;

use tracing::debug;
use zeroize::Zeroize;

use crate::armor::{ArmorChain, DecodedPacket};
use crate::crypto::CipherTrail;
use crate::error::{Error, Result};
use crate::field::BitField;
use crate::stream::{collect_hops, worker_count};

/// Reads a byte stream back off a trail.
///
/// Built with the target plaintext length; pulls one armored block's
/// worth of hops at a time, resolves every bit on parallel workers, and
/// decodes the reassembled block through the chain. IO failures inside
/// a block are collected and raised together once the block completes,
/// so one failing bit does not abort its siblings. Decode-time damage
/// is not an error; it accumulates in [`error_ratio`](Self::error_ratio).
pub struct StegoReader<'a> {
    field: &'a dyn BitField,
    trail: CipherTrail,
    chain: ArmorChain,
    remaining: u64,
    read_bits: u64,
    buffer: Vec<u8>,
    pos: usize,
    error_ratio: f32,
}

impl<'a> StegoReader<'a> {
    pub fn new(
        field: &'a dyn BitField,
        trail: CipherTrail,
        chain: ArmorChain,
        length: u64,
    ) -> Self {
        Self {
            field,
            trail,
            chain,
            remaining: length,
            read_bits: 0,
            buffer: Vec::new(),
            pos: 0,
            error_ratio: 0.0,
        }
    }

    /// Fills `out` with as many plaintext bytes as remain, returning the
    /// count. Zero means end of stream.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < out.len() {
            if self.pos == self.buffer.len() {
                if self.remaining == 0 {
                    break;
                }
                self.fill_block()?;
            }
            let take = (self.buffer.len() - self.pos).min(out.len() - filled);
            out[filled..filled + take].copy_from_slice(&self.buffer[self.pos..self.pos + take]);
            self.pos += take;
            filled += take;
        }
        Ok(filled)
    }

    /// Reads the whole remaining stream.
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.remaining as usize + self.buffer.len() - self.pos];
        let got = self.read(&mut out)?;
        out.truncate(got);
        Ok(out)
    }

    /// Worst per-block error ratio seen so far.
    pub fn error_ratio(&self) -> f32 {
        self.error_ratio
    }

    fn fill_block(&mut self) -> Result<()> {
        let source_size = self.chain.source_packet_size()?;
        let bits = source_size * 8;

        let hops = collect_hops(&self.trail, self.read_bits, bits);
        self.read_bits += bits as u64;

        let field = self.field;
        let mut armored = vec![0u8; source_size];
        let errors = Mutex::new(Vec::new());
        let workers = worker_count(source_size);
        let chunk = (source_size + workers - 1) / workers;
        thread::scope(|s| {
            for (bytes, byte_hops) in armored.chunks_mut(chunk).zip(hops.chunks(chunk * 8)) {
                let errors = &errors;
                s.spawn(move || {
                    for (byte, hops) in bytes.iter_mut().zip(byte_hops.chunks(8)) {
                        for (bit, hop) in hops.iter().enumerate() {
                            match field.get_bit(hop.address) {
                                Ok(state) => {
                                    if state ^ hop.mask {
                                        *byte |= 1 << bit;
                                    }
                                }
                                Err(e) => {
                                    if let Ok(mut errors) = errors.lock() {
                                        errors.push(e);
                                    }
                                }
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
        Error::collect_block(errors)?;

        let decoded = self.chain.decode_chain(DecodedPacket::new_clean(armored))?;
        if decoded.error_ratio() > self.error_ratio {
            self.error_ratio = decoded.error_ratio();
            debug!(error_ratio = self.error_ratio, "block decoded with damage");
        }

        let take = (self.remaining as usize).min(decoded.len());
        let mut data = decoded.take_data();
        data.truncate(take);
        self.remaining -= take as u64;
        self.buffer.zeroize();
        self.buffer = data;
        self.pos = 0;
        Ok(())
    }
}

impl Drop for StegoReader<'_> {
    fn drop(&mut self) {
        self.buffer.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FileBitField;
    use crate::stream::StegoWriter;
    use rand::rngs::OsRng;

    fn roundtrip(payload: &[u8]) -> (Vec<u8>, f32) {
        let dir = tempfile::tempdir().unwrap();
        let field =
            FileBitField::create(dir.path().join("blob"), 256 * 1024, &mut OsRng).unwrap();
        let key = b"reader-roundtrip-key";

        let mut writer = StegoWriter::new(
            &field,
            CipherTrail::from_key(key).unwrap(),
            ArmorChain::default_chain().unwrap(),
        );
        writer.write(payload).unwrap();
        let length = writer.finish().unwrap();
        assert_eq!(length, payload.len() as u64);

        let mut reader = StegoReader::new(
            &field,
            CipherTrail::from_key(key).unwrap(),
            ArmorChain::default_chain().unwrap(),
            length,
        );
        let out = reader.read_to_vec().unwrap();
        (out, reader.error_ratio())
    }

    #[test]
    fn test_single_block_roundtrip() {
        let payload = b"testdata".repeat(16);
        let (out, ratio) = roundtrip(&payload);
        assert_eq!(out, payload);
        assert_eq!(ratio, 0.0);
    }

    #[test]
    fn test_multi_block_roundtrip() {
        let payload: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
        let (out, _) = roundtrip(&payload);
        assert_eq!(out, payload);
    }

    #[test]
    fn test_partial_reads_stay_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let field =
            FileBitField::create(dir.path().join("blob"), 256 * 1024, &mut OsRng).unwrap();
        let key = b"reader-partial-key";
        let payload: Vec<u8> = (0..300).map(|i| (i * 3) as u8).collect();

        let mut writer = StegoWriter::new(
            &field,
            CipherTrail::from_key(key).unwrap(),
            ArmorChain::default_chain().unwrap(),
        );
        writer.write(&payload).unwrap();
        let length = writer.finish().unwrap();

        let mut reader = StegoReader::new(
            &field,
            CipherTrail::from_key(key).unwrap(),
            ArmorChain::default_chain().unwrap(),
            length,
        );
        let mut out = Vec::new();
        let mut chunk = [0u8; 37];
        loop {
            let got = reader.read(&mut chunk).unwrap();
            if got == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..got]);
        }
        assert_eq!(out, payload);
    }

    #[test]
    fn test_wrong_key_yields_garbage_or_total_loss() {
        let dir = tempfile::tempdir().unwrap();
        let field =
            FileBitField::create(dir.path().join("blob"), 256 * 1024, &mut OsRng).unwrap();
        let payload = b"confidential".repeat(10);

        let mut writer = StegoWriter::new(
            &field,
            CipherTrail::from_key(b"right-key").unwrap(),
            ArmorChain::default_chain().unwrap(),
        );
        writer.write(&payload).unwrap();
        let length = writer.finish().unwrap();

        let mut reader = StegoReader::new(
            &field,
            CipherTrail::from_key(b"wrong-key").unwrap(),
            ArmorChain::default_chain().unwrap(),
            length,
        );
        let out = reader.read_to_vec().unwrap();
        assert_ne!(out, payload);
    }
}
