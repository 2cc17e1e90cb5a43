//! Chainable armoring codecs.
//!
//! An [`ArmorChain`] is an ordered pipeline of codecs, outermost first,
//! fixed at construction. Encoding recursively splits the payload to each
//! codec's plaintext block size and re-armors every produced shard through
//! the rest of the chain; decoding unwinds the layers in reverse, carrying
//! per-byte error flags so the outer erasure layer can reconstruct from
//! whatever the inner layers could not repair.

use crate::armor::packet::{DecodedPacket, EncodingPacket};
use crate::armor::{HammingCoder, ReedSolomonCoder};
use crate::config::{metadata_fields, reed_solomon_params};
use crate::crypto::GuardedBuffer;
use crate::error::{Error, Result};

/// One armoring codec in a chain.
pub trait ArmorCoder: Send + Sync {
    /// Largest plaintext block this codec accepts in one encode call.
    fn max_data(&self) -> usize;

    /// Armored block size this codec's decode expects (upper bound).
    fn max_source_data(&self) -> usize;

    /// Worst-case expansion factor of armored text over plaintext.
    fn armor_factor(&self) -> usize;

    /// Armor one plaintext block into shards.
    fn encode(&self, input: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Decode one armored block, consuming the input packet.
    ///
    /// Data-level corruption is reported through the returned packet's
    /// error flags and ratio, never through `Err`.
    fn decode(&self, input: DecodedPacket) -> Result<DecodedPacket>;

    /// Armored length of `data_length` plaintext bytes through this codec
    /// and then the rest of the chain.
    fn armored_length(&self, data_length: usize, rest: &[Box<dyn ArmorCoder>]) -> Result<usize> {
        let expanded = data_length
            .checked_mul(self.armor_factor())
            .ok_or_else(|| Error::InvalidConfig("armored length overflow".into()))?;
        match rest.split_first() {
            Some((next, tail)) => next.armored_length(expanded, tail),
            None => Ok(expanded),
        }
    }
}

/// Ordered codec pipeline, outermost codec first.
pub struct ArmorChain {
    coders: Vec<Box<dyn ArmorCoder>>,
}

impl ArmorChain {
    /// Build a chain from codecs in outer-to-inner order.
    pub fn new(coders: Vec<Box<dyn ArmorCoder>>) -> Result<Self> {
        if coders.is_empty() {
            return Err(Error::InvalidConfig("armor chain needs a codec".into()));
        }
        Ok(Self { coders })
    }

    /// Default payload chain: ReedSolomon(128) then Hamming, roughly a 4x
    /// expansion with 128-erasure tolerance per super-block.
    pub fn default_chain() -> Result<Self> {
        Self::new(vec![
            Box::new(ReedSolomonCoder::new(
                reed_solomon_params::DEFAULT_DATA_LENGTH,
            )?),
            Box::new(HammingCoder::new()),
        ])
    }

    /// Chain used for hidden metadata records, sized to the record.
    pub fn metadata_chain() -> Result<Self> {
        Self::new(vec![
            Box::new(ReedSolomonCoder::new(metadata_fields::RECORD_LEN)?),
            Box::new(HammingCoder::new()),
        ])
    }

    /// Plaintext block size of the outermost codec.
    pub fn max_data(&self) -> usize {
        self.coders[0].max_data()
    }

    /// Total armored length of `data_length` plaintext bytes.
    pub fn armored_length(&self, data_length: usize) -> Result<usize> {
        self.coders[0].armored_length(data_length, &self.coders[1..])
    }

    /// Armored size of one full plaintext block: the unit the reveal side
    /// pulls from the bitfield per decode.
    pub fn source_packet_size(&self) -> Result<usize> {
        self.armored_length(self.max_data())
    }

    /// Armor plaintext through the whole chain into a flat byte sequence.
    pub fn encode_chain(&self, input: Vec<u8>) -> Result<GuardedBuffer> {
        let encoded = self.encode_at(0, EncodingPacket::wrap(input))?;
        Ok(encoded.flatten())
    }

    fn encode_at(&self, index: usize, packet: EncodingPacket) -> Result<EncodingPacket> {
        let coder = &self.coders[index];
        match packet.split(coder.max_data())? {
            EncodingPacket::Node(children) => {
                let encoded = children
                    .into_iter()
                    .map(|child| self.encode_at(index, child))
                    .collect::<Result<Vec<_>>>()?;
                Ok(EncodingPacket::Node(encoded))
            }
            EncodingPacket::Leaf(data) => {
                let shards = coder.encode(&data)?;
                drop(data);
                let mut children = Vec::with_capacity(shards.len());
                for shard in shards {
                    let child = EncodingPacket::wrap(shard);
                    let child = if index + 1 < self.coders.len() {
                        self.encode_at(index + 1, child)?
                    } else {
                        child
                    };
                    children.push(child);
                }
                Ok(EncodingPacket::Node(children))
            }
        }
    }

    /// Decode an armored block (with error flags) back to plaintext,
    /// unwinding the chain inner-first.
    pub fn decode_chain(&self, input: DecodedPacket) -> Result<DecodedPacket> {
        self.decode_at(0, input)
    }

    fn decode_at(&self, index: usize, input: DecodedPacket) -> Result<DecodedPacket> {
        let coder = &self.coders[index];

        // Unwind the inner layers first; their flags feed this layer.
        let middle = if index + 1 < self.coders.len() {
            let parts = input.split(self.coders[index + 1].max_source_data())?;
            let decoded = parts
                .into_iter()
                .map(|part| self.decode_at(index + 1, part))
                .collect::<Result<Vec<_>>>()?;
            DecodedPacket::join(decoded)?
        } else {
            input
        };

        let parts = middle.split(coder.max_source_data())?;
        let decoded = parts
            .into_iter()
            .map(|part| coder.decode(part))
            .collect::<Result<Vec<_>>>()?;
        DecodedPacket::join(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    #[test]
    fn test_default_chain_geometry() {
        let chain = ArmorChain::default_chain().unwrap();
        assert_eq!(chain.max_data(), 128);
        assert_eq!(chain.source_packet_size().unwrap(), 512);
    }

    #[test]
    fn test_metadata_chain_geometry() {
        let chain = ArmorChain::metadata_chain().unwrap();
        assert_eq!(chain.max_data(), 48);
        // (48 data + 128 parity) shards of 1 byte, doubled by Hamming.
        assert_eq!(chain.source_packet_size().unwrap(), 352);
    }

    #[test]
    fn test_armor_roundtrip_clean() {
        let chain = ArmorChain::default_chain().unwrap();
        for len in [1usize, 5, 127, 128, 129, 200, 512] {
            let data = payload(len);
            let armored = chain.encode_chain(data.clone()).unwrap();
            let decoded = chain
                .decode_chain(DecodedPacket::new_clean(armored.to_vec()))
                .unwrap();
            assert_eq!(&decoded.data()[..len], &data[..], "length {len}");
            assert_eq!(decoded.error_ratio(), 0.0, "length {len}");
        }
    }

    #[test]
    fn test_armor_roundtrip_with_scattered_bit_errors() {
        let chain = ArmorChain::default_chain().unwrap();
        let data = payload(128);
        let armored = chain.encode_chain(data.clone()).unwrap();
        let mut corrupted = armored.to_vec();
        // One flipped bit per 16-byte stride: correctable by Hamming alone.
        for i in (0..corrupted.len()).step_by(16) {
            corrupted[i] ^= 0x10;
        }
        let decoded = chain
            .decode_chain(DecodedPacket::new_clean(corrupted))
            .unwrap();
        assert_eq!(&decoded.data()[..128], &data[..]);
    }

    #[test]
    fn test_armor_total_loss_reports_ratio_one() {
        let chain = ArmorChain::default_chain().unwrap();
        let armored_len = chain.source_packet_size().unwrap();
        // Everything flagged on input: no shard survives.
        let input = DecodedPacket::new(
            vec![0u8; armored_len],
            vec![true; armored_len],
            1.0,
        )
        .unwrap();
        let decoded = chain.decode_chain(input).unwrap();
        assert_eq!(decoded.error_ratio(), 1.0);
        assert!(decoded.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_empty_chain_rejected() {
        assert!(ArmorChain::new(Vec::new()).is_err());
    }
}
