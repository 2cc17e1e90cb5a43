//! Secure-erasing packet containers for armoring.
//!
//! [`EncodingPacket`] is the encode-side tree: a leaf owns plaintext or
//! shard bytes, an internal node owns child packets in document order.
//! Destruction is expressed through ownership: every operation that would
//! invalidate a packet consumes it, so use-after-destroy does not compile,
//! and leaf buffers are zeroed by [`GuardedBuffer`] as they are dropped.
//!
//! [`DecodedPacket`] is the decode-side value: a flat byte buffer with a
//! parallel per-byte error flag array and an aggregate error ratio that
//! survives splitting and joining as a length-weighted average.

use crate::crypto::GuardedBuffer;
use crate::error::{Error, Result};
use zeroize::Zeroize;

/// Encode-side packet tree node.
pub enum EncodingPacket {
    /// Owns a byte buffer, zeroed on drop.
    Leaf(GuardedBuffer),
    /// Owns an ordered sequence of child packets.
    Node(Vec<EncodingPacket>),
}

impl EncodingPacket {
    /// Wrap raw bytes as a leaf, taking over their erasure obligation.
    pub fn wrap(bytes: Vec<u8>) -> Self {
        EncodingPacket::Leaf(GuardedBuffer::new(bytes))
    }

    /// Wrap child packets as an internal node.
    pub fn from_children(children: Vec<EncodingPacket>) -> Self {
        EncodingPacket::Node(children)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, EncodingPacket::Leaf(_))
    }

    /// Total leaf bytes in document order.
    pub fn total_len(&self) -> usize {
        match self {
            EncodingPacket::Leaf(data) => data.len(),
            EncodingPacket::Node(children) => children.iter().map(|c| c.total_len()).sum(),
        }
    }

    /// Re-partition an oversized leaf into a node of leaves each at most
    /// `max_size` bytes, preserving byte order. Nodes and leaves already
    /// within bounds are returned unchanged.
    pub fn split(self, max_size: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(Error::InvalidConfig("split size must be non-zero".into()));
        }
        let data = match self {
            EncodingPacket::Leaf(data) if data.len() > max_size => data,
            other => return Ok(other),
        };
        let children = data
            .chunks(max_size)
            .map(|chunk| EncodingPacket::wrap(chunk.to_vec()))
            .collect();
        // `data` drops here, zeroing the un-split original.
        Ok(EncodingPacket::Node(children))
    }

    /// Depth-first concatenation of all leaf bytes in document order,
    /// consuming (and thereby erasing) the tree.
    pub fn flatten(self) -> GuardedBuffer {
        let mut out = GuardedBuffer::zeroed(self.total_len());
        let mut cursor = 0;
        self.flatten_into(&mut out, &mut cursor);
        out
    }

    fn flatten_into(self, out: &mut GuardedBuffer, cursor: &mut usize) {
        match self {
            EncodingPacket::Leaf(data) => {
                out[*cursor..*cursor + data.len()].copy_from_slice(&data);
                *cursor += data.len();
            }
            EncodingPacket::Node(children) => {
                for child in children {
                    child.flatten_into(out, cursor);
                }
            }
        }
    }
}

/// Decode-side packet: bytes, per-byte error flags, aggregate error ratio.
pub struct DecodedPacket {
    data: Vec<u8>,
    flags: Vec<bool>,
    error_ratio: f32,
}

impl DecodedPacket {
    /// Packet with no flagged bytes.
    pub fn new_clean(data: Vec<u8>) -> Self {
        let flags = vec![false; data.len()];
        Self {
            data,
            flags,
            error_ratio: 0.0,
        }
    }

    /// Packet with explicit flags and ratio. The byte and flag arrays must
    /// be the same length; a mismatch is a configuration error.
    pub fn new(data: Vec<u8>, flags: Vec<bool>, error_ratio: f32) -> Result<Self> {
        if data.len() != flags.len() {
            return Err(Error::MismatchedPacket {
                data: data.len(),
                flags: flags.len(),
            });
        }
        Ok(Self {
            data,
            flags,
            error_ratio,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn flags(&self) -> &[bool] {
        &self.flags
    }

    /// Fraction of bytes flagged as errored, as propagated through
    /// joins and decodes. 1.0 means total loss.
    pub fn error_ratio(&self) -> f32 {
        self.error_ratio
    }

    /// Consume the packet, handing the bytes (and the erasure obligation)
    /// to the caller.
    pub fn take_data(mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    /// Partition bytes and flags consistently into pieces of at most
    /// `size` bytes, consuming this packet. Each piece inherits this
    /// packet's error ratio.
    pub fn split(mut self, size: usize) -> Result<Vec<DecodedPacket>> {
        if size == 0 {
            return Err(Error::InvalidConfig("split size must be non-zero".into()));
        }
        if size >= self.data.len() {
            return Ok(vec![self]);
        }
        let mut data = std::mem::take(&mut self.data);
        let flags = std::mem::take(&mut self.flags);
        let ratio = self.error_ratio;
        let parts = data
            .chunks(size)
            .zip(flags.chunks(size))
            .map(|(d, f)| DecodedPacket {
                data: d.to_vec(),
                flags: f.to_vec(),
                error_ratio: ratio,
            })
            .collect();
        data.zeroize();
        Ok(parts)
    }

    /// Concatenate packets in order, consuming them. The joined error
    /// ratio is the length-weighted average of the inputs.
    pub fn join(parts: Vec<DecodedPacket>) -> Result<DecodedPacket> {
        if parts.is_empty() {
            return Err(Error::InvalidConfig("cannot join zero packets".into()));
        }
        let total: usize = parts.iter().map(|p| p.len()).sum();
        let mut data = Vec::with_capacity(total);
        let mut flags = Vec::with_capacity(total);
        let mut weighted = 0.0f64;
        for mut part in parts {
            weighted += part.error_ratio as f64 * part.len() as f64;
            data.append(&mut part.data);
            flags.append(&mut part.flags);
        }
        let error_ratio = if total == 0 {
            0.0
        } else {
            (weighted / total as f64) as f32
        };
        Ok(DecodedPacket {
            data,
            flags,
            error_ratio,
        })
    }

    /// Compact out all flagged bytes, preserving order. Best-effort
    /// recovery only; the result has no position information.
    pub fn non_errored(&self) -> Vec<u8> {
        self.data
            .iter()
            .zip(self.flags.iter())
            .filter(|(_, &flagged)| !flagged)
            .map(|(&byte, _)| byte)
            .collect()
    }
}

impl Drop for DecodedPacket {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}
