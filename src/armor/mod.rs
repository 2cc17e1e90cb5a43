//! Forward error correction armor.
//!
//! Payload bytes pass through a chain of coders before landing in a
//! bitfield: an outer Reed-Solomon erasure layer recovers from whole
//! shards going missing, and an inner extended Hamming layer turns
//! individual flipped bits into either corrections or per-byte erasure
//! flags the outer layer can consume. Decoding is soft throughout, a
//! damaged block yields zeroed bytes with flags and an error ratio
//! rather than a hard failure.

mod chain;
mod hamming;
mod packet;
mod reed_solomon;

pub use chain::{ArmorChain, ArmorCoder};
pub use hamming::HammingCoder;
pub use packet::{DecodedPacket, EncodingPacket};
pub use reed_solomon::ReedSolomonCoder;
