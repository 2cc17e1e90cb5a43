//! Addressable single-bit storage.
//!
//! Everything a trail touches goes through the [`BitField`] capability:
//! get or set one bit at a 64-bit address. Addresses wrap modulo the
//! field's data bit length, so unrelated trails tile the same finite
//! blob and a trail never runs off the end. Three implementations:
//! [`FileBitField`] for mutable file-backed blobs, [`ReadonlyBitField`]
//! for reveal-only access over any seekable source, and [`FieldSlice`]
//! for producing arbitrarily large blobs in bounded memory.

mod file;
mod lock_map;
mod readonly;
mod slice;

use crate::crypto::FileSalt;
use crate::error::Result;

pub use file::FileBitField;
pub use lock_map::{LockGuard, LockMap};
pub use readonly::{ReadSeek, ReadonlyBitField};
pub use slice::{default_window_size, FieldSlice};

/// Single-bit access over a salted blob.
pub trait BitField: Send + Sync {
    /// Reads the bit at `address` modulo the data bit length.
    fn get_bit(&self, address: u64) -> Result<bool>;

    /// Writes the bit at `address` modulo the data bit length.
    fn set_bit(&self, address: u64, state: bool) -> Result<()>;

    /// Per-blob salt mixed into trail derivation.
    fn salt(&self) -> &FileSalt;

    /// Size of the data area in bytes, excluding the salt.
    fn data_len(&self) -> u64;
}

/// Maps a bit address onto (byte offset within the data area, bit mask).
pub(crate) fn resolve(address: u64, data_len: u64) -> (u64, u8) {
    let bit = address % (data_len * 8);
    (bit / 8, 1 << (bit % 8))
}
