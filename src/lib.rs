//! Deniable steganographic storage in random bitfields.
//!
//! A blob is a file of cryptographically random bytes behind a 32-byte
//! salt. Hiding a payload never marks the blob in any recognizable way:
//! a passphrase-keyed [`CipherTrail`] maps every payload bit to a
//! pseudorandom (address, XOR mask) hop, and without the key the
//! written bits are indistinguishable from the noise around them.
//! Because unrelated trails share the blob and collide on bits, data
//! rides through a forward error correction [`ArmorChain`] sized to
//! absorb the damage.
//!
//! Layer by layer:
//!
//! - [`crypto`]: key derivation, trails, guarded secret buffers.
//! - [`armor`]: Reed-Solomon and Hamming coders with soft error
//!   propagation.
//! - [`field`]: bit-addressable storage over files, readonly sources
//!   and bounded in-memory windows.
//! - [`stream`]: the hide/reveal byte streams binding trails, armor and
//!   fields together.
//! - [`meta`]: deniable metadata records and the brute-force discovery
//!   that finds them again.

pub mod armor;
pub mod config;
pub mod crypto;
pub mod error;
pub mod field;
pub mod meta;
pub mod stream;

pub use armor::{ArmorChain, ArmorCoder, DecodedPacket, EncodingPacket, HammingCoder, ReedSolomonCoder};
pub use crypto::{CipherTrail, FileSalt, GuardedBuffer, Hop, Nonce};
pub use error::{Error, Result};
pub use field::{
    default_window_size, BitField, FieldSlice, FileBitField, LockMap, ReadonlyBitField,
};
pub use meta::{find, hide, hide_with_nonce, reveal, Metadata};
pub use stream::{StegoReader, StegoWriter};
