//! Cryptographic primitives for bitstego.
//!
//! This module provides:
//! - Guarded buffers, file salts and searchable nonces
//! - Argon2d derivation of trail key material
//! - The keyed pseudorandom [`CipherTrail`] hop generator

mod guarded;
mod kdf;
mod trail;

pub use guarded::{FileSalt, GuardedBuffer, Nonce};
pub use kdf::{derive_from_key, derive_from_passphrase};
pub use trail::{CipherTrail, Hop};
