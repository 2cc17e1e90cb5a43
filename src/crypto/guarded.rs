//! Guarded secret buffers with guaranteed zero-on-release.

use crate::config::FILE_SALT_SIZE;
use crate::error::{Error, Result};
use rand::{CryptoRng, RngCore};
use std::ops::{Deref, DerefMut};
use zeroize::Zeroize;

/// Owned byte buffer that is zeroed when dropped.
///
/// Base resource for all secret material: key bytes, plaintext blocks,
/// armored blocks and slice windows all live in one of these while they
/// are sensitive.
#[derive(Default)]
pub struct GuardedBuffer {
    bytes: Vec<u8>,
}

impl GuardedBuffer {
    /// Take ownership of existing bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Zero-filled buffer of the given size.
    pub fn zeroed(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len],
        }
    }

    /// Random-filled buffer of the given size.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R, len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Consume the buffer, handing the bytes to the caller.
    ///
    /// The caller takes over the obligation to erase them.
    pub fn into_bytes(mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Deref for GuardedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for GuardedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for GuardedBuffer {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for GuardedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GuardedBuffer({} bytes)", self.bytes.len())
    }
}

/// Per-blob salt stored at the head of every bitfield.
///
/// Read once at store construction and mixed into every passphrase trail
/// derived against that blob.
pub struct FileSalt {
    bytes: GuardedBuffer,
}

impl FileSalt {
    /// Fresh random salt for a new bitfield.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            bytes: GuardedBuffer::random(rng, FILE_SALT_SIZE),
        }
    }

    /// Wrap salt bytes read back from a blob.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != FILE_SALT_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: FILE_SALT_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes: GuardedBuffer::new(bytes),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Clone for FileSalt {
    fn clone(&self) -> Self {
        Self {
            bytes: GuardedBuffer::new(self.bytes.to_vec()),
        }
    }
}

/// Extra salt mixed into metadata trail derivation.
///
/// The size itself carries entropy: a fresh nonce is `minimum` bytes plus
/// one for every four leading 1-bits drawn from the RNG, so an attacker
/// cannot know how long a value to search for.
pub struct Nonce {
    bytes: GuardedBuffer,
}

impl Nonce {
    /// Wrap explicit nonce bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: GuardedBuffer::new(bytes),
        }
    }

    /// Fresh random nonce of geometrically random size.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R, minimum: usize) -> Self {
        let size = Self::random_size(rng, minimum);
        Self {
            bytes: GuardedBuffer::random(rng, size),
        }
    }

    /// `minimum` plus a quarter of the count of continuous 1-bits drawn
    /// from the RNG.
    pub fn random_size<R: RngCore + CryptoRng>(rng: &mut R, minimum: usize) -> usize {
        let mut run = 0usize;
        while (rng.next_u32() & 1) == 1 {
            run += 1;
        }
        minimum + run / 4
    }

    /// Advance this nonce by one as a little-endian odometer.
    ///
    /// `origin` is the starting value of the sweep; returns false once the
    /// odometer has wrapped all the way back around to it, meaning every
    /// value of this length has been visited.
    pub fn increment_and_check(&mut self, origin: &[u8]) -> Result<bool> {
        if self.bytes.len() != origin.len() {
            return Err(Error::InvalidKeyLength {
                expected: origin.len(),
                actual: self.bytes.len(),
            });
        }
        for (current, start) in self.bytes.iter_mut().zip(origin.iter()) {
            *current = current.wrapping_add(1);
            if current != start {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_guarded_buffer_roundtrip() {
        let buf = GuardedBuffer::new(vec![1, 2, 3]);
        assert_eq!(&*buf, &[1, 2, 3]);
        assert_eq!(buf.into_bytes(), vec![1, 2, 3]);
    }

    #[test]
    fn test_file_salt_rejects_wrong_size() {
        assert!(FileSalt::from_bytes(vec![0u8; 16]).is_err());
        assert!(FileSalt::from_bytes(vec![0u8; FILE_SALT_SIZE]).is_ok());
    }

    #[test]
    fn test_fresh_salts_differ() {
        let a = FileSalt::generate(&mut OsRng);
        let b = FileSalt::generate(&mut OsRng);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_nonce_increment_wraps() {
        let origin = vec![0u8, 0u8];
        let mut nonce = Nonce::from_bytes(origin.clone());
        let mut steps = 0u64;
        while nonce.increment_and_check(&origin).unwrap() {
            steps += 1;
        }
        // Every two-byte value except the origin itself.
        assert_eq!(steps, 256 * 256 - 1);
    }

    #[test]
    fn test_nonce_increment_carries() {
        let origin = vec![5u8, 9u8];
        let mut nonce = Nonce::from_bytes(vec![0xff, 3]);
        assert!(nonce.increment_and_check(&origin).unwrap());
        assert_eq!(nonce.as_bytes(), &[0, 4]);
    }

    #[test]
    fn test_nonce_size_at_least_minimum() {
        for _ in 0..32 {
            assert!(Nonce::random_size(&mut OsRng, 3) >= 3);
        }
    }
}
