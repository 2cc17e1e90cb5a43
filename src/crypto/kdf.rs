//! Argon2d derivation of trail key material.

use crate::config::{argon2_params, KEY_MATERIAL_BYTES};
use crate::crypto::guarded::{FileSalt, GuardedBuffer};
use crate::error::{Error, Result};
use argon2::{Algorithm, Argon2, Params, Version};

fn params() -> Result<Params> {
    Params::new(
        argon2_params::MEMORY_COST,
        argon2_params::TIME_COST,
        argon2_params::PARALLELISM,
        Some(KEY_MATERIAL_BYTES),
    )
    .map_err(|e| Error::KeyDerivation(e.to_string()))
}

/// Derive the 80 bytes of key/IV material for a passphrase trail.
///
/// The passphrase is the Argon2 password input; the per-blob file salt
/// concatenated with the nonce is the secret input. The Argon2 salt itself
/// is a fixed domain-separation constant, so two blobs never share a trail
/// even under the same passphrase and nonce.
pub fn derive_from_passphrase(
    salt: &FileSalt,
    passphrase: &[u8],
    nonce: &[u8],
) -> Result<GuardedBuffer> {
    let mut secret = GuardedBuffer::zeroed(salt.as_bytes().len() + nonce.len());
    secret[..salt.as_bytes().len()].copy_from_slice(salt.as_bytes());
    secret[salt.as_bytes().len()..].copy_from_slice(nonce);

    let argon2 = Argon2::new_with_secret(&secret, Algorithm::Argon2d, Version::V0x13, params()?)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;

    let mut material = GuardedBuffer::zeroed(KEY_MATERIAL_BYTES);
    argon2
        .hash_password_into(passphrase, argon2_params::DOMAIN_SALT, &mut material)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;
    Ok(material)
}

/// Derive key/IV material from an already-random data key.
///
/// Same KDF, no secret input: the key is unique per hidden payload, so no
/// further diversification is needed.
pub fn derive_from_key(key: &[u8]) -> Result<GuardedBuffer> {
    if key.is_empty() {
        return Err(Error::InvalidKeyLength {
            expected: 1,
            actual: 0,
        });
    }
    let argon2 = Argon2::new(Algorithm::Argon2d, Version::V0x13, params()?);

    let mut material = GuardedBuffer::zeroed(KEY_MATERIAL_BYTES);
    argon2
        .hash_password_into(key, argon2_params::DOMAIN_SALT, &mut material)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;
    Ok(material)
}
