//! Deniable metadata records and payload orchestration.
//!
//! A hidden payload is written on its own trail under a random data
//! key. A small fixed-layout record (marker runway, data key, length)
//! then points at it, hidden on a second trail derived from the
//! passphrase, the blob salt and a variable-length random nonce. The
//! nonce length is never stored anywhere; recovering the record means
//! brute-forcing nonce values until a decoded candidate shows the
//! marker runway, so nothing in the blob betrays whether a record
//! exists at all.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use rand::{CryptoRng, RngCore};
use tracing::{debug, info};
use zeroize::Zeroize;

use crate::armor::ArmorChain;
use crate::config::metadata_fields::{KEY_LEN, LENGTH_LEN, RECORD_LEN, RUNWAY_LEN, RUNWAY_MARKER};
use crate::config::DEFAULT_MINIMUM_NONCE_SIZE;
use crate::crypto::{CipherTrail, GuardedBuffer, Nonce};
use crate::error::{Error, Result};
use crate::field::BitField;
use crate::stream::{StegoReader, StegoWriter};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Fixed-layout record pointing at one hidden payload.
///
/// Layout: 8 marker bytes of all-1 bits, a 32-byte data key, and the
/// payload length as a big-endian u64. The marker is what discovery
/// recognizes; a wrong nonce or passphrase decodes to noise that fails
/// the marker check with probability 1 - 2^-64.
pub struct Metadata {
    bytes: GuardedBuffer,
}

impl Metadata {
    pub fn new(key: &[u8], length: u64) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(Error::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }
        let mut bytes = GuardedBuffer::zeroed(RECORD_LEN);
        bytes[..RUNWAY_LEN].fill(RUNWAY_MARKER);
        bytes[RUNWAY_LEN..RUNWAY_LEN + KEY_LEN].copy_from_slice(key);
        bytes[RUNWAY_LEN + KEY_LEN..].copy_from_slice(&length.to_be_bytes());
        Ok(Self { bytes })
    }

    /// Wraps a decoded record candidate. Length is checked here; whether
    /// the candidate is real is [`is_valid`](Self::is_valid)'s call.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != RECORD_LEN {
            return Err(Error::InvalidMetadata);
        }
        Ok(Self {
            bytes: GuardedBuffer::new(bytes),
        })
    }

    /// True when the marker runway decoded intact.
    pub fn is_valid(&self) -> bool {
        self.bytes[..RUNWAY_LEN].iter().all(|&b| b == RUNWAY_MARKER)
    }

    pub fn key(&self) -> &[u8] {
        &self.bytes[RUNWAY_LEN..RUNWAY_LEN + KEY_LEN]
    }

    pub fn length(&self) -> u64 {
        let mut raw = [0u8; LENGTH_LEN];
        raw.copy_from_slice(&self.bytes[RUNWAY_LEN + KEY_LEN..]);
        u64::from_be_bytes(raw)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Hides a payload stream under `passphrase`, with a fresh random nonce.
///
/// Returns the payload length.
pub fn hide<R: RngCore + CryptoRng>(
    field: &dyn BitField,
    passphrase: &[u8],
    payload: &mut dyn Read,
    rng: &mut R,
) -> Result<u64> {
    let nonce = Nonce::generate(rng, DEFAULT_MINIMUM_NONCE_SIZE);
    hide_with_nonce(field, passphrase, &nonce, payload, rng)
}

/// Hides a payload stream using an explicit nonce.
pub fn hide_with_nonce<R: RngCore + CryptoRng>(
    field: &dyn BitField,
    passphrase: &[u8],
    nonce: &Nonce,
    payload: &mut dyn Read,
    rng: &mut R,
) -> Result<u64> {
    let key = GuardedBuffer::random(rng, KEY_LEN);
    let mut writer = StegoWriter::new(
        field,
        CipherTrail::from_key(&key)?,
        ArmorChain::default_chain()?,
    );
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        let got = payload.read(&mut buf)?;
        if got == 0 {
            break;
        }
        writer.write(&buf[..got])?;
    }
    buf.zeroize();
    let length = writer.finish()?;

    let record = Metadata::new(&key, length)?;
    let trail = CipherTrail::from_passphrase(field.salt(), passphrase, nonce.as_bytes())?;
    let mut record_writer = StegoWriter::new(field, trail, ArmorChain::metadata_chain()?);
    record_writer.write(record.as_bytes())?;
    record_writer.finish()?;
    info!(length, nonce_len = nonce.len(), "payload hidden");
    Ok(length)
}

/// Brute-forces the metadata record for `passphrase`.
///
/// Sweeps nonce lengths from zero upward, each length from a random
/// starting value through the whole odometer. Unbounded by design; the
/// cancellation flag is the only way out when the passphrase is wrong.
pub fn find<R: RngCore + CryptoRng>(
    field: &dyn BitField,
    passphrase: &[u8],
    rng: &mut R,
    cancelled: &AtomicBool,
) -> Result<Metadata> {
    let mut nonce_len = 0usize;
    loop {
        debug!(nonce_len, "sweeping nonce length");
        let mut origin = vec![0u8; nonce_len];
        rng.fill_bytes(&mut origin);
        let mut nonce = Nonce::from_bytes(origin.clone());
        loop {
            if cancelled.load(Ordering::Relaxed) {
                origin.zeroize();
                return Err(Error::SearchCancelled);
            }
            if let Some(record) = try_candidate(field, passphrase, nonce.as_bytes())? {
                origin.zeroize();
                return Ok(record);
            }
            if !nonce.increment_and_check(&origin)? {
                break;
            }
        }
        origin.zeroize();
        nonce_len += 1;
    }
}

fn try_candidate(
    field: &dyn BitField,
    passphrase: &[u8],
    nonce: &[u8],
) -> Result<Option<Metadata>> {
    let trail = CipherTrail::from_passphrase(field.salt(), passphrase, nonce)?;
    let mut reader = StegoReader::new(field, trail, ArmorChain::metadata_chain()?, RECORD_LEN as u64);
    let record = Metadata::from_bytes(reader.read_to_vec()?)?;
    if record.is_valid() {
        info!(nonce_len = nonce.len(), "metadata record found");
        Ok(Some(record))
    } else {
        Ok(None)
    }
}

/// Streams the payload a record points at into `out`.
///
/// Returns the worst per-block error ratio seen while decoding.
pub fn reveal(field: &dyn BitField, record: &Metadata, out: &mut dyn Write) -> Result<f32> {
    let mut reader = StegoReader::new(
        field,
        CipherTrail::from_key(record.key())?,
        ArmorChain::default_chain()?,
        record.length(),
    );
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        let got = reader.read(&mut buf)?;
        if got == 0 {
            break;
        }
        out.write_all(&buf[..got])?;
    }
    buf.zeroize();
    out.flush()?;
    Ok(reader.error_ratio())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FileBitField;
    use rand::rngs::OsRng;

    #[test]
    fn test_record_layout() {
        let key = [0x42u8; KEY_LEN];
        let record = Metadata::new(&key, 1234).unwrap();
        assert!(record.is_valid());
        assert_eq!(record.key(), &key);
        assert_eq!(record.length(), 1234);
        assert_eq!(record.as_bytes().len(), RECORD_LEN);
    }

    #[test]
    fn test_noise_candidate_invalid() {
        let record = Metadata::from_bytes(vec![0x3cu8; RECORD_LEN]).unwrap();
        assert!(!record.is_valid());
    }

    #[test]
    fn test_wrong_record_size_rejected() {
        assert!(Metadata::from_bytes(vec![0u8; 47]).is_err());
        assert!(Metadata::new(&[0u8; 16], 1).is_err());
    }

    #[test]
    fn test_hide_find_reveal_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let field =
            FileBitField::create(dir.path().join("blob"), 512 * 1024, &mut OsRng).unwrap();
        let payload = b"hidden in plain sight".repeat(8);

        // Empty nonce keeps the search space trivial for the test.
        let nonce = Nonce::from_bytes(Vec::new());
        let length = hide_with_nonce(
            &field,
            b"correct horse",
            &nonce,
            &mut &payload[..],
            &mut OsRng,
        )
        .unwrap();
        assert_eq!(length, payload.len() as u64);

        let cancelled = AtomicBool::new(false);
        let record = find(&field, b"correct horse", &mut OsRng, &cancelled).unwrap();
        assert_eq!(record.length(), length);

        let mut out = Vec::new();
        let ratio = reveal(&field, &record, &mut out).unwrap();
        assert_eq!(out, payload);
        assert_eq!(ratio, 0.0);
    }

    #[test]
    fn test_cancelled_search_stops() {
        let dir = tempfile::tempdir().unwrap();
        let field =
            FileBitField::create(dir.path().join("blob"), 128 * 1024, &mut OsRng).unwrap();
        let cancelled = AtomicBool::new(true);
        assert!(matches!(
            find(&field, b"nothing here", &mut OsRng, &cancelled),
            Err(Error::SearchCancelled)
        ));
    }
}
