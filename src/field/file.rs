//! Mutable file-backed bitfield.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use rand::{CryptoRng, RngCore};
use tracing::debug;

use crate::config::{FILE_SALT_SIZE, FILL_BUF_SIZE};
use crate::crypto::FileSalt;
use crate::error::{Error, Result};
use crate::field::lock_map::LockMap;
use crate::field::{resolve, BitField};

/// Bitfield over an ordinary file.
///
/// Layout is the 32-byte salt followed by the data area. Every bit
/// operation is a byte-granular read-modify-write against its own file
/// handle, drawn from a pool so concurrent workers never share a seek
/// position, and serialized per byte offset through a [`LockMap`] so
/// colliding trails cannot lose updates to each other.
pub struct FileBitField {
    path: PathBuf,
    data_len: u64,
    salt: FileSalt,
    locks: LockMap<u64>,
    pool: Mutex<Vec<File>>,
    closed: AtomicBool,
}

impl FileBitField {
    /// Creates a fresh blob of `data_len` random data bytes plus salt.
    pub fn create<P, R>(path: P, data_len: u64, rng: &mut R) -> Result<Self>
    where
        P: AsRef<Path>,
        R: RngCore + CryptoRng,
    {
        let path = path.as_ref().to_path_buf();
        if data_len == 0 {
            return Err(Error::InvalidConfig(
                "bitfield data size must be non-zero".into(),
            ));
        }
        let salt = FileSalt::generate(rng);
        let mut file = File::create(&path)?;
        file.write_all(salt.as_bytes())?;

        let mut buf = vec![0u8; FILL_BUF_SIZE];
        let mut remaining = data_len;
        while remaining > 0 {
            let chunk = remaining.min(FILL_BUF_SIZE as u64) as usize;
            rng.fill_bytes(&mut buf[..chunk]);
            file.write_all(&buf[..chunk])?;
            remaining -= chunk as u64;
        }
        file.sync_all()?;
        debug!(path = %path.display(), data_len, "created bitfield");

        Ok(Self {
            path,
            data_len,
            salt,
            locks: LockMap::new(),
            pool: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Opens an existing blob, reading its salt.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let total = std::fs::metadata(&path)?.len();
        // A blob must hold the salt plus at least one data byte.
        if total <= FILE_SALT_SIZE as u64 {
            return Err(Error::FieldTooSmall(path, total));
        }
        let mut file = File::open(&path)?;
        let mut salt_bytes = vec![0u8; FILE_SALT_SIZE];
        file.read_exact(&mut salt_bytes)?;

        Ok(Self {
            path,
            data_len: total - FILE_SALT_SIZE as u64,
            salt: FileSalt::from_bytes(salt_bytes)?,
            locks: LockMap::new(),
            pool: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    fn checkout(&self) -> Result<File> {
        if let Ok(mut pool) = self.pool.lock() {
            if let Some(file) = pool.pop() {
                return Ok(file);
            }
        }
        Ok(OpenOptions::new().read(true).write(true).open(&self.path)?)
    }

    fn check_in(&self, file: File) {
        if let Ok(mut pool) = self.pool.lock() {
            pool.push(file);
        }
    }

    fn read_byte(&self, file: &mut File, byte_addr: u64) -> Result<u8> {
        file.seek(SeekFrom::Start(FILE_SALT_SIZE as u64 + byte_addr))?;
        let mut byte = [0u8];
        file.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Refuses further bit operations and drains pooled handles.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.locks.close();
        if let Ok(mut pool) = self.pool.lock() {
            pool.clear();
        }
    }
}

impl BitField for FileBitField {
    fn get_bit(&self, address: u64) -> Result<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let (byte_addr, mask) = resolve(address, self.data_len);
        let _guard = self.locks.lock(byte_addr)?.ok_or(Error::Closed)?;
        let mut file = self.checkout()?;
        let byte = self.read_byte(&mut file, byte_addr)?;
        self.check_in(file);
        Ok(byte & mask != 0)
    }

    fn set_bit(&self, address: u64, state: bool) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let (byte_addr, mask) = resolve(address, self.data_len);
        let _guard = self.locks.lock(byte_addr)?.ok_or(Error::Closed)?;
        let mut file = self.checkout()?;
        let byte = self.read_byte(&mut file, byte_addr)?;
        let updated = if state { byte | mask } else { byte & !mask };
        if updated != byte {
            file.seek(SeekFrom::Start(FILE_SALT_SIZE as u64 + byte_addr))?;
            file.write_all(&[updated])?;
        }
        self.check_in(file);
        Ok(())
    }

    fn salt(&self) -> &FileSalt {
        &self.salt
    }

    fn data_len(&self) -> u64 {
        self.data_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use std::sync::Arc;

    fn temp_field(data_len: u64) -> (tempfile::TempDir, FileBitField) {
        let dir = tempfile::tempdir().unwrap();
        let field = FileBitField::create(dir.path().join("blob"), data_len, &mut OsRng).unwrap();
        (dir, field)
    }

    #[test]
    fn test_create_sizes_file() {
        let (dir, field) = temp_field(1024);
        assert_eq!(field.data_len(), 1024);
        let on_disk = std::fs::metadata(dir.path().join("blob")).unwrap().len();
        assert_eq!(on_disk, 1024 + FILE_SALT_SIZE as u64);
    }

    #[test]
    fn test_set_and_get_roundtrip() {
        let (_dir, field) = temp_field(64);
        for addr in [0u64, 7, 8, 200, 511] {
            field.set_bit(addr, true).unwrap();
            assert!(field.get_bit(addr).unwrap());
            field.set_bit(addr, false).unwrap();
            assert!(!field.get_bit(addr).unwrap());
        }
    }

    #[test]
    fn test_addresses_wrap() {
        let (_dir, field) = temp_field(16);
        field.set_bit(3, true).unwrap();
        // 16 bytes of data hold 128 bits.
        assert!(field.get_bit(3 + 128).unwrap());
        field.set_bit(3 + 256, false).unwrap();
        assert!(!field.get_bit(3).unwrap());
    }

    #[test]
    fn test_open_rereads_salt() {
        let (dir, field) = temp_field(64);
        let salt = field.salt().as_bytes().to_vec();
        field.close();
        let reopened = FileBitField::open(dir.path().join("blob")).unwrap();
        assert_eq!(reopened.salt().as_bytes(), &salt[..]);
        assert_eq!(reopened.data_len(), 64);
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny");
        std::fs::write(&path, [0u8; 8]).unwrap();
        assert!(matches!(
            FileBitField::open(&path),
            Err(Error::FieldTooSmall(_, 8))
        ));
    }

    #[test]
    fn test_zero_data_size_rejected() {
        // A salt with no data area behind it has no addressable bits; both
        // construction paths must refuse it before any bit math runs.
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FileBitField::create(dir.path().join("empty"), 0, &mut OsRng),
            Err(Error::InvalidConfig(_))
        ));

        let path = dir.path().join("salt-only");
        std::fs::write(&path, [0u8; FILE_SALT_SIZE]).unwrap();
        assert!(matches!(
            FileBitField::open(&path),
            Err(Error::FieldTooSmall(_, 32))
        ));
    }

    #[test]
    fn test_closed_field_refuses_ops() {
        let (_dir, field) = temp_field(64);
        field.close();
        assert!(matches!(field.get_bit(0), Err(Error::Closed)));
        assert!(matches!(field.set_bit(0, true), Err(Error::Closed)));
    }

    #[test]
    fn test_concurrent_set_bits_no_lost_updates() {
        // All 8 bits of one byte hammered from separate threads; every
        // set must land, so the byte ends up all-ones.
        let (_dir, field) = temp_field(64);
        for bit in 0..8 {
            field.set_bit(bit, false).unwrap();
        }
        let field = Arc::new(field);
        let mut handles = Vec::new();
        for bit in 0..8u64 {
            let field = Arc::clone(&field);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    field.set_bit(bit, true).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        for bit in 0..8 {
            assert!(field.get_bit(bit).unwrap());
        }
    }
}
