//! Reveal-only bitfield over any seekable byte source.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::config::FILE_SALT_SIZE;
use crate::crypto::FileSalt;
use crate::error::{Error, Result};
use crate::field::{resolve, BitField};

/// Seekable byte source a cursor factory can hand out.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

type CursorFactory = Box<dyn Fn() -> Result<Box<dyn ReadSeek>> + Send + Sync>;

/// Read-only bitfield.
///
/// No mutation means no per-byte locking: each concurrent reader draws
/// its own cursor from the pool, produced on demand by the factory, so
/// seek positions never interleave. `set_bit` always fails.
pub struct ReadonlyBitField {
    factory: CursorFactory,
    pool: Mutex<Vec<Box<dyn ReadSeek>>>,
    data_len: u64,
    salt: FileSalt,
    closed: AtomicBool,
}

impl ReadonlyBitField {
    /// Wraps a cursor factory, reading the salt and total length once.
    pub fn new(factory: CursorFactory) -> Result<Self> {
        let mut cursor = factory()?;
        let total = cursor.seek(SeekFrom::End(0))?;
        // The salt alone is not a blob; there must be a data area behind it.
        if total <= FILE_SALT_SIZE as u64 {
            return Err(Error::InvalidConfig(format!(
                "source of {total} bytes holds no data area"
            )));
        }
        cursor.seek(SeekFrom::Start(0))?;
        let mut salt_bytes = vec![0u8; FILE_SALT_SIZE];
        cursor.read_exact(&mut salt_bytes)?;

        Ok(Self {
            factory,
            pool: Mutex::new(vec![cursor]),
            data_len: total - FILE_SALT_SIZE as u64,
            salt: FileSalt::from_bytes(salt_bytes)?,
            closed: AtomicBool::new(false),
        })
    }

    /// Read-only view of a blob file on disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        Self::new(Box::new(move || {
            let file = File::open(&path)?;
            Ok(Box::new(file) as Box<dyn ReadSeek>)
        }))
    }

    fn checkout(&self) -> Result<Box<dyn ReadSeek>> {
        if let Ok(mut pool) = self.pool.lock() {
            if let Some(cursor) = pool.pop() {
                return Ok(cursor);
            }
        }
        (self.factory)()
    }

    fn check_in(&self, cursor: Box<dyn ReadSeek>) {
        if let Ok(mut pool) = self.pool.lock() {
            pool.push(cursor);
        }
    }

    /// Drops all pooled cursors and refuses further reads.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut pool) = self.pool.lock() {
            pool.clear();
        }
    }
}

impl BitField for ReadonlyBitField {
    fn get_bit(&self, address: u64) -> Result<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let (byte_addr, mask) = resolve(address, self.data_len);
        let mut cursor = self.checkout()?;
        cursor.seek(SeekFrom::Start(FILE_SALT_SIZE as u64 + byte_addr))?;
        let mut byte = [0u8];
        cursor.read_exact(&mut byte)?;
        self.check_in(cursor);
        Ok(byte[0] & mask != 0)
    }

    fn set_bit(&self, _address: u64, _state: bool) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn salt(&self) -> &FileSalt {
        &self.salt
    }

    fn data_len(&self) -> u64 {
        self.data_len
    }
}
