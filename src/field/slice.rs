//! Bounded in-memory window over a larger bitfield.

use std::io::Write;
use std::sync::Mutex;

use rand::{CryptoRng, RngCore};
use tracing::{debug, trace};

use crate::config::MAX_WINDOW_SIZE;
use crate::crypto::{FileSalt, GuardedBuffer};
use crate::error::{Error, Result};
use crate::field::{resolve, BitField};

/// One contiguous window of a blob's data area, materialized in memory.
///
/// Bit operations landing inside the window hit the buffer. Reads
/// outside fall through to an optional read-only backing field, or fail
/// without one. Writes outside are silently dropped, the slice cannot
/// mutate data it does not hold. Closing flushes the window once, in
/// order, to the output sink, so a blob of any size can be produced or
/// transformed window by window in fixed memory.
pub struct FieldSlice<W: Write + Send> {
    window: Mutex<GuardedBuffer>,
    window_start: u64,
    window_len: u64,
    data_len: u64,
    salt: FileSalt,
    backing: Option<Box<dyn BitField>>,
    sink: Mutex<W>,
}

/// Window size for a blob of `data_len` bytes.
pub fn default_window_size(data_len: u64) -> usize {
    data_len.min(MAX_WINDOW_SIZE as u64) as usize
}

impl<W: Write + Send> FieldSlice<W> {
    fn validate(data_len: u64, window_start: u64, window_len: usize) -> Result<()> {
        if window_len == 0 || window_len > MAX_WINDOW_SIZE {
            return Err(Error::InvalidConfig(format!(
                "window size {window_len} out of range"
            )));
        }
        if window_start + window_len as u64 > data_len {
            return Err(Error::InvalidConfig(format!(
                "window [{window_start}, {}) exceeds data area of {data_len} bytes",
                window_start + window_len as u64
            )));
        }
        Ok(())
    }

    /// Random-filled window for producing a fresh blob.
    pub fn random<R: RngCore + CryptoRng>(
        rng: &mut R,
        salt: FileSalt,
        data_len: u64,
        window_start: u64,
        window_len: usize,
        sink: W,
    ) -> Result<Self> {
        Self::validate(data_len, window_start, window_len)?;
        Ok(Self {
            window: Mutex::new(GuardedBuffer::random(rng, window_len)),
            window_start,
            window_len: window_len as u64,
            data_len,
            salt,
            backing: None,
            sink: Mutex::new(sink),
        })
    }

    /// Window loaded from an existing backing field, for transforming a
    /// blob in place. Out-of-window reads also go to the backing field.
    pub fn from_backing(
        backing: Box<dyn BitField>,
        window_start: u64,
        window_len: usize,
        sink: W,
    ) -> Result<Self> {
        let data_len = backing.data_len();
        Self::validate(data_len, window_start, window_len)?;
        let mut window = GuardedBuffer::zeroed(window_len);
        for (i, byte) in window.iter_mut().enumerate() {
            let base = (window_start + i as u64) * 8;
            for bit in 0..8 {
                if backing.get_bit(base + bit)? {
                    *byte |= 1 << bit;
                }
            }
        }
        Ok(Self {
            window: Mutex::new(window),
            window_start,
            window_len: window_len as u64,
            data_len,
            salt: backing.salt().clone(),
            backing: Some(backing),
            sink: Mutex::new(sink),
        })
    }

    /// Flushes the window to the sink and hands the sink back.
    pub fn close(self) -> Result<W> {
        let window = self
            .window
            .into_inner()
            .map_err(|_| Error::Closed)?;
        let mut sink = self.sink.into_inner().map_err(|_| Error::Closed)?;
        sink.write_all(&window)?;
        sink.flush()?;
        debug!(
            window_start = self.window_start,
            window_len = self.window_len,
            "flushed slice window"
        );
        Ok(sink)
    }
}

impl<W: Write + Send> BitField for FieldSlice<W> {
    fn get_bit(&self, address: u64) -> Result<bool> {
        let (byte_addr, mask) = resolve(address, self.data_len);
        if byte_addr >= self.window_start && byte_addr < self.window_start + self.window_len {
            let window = self.window.lock().map_err(|_| Error::Closed)?;
            return Ok(window[(byte_addr - self.window_start) as usize] & mask != 0);
        }
        match &self.backing {
            Some(backing) => backing.get_bit(address),
            None => Err(Error::OutsideWindow(byte_addr)),
        }
    }

    fn set_bit(&self, address: u64, state: bool) -> Result<()> {
        let (byte_addr, mask) = resolve(address, self.data_len);
        if byte_addr < self.window_start || byte_addr >= self.window_start + self.window_len {
            trace!(byte_addr, "dropping write outside slice window");
            return Ok(());
        }
        let mut window = self.window.lock().map_err(|_| Error::Closed)?;
        let byte = &mut window[(byte_addr - self.window_start) as usize];
        if state {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
        Ok(())
    }

    fn salt(&self) -> &FileSalt {
        &self.salt
    }

    fn data_len(&self) -> u64 {
        self.data_len
    }
}
