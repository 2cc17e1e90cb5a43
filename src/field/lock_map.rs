//! Keyed mutual exclusion for byte-granular field access.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::error::{Error, Result};
use tracing::warn;

const CLOSE_WAIT_ROUNDS: usize = 300;
const CLOSE_WAIT_STEP: Duration = Duration::from_millis(10);

/// Per-key lock table.
///
/// Holding a key excludes every other thread from that key until the
/// returned guard drops. A thread asking for a key it already holds is
/// a programming error and fails immediately rather than deadlocking.
/// Once [`close`](Self::close) has been called, new lock attempts
/// return `None` so callers can wind down cleanly.
#[derive(Debug)]
pub struct LockMap<K> {
    held: Mutex<HashMap<K, ThreadId>>,
    closing: AtomicBool,
}

/// Releases its key on drop.
#[derive(Debug)]
pub struct LockGuard<'a, K: Eq + Hash> {
    map: &'a LockMap<K>,
    key: K,
}

impl<K: Eq + Hash + Clone + Display> LockMap<K> {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            closing: AtomicBool::new(false),
        }
    }

    /// Blocks until `key` is free, then takes it.
    ///
    /// Returns `Ok(None)` when the map is closing and `Err` when the
    /// calling thread already holds `key`.
    pub fn lock(&self, key: K) -> Result<Option<LockGuard<'_, K>>> {
        let me = thread::current().id();
        loop {
            if self.closing.load(Ordering::Acquire) {
                return Ok(None);
            }
            {
                let mut held = self.held.lock().map_err(|_| Error::Closed)?;
                match held.get(&key) {
                    None => {
                        held.insert(key.clone(), me);
                        return Ok(Some(LockGuard { map: self, key }));
                    }
                    Some(owner) if *owner == me => {
                        return Err(Error::LockReentry(key.to_string()));
                    }
                    Some(_) => {}
                }
            }
            thread::yield_now();
        }
    }

    /// Refuses new locks and waits a bounded time for holders to finish.
    pub fn close(&self) {
        self.closing.store(true, Ordering::Release);
        for _ in 0..CLOSE_WAIT_ROUNDS {
            let empty = self.held.lock().map(|h| h.is_empty()).unwrap_or(true);
            if empty {
                return;
            }
            thread::sleep(CLOSE_WAIT_STEP);
        }
        warn!("lock map closed with locks still held");
    }
}

impl<K: Eq + Hash + Clone + Display> Default for LockMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> Drop for LockGuard<'_, K> {
    fn drop(&mut self) {
        if let Ok(mut held) = self.map.held.lock() {
            held.remove(&self.key);
        }
    }
}
