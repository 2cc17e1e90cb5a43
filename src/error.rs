//! Error types for bitstego.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bitstego operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bitstego operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during bitfield or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Several I/O errors collected from one parallel block operation.
    /// The first is the primary cause; the rest are kept, not dropped.
    #[error("{} I/O errors while resolving one block, first: {first}", suppressed.len() + 1)]
    BlockIo {
        #[source]
        first: Box<Error>,
        suppressed: Vec<Error>,
    },

    /// Key derivation error.
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Key material of the wrong size was supplied.
    #[error("Invalid key material length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Packet bytes and error flags of different lengths.
    #[error("Mismatched packet and error flag lengths: {data} vs {flags}")]
    MismatchedPacket { data: usize, flags: usize },

    /// A coder was fed a block of the wrong size.
    #[error("Invalid block size: expected {expected} bytes, got {actual}")]
    InvalidBlockSize { expected: usize, actual: usize },

    /// A zero or otherwise unusable size was configured.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Erasure codec failure outside the soft error-flag path.
    #[error("Erasure coding error: {0}")]
    Erasure(String),

    /// The same thread tried to lock the same key twice. Programming error.
    #[error("Re-entrant lock attempt on key {0}")]
    LockReentry(String),

    /// Operation on a store or stream that has been closed.
    #[error("Store is closed")]
    Closed,

    /// Write attempted against a read-only bitfield.
    #[error("Bitfield is read-only")]
    ReadOnly,

    /// A slice read fell outside the window with no backing store.
    #[error("Bit address {0} is outside the slice window and no backing store exists")]
    OutsideWindow(u64),

    /// Bitfield file is too small to hold the salt and a data area.
    #[error("Bitfield too small: {0} ({1} bytes)")]
    FieldTooSmall(PathBuf, u64),

    /// Metadata search was cancelled before a match was found.
    #[error("Metadata search cancelled")]
    SearchCancelled,

    /// Metadata record failed structural validation.
    #[error("Invalid metadata record")]
    InvalidMetadata,
}

impl Error {
    /// Collapse errors collected from a parallel block operation into one.
    ///
    /// Returns `Ok(())` when the list is empty, the sole error when there is
    /// one, and [`Error::BlockIo`] otherwise.
    pub fn collect_block(mut errors: Vec<Error>) -> Result<()> {
        if errors.is_empty() {
            return Ok(());
        }
        let first = errors.remove(0);
        if errors.is_empty() {
            return Err(first);
        }
        Err(Error::BlockIo {
            first: Box::new(first),
            suppressed: errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_block_empty() {
        assert!(Error::collect_block(Vec::new()).is_ok());
    }

    #[test]
    fn test_collect_block_single_passes_through() {
        let errs = vec![Error::Closed];
        match Error::collect_block(errs) {
            Err(Error::Closed) => {}
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn test_collect_block_many_keeps_all() {
        let errs = vec![Error::Closed, Error::ReadOnly, Error::SearchCancelled];
        match Error::collect_block(errs) {
            Err(Error::BlockIo { first, suppressed }) => {
                assert!(matches!(*first, Error::Closed));
                assert_eq!(suppressed.len(), 2);
            }
            other => panic!("expected BlockIo, got {other:?}"),
        }
    }
}
