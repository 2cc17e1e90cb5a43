//! Configuration constants for bitstego.

/// AES-256 block size in bytes.
pub const BLOCK_SIZE_BYTES: usize = 16;

/// AES-256 key size in bytes.
pub const KEY_SIZE_BYTES: usize = 32;

/// IV half carried in front of the 64-bit block counter.
pub const IV_SIZE_BYTES: usize = BLOCK_SIZE_BYTES - 8;

/// One derived key plus its IV half.
pub const KEY_AND_IV_SIZE_BYTES: usize = KEY_SIZE_BYTES + IV_SIZE_BYTES;

/// Total KDF output: two independent key/IV pairs.
pub const KEY_MATERIAL_BYTES: usize = 2 * KEY_AND_IV_SIZE_BYTES;

/// 64-bit target addresses per address-generator block.
pub const ADDRESSES_PER_BLOCK: u64 = (BLOCK_SIZE_BYTES / 8) as u64;

/// Mask bits per content-generator block.
pub const BITS_PER_BLOCK: u64 = (BLOCK_SIZE_BYTES * 8) as u64;

/// Size of the per-blob salt at the head of every bitfield.
pub const FILE_SALT_SIZE: usize = 32;

/// Buffer size for filling new bitfields with randomness.
pub const FILL_BUF_SIZE: usize = 1024 * 1024;

/// Minimum nonce size in bytes for metadata trails.
pub const DEFAULT_MINIMUM_NONCE_SIZE: usize = 1;

/// Argon2d parameters for trail key derivation.
///
/// These are deliberately cheap compared to password-storage defaults:
/// every brute-force candidate during metadata discovery pays this cost.
pub mod argon2_params {
    /// Memory cost in KiB (2^10).
    pub const MEMORY_COST: u32 = 1024;

    /// Time cost (iterations).
    pub const TIME_COST: u32 = 2;

    /// Parallelism factor (lanes).
    pub const PARALLELISM: u32 = 2;

    /// Fixed domain-separation salt. Nothing-in-my-sleeve constant.
    pub const DOMAIN_SALT: &[u8] = b"CipherTrailSaltString";
}

/// Reed-Solomon shard layout.
pub mod reed_solomon_params {
    /// Total shards per coded block.
    pub const MAX_SHARDS: usize = 256;

    /// Parity shards per coded block.
    pub const PARITY_SHARDS: usize = 128;

    /// Plaintext block size of the default payload chain.
    pub const DEFAULT_DATA_LENGTH: usize = 128;
}

/// Fixed layout of the hidden metadata record.
pub mod metadata_fields {
    /// Marker bytes at the start of a valid record. All bits set so a
    /// freshly zeroed buffer can never validate.
    pub const RUNWAY_MARKER: u8 = 0xff;

    /// Length of the runway marker.
    pub const RUNWAY_LEN: usize = 8;

    /// Length of the data trail key.
    pub const KEY_LEN: usize = 32;

    /// Length of the big-endian payload length field.
    pub const LENGTH_LEN: usize = 8;

    /// Total record size.
    pub const RECORD_LEN: usize = RUNWAY_LEN + KEY_LEN + LENGTH_LEN;
}

/// Largest single in-memory window a [`crate::field::FieldSlice`] will
/// materialize.
pub const MAX_WINDOW_SIZE: usize = i32::MAX as usize / 4;
