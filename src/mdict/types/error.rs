//! Error type for decoding MDict containers.

use thiserror::Error;

/// Everything that can go wrong while opening or scanning an `.mdx` file.
///
/// All of these are fatal for a conversion run: they mean the source archive
/// itself cannot be trusted, as opposed to a single entry being unusable.
#[derive(Debug, Error)]
pub enum MdictError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Engine version 4.0 or newer.
    #[error("Unsupported MDict version: {0}. Only v1.x, v2.x and v3.x can be read.")]
    UnsupportedVersion(f32),

    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Decryption failed: {0}")]
    DecryptionError(String),

    #[error("Decompression failed: {0}")]
    DecompressionError(String),

    /// A declared count disagrees with what the index actually contains.
    #[error("Count mismatch for {item_type}: expected {expected}, found {found}")]
    CountMismatch {
        item_type: String,
        expected: u64,
        found: u64,
    },

    /// A buffer has an unexpected length after decoding.
    #[error("Size mismatch for {context}: expected {expected} bytes, found {found} bytes")]
    SizeMismatch {
        context: String,
        expected: u64,
        found: u64,
    },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// The key block info is Salsa20-encrypted but no passcode was supplied.
    #[error("Encrypted dictionary requires a passcode, but none was provided")]
    PasscodeRequired,

    #[error("File lock was poisoned by a panicking reader thread")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, MdictError>;
