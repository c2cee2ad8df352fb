use thiserror::Error;

use crate::mdict::MdictError;

/// Fatal conversion failures. Per-entry problems never surface here; they
/// are collected in [`ConversionReport`](super::ConversionReport).
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Source error: {0}")]
    Source(#[from] MdictError),

    #[error("Entry {entry_id} renders to {len} bytes, more than a body block can hold")]
    EntryTooLarge { entry_id: String, len: usize },

    #[error("Body compression failed: {0}")]
    Compression(std::io::Error),

    #[error("Failed to start worker thread: {0}")]
    Spawn(std::io::Error),

    #[error("Worker thread '{0}' panicked")]
    WorkerPanicked(&'static str),

    #[error("Inconsistent output: {0}")]
    Inconsistent(String),
}

pub type Result<T> = std::result::Result<T, ConvertError>;
