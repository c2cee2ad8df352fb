use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Output {} already exists", .0.display())]
    OutputExists(PathBuf),

    #[error("Corrupt {file}: {reason}")]
    Corrupt { file: &'static str, reason: String },

    #[error("{field} value {value} does not fit its field")]
    FieldOverflow { field: &'static str, value: u64 },

    #[error("Inconsistent bundle: {0}")]
    Inconsistent(String),
}

impl BundleError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(file: &'static str, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            file,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BundleError>;
