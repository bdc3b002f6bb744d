use std::path::PathBuf;

use thiserror::Error;

use crate::progress::Stage;

/// Message shared by every tag-verification failure. A wrong password and a
/// tampered ciphertext must be reported identically.
pub const AUTHENTICATION_FAILURE_MESSAGE: &str = "password incorrect or archive corrupted";

/// The primary error type for all operations in the `qcx` crate.
#[derive(Error, Debug)]
pub enum QcxError {
    /// The caller supplied something the engine refuses before doing any work,
    /// such as an empty file list or an empty password.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The archive bytes are truncated, a length prefix is out of bounds or a
    /// header cannot be parsed.
    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    /// Magic, version or algorithm parameters are not the ones this engine speaks.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The AES-GCM tag did not verify.
    #[error("{}", AUTHENTICATION_FAILURE_MESSAGE)]
    AuthenticationFailure,

    /// The caller raised the cancel flag; the pipeline stopped before `stage`.
    #[error("Operation cancelled before stage '{0}'")]
    Cancelled(Stage),

    /// An I/O error occurred while reading inputs or writing extracted files.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    /// A header could not be serialized while building an archive.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking worker task panicked or was aborted.
    #[error("Background task failed: {0}")]
    Background(String),
}

impl QcxError {
    /// Attaches a path to an I/O error.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        QcxError::Io {
            source,
            path: path.into(),
        }
    }
}

// Generic IO error conversion that doesn't require a path
impl From<std::io::Error> for QcxError {
    fn from(err: std::io::Error) -> Self {
        QcxError::Io {
            source: err,
            path: PathBuf::new(),
        }
    }
}

/// Convenient crate-wide result type.
pub type Result<T> = std::result::Result<T, QcxError>;
