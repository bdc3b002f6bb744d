//! Configuration for building and opening archives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::crypto::DEFAULT_PBKDF2_ROUNDS;
use crate::error::{QcxError, Result};
use crate::format::DEFAULT_NOTE;
use crate::progress::Stage;

/// Highest iteration count an archive may ask for before `open` refuses it.
/// The count comes from the unauthenticated outer header, so an unbounded
/// value would let a hostile file pin the CPU before the tag is ever checked.
pub const DEFAULT_MAX_KDF_ITERATIONS: u32 = 10_000_000;

/// Shared flag that stops a build or open between pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Returns `Cancelled(next)` if the flag is raised.
pub(crate) fn checkpoint(cancel: Option<&CancelFlag>, next: Stage) -> Result<()> {
    match cancel {
        Some(flag) if flag.is_cancelled() => Err(QcxError::Cancelled(next)),
        _ => Ok(()),
    }
}

/// Holds all configuration options for a build operation.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// PBKDF2 iteration count embedded in the archive.
    pub kdf_iterations: u32,
    /// zlib level, 0-9.
    pub compression_level: u32,
    /// Free text stored in the outer header summary.
    pub note: String,
    pub cancel: Option<CancelFlag>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_PBKDF2_ROUNDS,
            compression_level: 9,
            note: DEFAULT_NOTE.to_string(),
            cancel: None,
        }
    }
}

impl BuildOptions {
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        if level > 9 {
            warn!(requested = level, "zlib level out of range, using 9");
        }
        self.compression_level = level.min(9);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Holds all configuration options for an open operation.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub min_kdf_iterations: u32,
    pub max_kdf_iterations: u32,
    pub cancel: Option<CancelFlag>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            min_kdf_iterations: 1,
            max_kdf_iterations: DEFAULT_MAX_KDF_ITERATIONS,
            cancel: None,
        }
    }
}

impl OpenOptions {
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_kdf_iterations = max;
        self
    }

    pub fn with_min_iterations(mut self, min: u32) -> Self {
        self.min_kdf_iterations = min;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Applies the iteration policy to a count read from an outer header.
    pub fn check_iterations(&self, iterations: u32) -> Result<()> {
        if iterations < self.min_kdf_iterations.max(1) || iterations > self.max_kdf_iterations {
            return Err(QcxError::UnsupportedFormat(format!(
                "kdf iteration count {} outside accepted range {}..={}",
                iterations,
                self.min_kdf_iterations.max(1),
                self.max_kdf_iterations
            )));
        }
        Ok(())
    }
}
