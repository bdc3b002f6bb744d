//! Progress reporting for archive operations.
//!
//! Progress is a side channel: the build and open pipelines call the observer
//! at fixed checkpoints and never look at what it does. Passing `None` turns
//! reporting off entirely.

use std::fmt;

/// A checkpoint in the build or open pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ReadInputs,
    Deduplicate,
    Serialize,
    Compress,
    DeriveKey,
    Encrypt,
    ParseHeader,
    Decrypt,
    Decompress,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ReadInputs => "read-inputs",
            Stage::Deduplicate => "deduplicate",
            Stage::Serialize => "serialize",
            Stage::Compress => "compress",
            Stage::DeriveKey => "derive-key",
            Stage::Encrypt => "encrypt",
            Stage::ParseHeader => "parse-header",
            Stage::Decrypt => "decrypt",
            Stage::Decompress => "decompress",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single progress notification.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub message: String,
}

/// Progress callback function type
pub type ProgressCallback = dyn Fn(&ProgressEvent) + Send + Sync;

/// Sends `message` to the observer, if there is one.
pub(crate) fn report(progress: Option<&ProgressCallback>, stage: Stage, message: impl Into<String>) {
    if let Some(cb) = progress {
        cb(&ProgressEvent {
            stage,
            message: message.into(),
        });
    }
}

/// Formats a byte count the way progress messages and listings show it.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
