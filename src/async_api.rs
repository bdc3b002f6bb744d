//! Async wrappers around the build and open pipelines.
//!
//! PBKDF2 and AES-GCM are CPU-bound, so each call runs the whole pipeline on
//! tokio's blocking pool and the caller simply awaits it. Cancellation is
//! cooperative: raise the [`CancelFlag`](crate::options::CancelFlag) in the
//! options and the pipeline stops at the next stage boundary.

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::archive::{build_archive, BuiltArchive};
use crate::dedup::FileRecord;
use crate::error::{QcxError, Result};
use crate::extract::{open_archive, OpenedArchive};
use crate::options::{BuildOptions, OpenOptions};
use crate::progress::ProgressCallback;

/// Builds an archive without blocking the async executor.
pub async fn build_archive_async(
    records: Vec<FileRecord>,
    password: String,
    options: BuildOptions,
    progress: Option<Arc<ProgressCallback>>,
) -> Result<BuiltArchive> {
    let password = Zeroizing::new(password);
    tokio::task::spawn_blocking(move || {
        build_archive(records, &password, &options, progress.as_deref())
    })
    .await
    .map_err(|e| QcxError::Background(e.to_string()))?
}

/// Opens an archive without blocking the async executor.
pub async fn open_archive_async(
    bytes: Vec<u8>,
    password: String,
    options: OpenOptions,
    progress: Option<Arc<ProgressCallback>>,
) -> Result<OpenedArchive> {
    let password = Zeroizing::new(password);
    tokio::task::spawn_blocking(move || {
        open_archive(&bytes, &password, &options, progress.as_deref())
    })
    .await
    .map_err(|e| QcxError::Background(e.to_string()))?
}
