//! # QCX Core Library
//!
//! This crate builds and opens QCX v3 archives: a single encrypted blob
//! holding many files, deduplicated by content, zlib-compressed and sealed
//! with AES-256-GCM under a PBKDF2-derived key.
//!
//! It backs the `qcx` command-line application, and its public API can be
//! used to create, inspect and extract archives programmatically.
//!
//! ## Key Modules
//!
//! - [`archive`]: the build pipeline (dedup → header → compress → encrypt).
//! - [`extract`]: the open pipeline and lazy, slice-based extraction.
//! - [`dedup`]: the content-addressed deduplication store.
//! - [`format`]: outer/inner header definitions and length-prefixed framing.
//! - [`crypto`]: PBKDF2-HMAC-SHA256 and AES-256-GCM with fixed parameters.
//!
//! ## Examples
//!
//! ```no_run
//! use qcx::{build_archive, open_archive, BuildOptions, FileRecord, OpenOptions};
//!
//! let files = vec![
//!     FileRecord::new("a.txt", "text/plain", b"hello".to_vec()),
//!     FileRecord::new("b.txt", "text/plain", b"hello".to_vec()),
//! ];
//! let built = build_archive(files, "secret1", &BuildOptions::default(), None)?;
//! assert_eq!(built.inner_header.unique_size, 5);
//!
//! let opened = open_archive(&built.bytes, "secret1", &OpenOptions::default(), None)?;
//! assert_eq!(opened.file_data(1)?, b"hello");
//! # Ok::<(), qcx::QcxError>(())
//! ```

#![forbid(unsafe_code)]

pub mod archive;
pub mod async_api;
pub mod checksum;
pub mod cli;
pub mod cli_runner;
pub mod compress;
pub mod crypto;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod format;
pub mod input;
pub mod options;
pub mod progress;

// Re-exports: stable API surface
pub use archive::{build_archive, write_archive_file, BuiltArchive};
pub use async_api::{build_archive_async, open_archive_async};
pub use dedup::{DedupStore, FileRecord};
pub use error::{QcxError, Result};
pub use extract::{inspect_archive, open_archive, open_archive_file, OpenedArchive};
pub use format::{FileEntry, InnerHeader, OuterHeader};
pub use options::{BuildOptions, CancelFlag, OpenOptions};
pub use progress::{ProgressCallback, ProgressEvent, Stage};
