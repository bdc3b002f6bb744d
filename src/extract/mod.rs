//! # Opening and Extraction
//!
//! The inverse of [`crate::archive`]: parse and validate the outer header,
//! derive the key, decrypt, inflate and parse the inner header. The result
//! keeps the deduplicated blob in memory; extracting a file afterwards is a
//! plain slice and never touches the key or cipher again.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use crate::checksum::{self, from_hex};
use crate::compress;
use crate::crypto::{self, CIPHER_ALGO, KDF_ALGO, KDF_HASH};
use crate::error::{QcxError, Result};
use crate::format::{parse_header, parse_outer_header, read_framed, FileEntry, InnerHeader, OuterHeader};
use crate::options::{checkpoint, OpenOptions};
use crate::progress::{format_size, report, ProgressCallback, Stage};

/// Smallest buffer that can hold a length prefix and anything after it.
const MIN_ARCHIVE_LEN: usize = 8;

/// A decrypted archive, ready for listing and extraction.
#[derive(Debug, Clone)]
pub struct OpenedArchive {
    pub outer_header: OuterHeader,
    pub inner_header: InnerHeader,
    blob: Vec<u8>,
}

/// Parses and validates the unencrypted outer header. No password needed.
pub fn inspect_archive(bytes: &[u8]) -> Result<OuterHeader> {
    Ok(split_outer(bytes)?.0)
}

fn split_outer(bytes: &[u8]) -> Result<(OuterHeader, &[u8])> {
    if bytes.len() < MIN_ARCHIVE_LEN {
        return Err(QcxError::MalformedArchive(format!(
            "archive is {} bytes, too small to be a QCX archive",
            bytes.len()
        )));
    }
    let (outer_bytes, ciphertext) = read_framed(bytes, "outer header")?;
    let outer = parse_outer_header(outer_bytes)?;
    Ok((outer, ciphertext))
}

fn check_algorithms(outer: &OuterHeader) -> Result<()> {
    if outer.kdf.algo != KDF_ALGO || outer.kdf.hash != KDF_HASH {
        return Err(QcxError::UnsupportedFormat(format!(
            "key derivation {}/{} is not supported",
            outer.kdf.algo, outer.kdf.hash
        )));
    }
    if outer.cipher.algo != CIPHER_ALGO {
        return Err(QcxError::UnsupportedFormat(format!(
            "cipher {} is not supported",
            outer.cipher.algo
        )));
    }
    Ok(())
}

/// Opens an archive held in memory.
///
/// # Arguments
/// * `bytes` - The complete archive.
/// * `password` - The password it was built with.
/// * `options` - KDF iteration limits and cancel flag.
/// * `progress` - Optional observer notified at each stage.
pub fn open_archive(
    bytes: &[u8],
    password: &str,
    options: &OpenOptions,
    progress: Option<&ProgressCallback>,
) -> Result<OpenedArchive> {
    if password.is_empty() {
        return Err(QcxError::InvalidInput("password must not be empty".into()));
    }
    let cancel = options.cancel.as_ref();

    // 1. Outer header
    checkpoint(cancel, Stage::ParseHeader)?;
    report(progress, Stage::ParseHeader, "Reading outer header...");
    let (outer, ciphertext) = split_outer(bytes)?;
    check_algorithms(&outer)?;
    options.check_iterations(outer.kdf.iterations)?;
    let salt = from_hex(&outer.kdf.salt_hex)?;
    if salt.is_empty() {
        return Err(QcxError::MalformedArchive("kdf salt is empty".into()));
    }
    let iv = outer.cipher.iv()?;
    debug!(
        iterations = outer.kdf.iterations,
        ciphertext_len = ciphertext.len(),
        "outer header accepted"
    );

    // 2. Key derivation
    checkpoint(cancel, Stage::DeriveKey)?;
    report(progress, Stage::DeriveKey, "Deriving key from password...");
    let key = crypto::derive_key(password, &salt, outer.kdf.iterations)?;

    // 3. Decrypt
    checkpoint(cancel, Stage::Decrypt)?;
    report(progress, Stage::Decrypt, "Decrypting AES-GCM payload...");
    let compressed = crypto::decrypt(&key, &iv, ciphertext)?;
    drop(key);

    // 4. Inflate
    checkpoint(cancel, Stage::Decompress)?;
    report(progress, Stage::Decompress, "Decompressing zlib payload...");
    let inner_raw = compress::decompress(&compressed)?;
    drop(compressed);

    // 5. Inner header + blob
    let (inner_bytes, blob) = read_framed(&inner_raw, "inner header")?;
    let inner: InnerHeader = parse_header(inner_bytes, "inner header")?;
    inner.validate(blob.len())?;
    if inner.file_count != outer.meta.file_count || inner.total_size != outer.meta.total_size {
        warn!(
            outer_files = outer.meta.file_count,
            inner_files = inner.file_count,
            "outer summary disagrees with inner header"
        );
    }
    let blob = blob.to_vec();

    report(
        progress,
        Stage::Done,
        format!(
            "Opened: {} file(s), {} original, {} stored",
            inner.file_count,
            format_size(inner.total_size),
            format_size(inner.unique_size)
        ),
    );
    info!(files = inner.file_count, unique_size = inner.unique_size, "archive opened");

    Ok(OpenedArchive {
        outer_header: outer,
        inner_header: inner,
        blob,
    })
}

/// Reads an archive from disk and opens it.
pub fn open_archive_file(
    path: &Path,
    password: &str,
    options: &OpenOptions,
    progress: Option<&ProgressCallback>,
) -> Result<OpenedArchive> {
    let bytes = fs::read(path).map_err(|e| QcxError::io(e, path))?;
    open_archive(&bytes, password, options, progress)
}

impl OpenedArchive {
    pub fn entries(&self) -> &[FileEntry] {
        &self.inner_header.files
    }

    /// The raw deduplicated blob.
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// Index of the first entry stored under `path`.
    pub fn find(&self, path: &str) -> Option<usize> {
        let wanted = path.replace('\\', "/");
        self.entries().iter().position(|e| e.path == wanted)
    }

    /// Content of entry `index`, sliced out of the blob.
    pub fn file_data(&self, index: usize) -> Result<&[u8]> {
        let entry = self.entries().get(index).ok_or_else(|| {
            QcxError::InvalidInput(format!(
                "entry index {} out of range ({} entries)",
                index,
                self.entries().len()
            ))
        })?;
        let start = usize::try_from(entry.offset).ok();
        let end = entry.end().and_then(|e| usize::try_from(e).ok());
        match (start, end) {
            (Some(start), Some(end)) if end <= self.blob.len() => Ok(&self.blob[start..end]),
            _ => Err(QcxError::MalformedArchive(format!(
                "entry '{}' points outside the blob",
                entry.path
            ))),
        }
    }

    /// Checks every entry's content against its stored CRC-32.
    pub fn verify(&self) -> Result<()> {
        for (idx, entry) in self.entries().iter().enumerate() {
            self.verify_entry(idx, entry)?;
        }
        Ok(())
    }

    fn verify_entry(&self, idx: usize, entry: &FileEntry) -> Result<()> {
        let actual = checksum::crc32(self.file_data(idx)?);
        let expected = entry.crc32()?;
        if actual != expected {
            return Err(QcxError::MalformedArchive(format!(
                "crc mismatch for '{}': expected {:08x}, got {:08x}",
                entry.path, expected, actual
            )));
        }
        Ok(())
    }

    /// Writes the selected entries (all of them when `indices` is empty) below
    /// `output_dir`, recreating their directories. Returns the written paths.
    pub fn extract_to(&self, output_dir: &Path, indices: &[usize], verify: bool) -> Result<Vec<PathBuf>> {
        let selected: Vec<usize> = if indices.is_empty() {
            (0..self.entries().len()).collect()
        } else {
            indices.to_vec()
        };

        let mut written = Vec::with_capacity(selected.len());
        for idx in selected {
            let data = self.file_data(idx)?;
            let entry = &self.entries()[idx];
            if verify {
                self.verify_entry(idx, entry)?;
            }
            let out_path = output_dir.join(sanitize_entry_path(&entry.path)?);
            if let Some(dir) = out_path.parent() {
                fs::create_dir_all(dir).map_err(|e| QcxError::io(e, dir))?;
            }
            fs::write(&out_path, data).map_err(|e| QcxError::io(e, &out_path))?;
            debug!(path = %out_path.display(), size = data.len(), "extracted");
            written.push(out_path);
        }
        Ok(written)
    }
}

/// Turns a stored path into a relative path that cannot leave the output
/// directory. Absolute paths, drive prefixes and `..` are refused.
pub fn sanitize_entry_path(stored: &str) -> Result<PathBuf> {
    let normalized = stored.replace('\\', "/");
    let mut out = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(QcxError::MalformedArchive(format!(
                    "unsafe entry path '{}'",
                    stored
                )))
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(QcxError::MalformedArchive(format!("empty entry path '{}'", stored)));
    }
    Ok(out)
}
