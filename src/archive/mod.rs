//! # Archive Construction
//!
//! Builds a QCX v3 archive from in-memory file records:
//! dedup → inner header → zlib → PBKDF2 + AES-256-GCM → outer header.
//! Everything happens in memory; the archive bytes only exist once every
//! stage has succeeded, so a failed build never leaves a partial archive.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::checksum::to_hex;
use crate::compress;
use crate::crypto::{self, CIPHER_ALGO, KDF_ALGO, KDF_HASH};
use crate::dedup::{DedupStats, DedupStore, FileRecord};
use crate::error::{QcxError, Result};
use crate::format::{
    write_framed, ArchiveMeta, CipherParams, InnerHeader, KdfParams, OuterHeader, FORMAT_VERSION,
    MAGIC,
};
use crate::options::{checkpoint, BuildOptions};
use crate::progress::{format_size, report, ProgressCallback, Stage};

/// The result of a successful build.
#[derive(Debug, Clone)]
pub struct BuiltArchive {
    /// The complete archive, ready to be written out.
    pub bytes: Vec<u8>,
    pub outer_header: OuterHeader,
    pub inner_header: InnerHeader,
    /// `100 * (1 - archive size / total original size)`; 0 when nothing was stored.
    pub ratio: f64,
    pub dedup: DedupStats,
}

/// Serializes the inner header and appends the blob: `len || header || blob`.
pub fn encode_inner_payload(header: &InnerHeader, blob: &[u8]) -> Result<Vec<u8>> {
    let header_bytes = serde_json::to_vec(header)?;
    let mut raw = Vec::with_capacity(4 + header_bytes.len() + blob.len());
    write_framed(&mut raw, &header_bytes)?;
    raw.extend_from_slice(blob);
    Ok(raw)
}

/// Compression ratio as a percentage of the original size saved.
pub fn compression_ratio(archive_size: u64, total_size: u64) -> f64 {
    if total_size == 0 {
        return 0.0;
    }
    100.0 * (1.0 - archive_size as f64 / total_size as f64)
}

/// Builds an archive from `records`, in order.
///
/// # Arguments
/// * `records` - The files to store. Must not be empty.
/// * `password` - Any non-empty password. Length policy is up to the caller.
/// * `options` - KDF iterations, compression level, note and cancel flag.
/// * `progress` - Optional observer notified at each stage.
pub fn build_archive(
    records: Vec<FileRecord>,
    password: &str,
    options: &BuildOptions,
    progress: Option<&ProgressCallback>,
) -> Result<BuiltArchive> {
    if records.is_empty() {
        return Err(QcxError::InvalidInput("no input files".into()));
    }
    if password.is_empty() {
        return Err(QcxError::InvalidInput("password must not be empty".into()));
    }
    if options.kdf_iterations == 0 {
        return Err(QcxError::InvalidInput("kdf iteration count must be positive".into()));
    }
    let cancel = options.cancel.as_ref();

    // 1. Deduplicate, keeping input order for the entries
    checkpoint(cancel, Stage::ReadInputs)?;
    let mut store = DedupStore::new();
    for record in records {
        report(
            progress,
            Stage::ReadInputs,
            format!("+ {} ({})", record.path, format_size(record.size())),
        );
        store.insert(record);
    }
    checkpoint(cancel, Stage::Deduplicate)?;
    let stats = store.stats();
    let total_size = store.total_size();
    report(
        progress,
        Stage::Deduplicate,
        format!(
            "Unique size after dedup: {} ({} duplicate(s))",
            format_size(store.unique_size()),
            stats.duplicates
        ),
    );
    let (blob, files) = store.finish();

    // 2. Inner payload
    checkpoint(cancel, Stage::Serialize)?;
    let inner_header = InnerHeader {
        file_count: files.len() as u64,
        total_size,
        unique_size: blob.len() as u64,
        files,
        created_at: Utc::now().timestamp_millis(),
    };
    let inner_raw = encode_inner_payload(&inner_header, &blob)?;
    drop(blob);
    debug!(inner_len = inner_raw.len(), "inner payload serialized");

    // 3. Compress
    checkpoint(cancel, Stage::Compress)?;
    report(progress, Stage::Compress, "Compressing inner payload with zlib (DEFLATE)...");
    let compressed = compress::compress(&inner_raw, options.compression_level)?;
    drop(inner_raw);
    debug!(compressed_len = compressed.len(), "inner payload compressed");

    // 4. Key derivation
    checkpoint(cancel, Stage::DeriveKey)?;
    report(progress, Stage::DeriveKey, "Deriving AES-256-GCM key via PBKDF2...");
    let salt = crypto::generate_salt();
    let iv = crypto::generate_iv();
    let key = crypto::derive_key(password, &salt, options.kdf_iterations)?;

    // 5. Encrypt
    checkpoint(cancel, Stage::Encrypt)?;
    report(progress, Stage::Encrypt, "Encrypting compressed payload...");
    let ciphertext = crypto::encrypt(&key, &iv, &compressed)?;
    drop(compressed);

    // 6. Outer header + final layout
    let outer_header = OuterHeader {
        magic: MAGIC.to_string(),
        version: FORMAT_VERSION,
        kdf: KdfParams {
            algo: KDF_ALGO.to_string(),
            hash: KDF_HASH.to_string(),
            iterations: options.kdf_iterations,
            salt_hex: to_hex(&salt),
        },
        cipher: CipherParams {
            algo: CIPHER_ALGO.to_string(),
            iv_hex: to_hex(&iv),
        },
        meta: ArchiveMeta {
            file_count: inner_header.file_count,
            total_size: inner_header.total_size,
            note: options.note.clone(),
        },
    };
    let outer_bytes = serde_json::to_vec(&outer_header)?;
    let mut bytes = Vec::with_capacity(4 + outer_bytes.len() + ciphertext.len());
    write_framed(&mut bytes, &outer_bytes)?;
    bytes.extend_from_slice(&ciphertext);

    let ratio = compression_ratio(bytes.len() as u64, total_size);
    report(
        progress,
        Stage::Done,
        format!("Done: {} -> {} ({:.1}% saved)", format_size(total_size), format_size(bytes.len() as u64), ratio),
    );
    info!(
        files = inner_header.file_count,
        total_size,
        unique_size = inner_header.unique_size,
        archive_size = bytes.len(),
        "archive built"
    );

    Ok(BuiltArchive {
        bytes,
        outer_header,
        inner_header,
        ratio,
        dedup: stats,
    })
}

/// Writes archive bytes to `path` through a temporary file in the same
/// directory, so the destination only appears once it is complete.
pub fn write_archive_file(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| QcxError::io(e, &dir))?;
    tmp.write_all(bytes).map_err(|e| QcxError::io(e, tmp.path()))?;
    tmp.as_file().sync_all().map_err(|e| QcxError::io(e, tmp.path()))?;
    tmp.persist(path).map_err(|e| QcxError::io(e.error, path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::read_framed;
    use std::sync::{Arc, Mutex};

    fn fast() -> BuildOptions {
        BuildOptions::default().with_iterations(1_000)
    }

    fn rec(path: &str, data: &[u8]) -> FileRecord {
        FileRecord::new(path, "text/plain", data.to_vec())
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = build_archive(Vec::new(), "secret1", &fast(), None).unwrap_err();
        assert!(matches!(err, QcxError::InvalidInput(_)));
    }

    #[test]
    fn empty_password_is_rejected() {
        let err = build_archive(vec![rec("a", b"x")], "", &fast(), None).unwrap_err();
        assert!(matches!(err, QcxError::InvalidInput(_)));
    }

    #[test]
    fn layout_and_headers() -> Result<()> {
        let built = build_archive(
            vec![rec("a.txt", b"hello"), rec("b.txt", b"hello")],
            "secret1",
            &fast(),
            None,
        )?;

        let inner = &built.inner_header;
        assert_eq!(inner.file_count, 2);
        assert_eq!(inner.total_size, 10);
        assert_eq!(inner.unique_size, 5);
        assert_eq!(inner.files[0].offset, inner.files[1].offset);
        assert_eq!(inner.files[0].length, 5);

        let (outer, ciphertext) = read_framed(&built.bytes, "outer header")?;
        let parsed: OuterHeader = serde_json::from_slice(outer)?;
        assert_eq!(parsed, built.outer_header);
        assert_eq!(parsed.magic, "QCX3");
        assert_eq!(parsed.version, 3);
        assert_eq!(parsed.kdf.salt_hex.len(), 32);
        assert_eq!(parsed.cipher.iv_hex.len(), 24);
        assert_eq!(parsed.meta.file_count, 2);
        assert_eq!(parsed.meta.total_size, 10);
        assert!(ciphertext.len() >= crypto::TAG_SIZE);
        Ok(())
    }

    #[test]
    fn salt_and_iv_differ_between_builds() -> Result<()> {
        let a = build_archive(vec![rec("a", b"same")], "pw", &fast(), None)?;
        let b = build_archive(vec![rec("a", b"same")], "pw", &fast(), None)?;
        assert_ne!(a.outer_header.kdf.salt_hex, b.outer_header.kdf.salt_hex);
        assert_ne!(a.outer_header.cipher.iv_hex, b.outer_header.cipher.iv_hex);
        Ok(())
    }

    #[test]
    fn progress_sees_every_stage_in_order() -> Result<()> {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let stages_cl = Arc::clone(&stages);
        let cb = move |ev: &crate::progress::ProgressEvent| stages_cl.lock().unwrap().push(ev.stage);

        build_archive(vec![rec("a", b"abc")], "pw", &fast(), Some(&cb as &ProgressCallback))?;

        let mut seen = stages.lock().unwrap().clone();
        seen.dedup();
        assert_eq!(
            seen,
            vec![
                Stage::ReadInputs,
                Stage::Deduplicate,
                Stage::Compress,
                Stage::DeriveKey,
                Stage::Encrypt,
                Stage::Done
            ]
        );
        Ok(())
    }

    #[test]
    fn cancelled_build_returns_nothing() {
        let flag = crate::options::CancelFlag::new();
        flag.cancel();
        let err = build_archive(vec![rec("a", b"abc")], "pw", &fast().with_cancel(flag), None).unwrap_err();
        assert!(matches!(err, QcxError::Cancelled(Stage::ReadInputs)));
    }

    #[test]
    fn ratio_formula() {
        assert_eq!(compression_ratio(50, 100), 50.0);
        assert_eq!(compression_ratio(10, 0), 0.0);
        assert!(compression_ratio(200, 100) < 0.0);
    }

    #[test]
    fn write_archive_file_creates_destination() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("out.qcx");
        write_archive_file(&target, b"bytes")?;
        assert_eq!(std::fs::read(&target)?, b"bytes");
        Ok(())
    }
}
