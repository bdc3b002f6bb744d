//! # QCX v3 Archive Format
//!
//! ```text
//! Archive    := OuterLen(u32 LE) || OuterHeader (JSON) || Ciphertext
//! Ciphertext := AES-256-GCM(key, iv, Compressed) || tag
//! Compressed := zlib(InnerRaw)
//! InnerRaw   := InnerLen(u32 LE) || InnerHeader (JSON) || DedupBlob
//! ```
//!
//! The outer header is unencrypted and carries everything needed to derive
//! the key, plus a redundant summary for inspection without a password. The
//! inner header lists every file as an `(offset, length)` window into the
//! deduplicated blob.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checksum;
use crate::crypto::IV_SIZE;
use crate::error::{QcxError, Result};

/// Format tag written into every outer header.
pub const MAGIC: &str = "QCX3";
/// The only layout version this engine reads or writes.
pub const FORMAT_VERSION: u32 = 3;
pub const DEFAULT_NOTE: &str = "QCX v3 universal encrypted archive";
pub const DEFAULT_MIME: &str = "application/octet-stream";

const LEN_PREFIX: usize = 4;

/// Key-derivation parameters stored in the outer header.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    pub algo: String,
    pub hash: String,
    #[serde(alias = "iter")]
    pub iterations: u32,
    pub salt_hex: String,
}

/// Cipher parameters stored in the outer header.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CipherParams {
    pub algo: String,
    pub iv_hex: String,
}

impl CipherParams {
    /// Decodes the IV, which must be exactly 96 bits.
    pub fn iv(&self) -> Result<[u8; IV_SIZE]> {
        let raw = checksum::from_hex(&self.iv_hex)?;
        <[u8; IV_SIZE]>::try_from(raw.as_slice()).map_err(|_| {
            QcxError::MalformedArchive(format!(
                "IV must be {} bytes, got {}",
                IV_SIZE,
                raw.len()
            ))
        })
    }
}

/// Summary duplicated from the inner header so it can be shown before decryption.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMeta {
    pub file_count: u64,
    pub total_size: u64,
    #[serde(default)]
    pub note: String,
}

/// The unencrypted header at the start of every archive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OuterHeader {
    pub magic: String,
    pub version: u32,
    pub kdf: KdfParams,
    pub cipher: CipherParams,
    pub meta: ArchiveMeta,
}

/// One input file's window into the deduplicated blob.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Relative path, `/`-separated.
    pub path: String,
    /// Declared MIME type. Best effort, never authoritative.
    pub mime: String,
    pub offset: u64,
    /// Stored length; currently always equal to `size`.
    pub length: u64,
    /// Original size in bytes.
    pub size: u64,
    #[serde(rename = "crc32Hex", alias = "crc32")]
    pub crc32_hex: String,
}

impl FileEntry {
    pub fn crc32(&self) -> Result<u32> {
        checksum::crc32_from_hex(&self.crc32_hex)
    }

    /// End of the window, or `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }
}

/// The encrypted header describing every file in the archive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InnerHeader {
    pub file_count: u64,
    /// Sum of all file sizes before deduplication.
    pub total_size: u64,
    /// Length of the deduplicated blob.
    pub unique_size: u64,
    pub files: Vec<FileEntry>,
    /// Creation time in epoch milliseconds.
    pub created_at: i64,
}

impl InnerHeader {
    /// Checks the header against the blob it was shipped with.
    pub fn validate(&self, blob_len: usize) -> Result<()> {
        if self.file_count != self.files.len() as u64 {
            return Err(QcxError::MalformedArchive(format!(
                "fileCount {} does not match {} entries",
                self.file_count,
                self.files.len()
            )));
        }
        if self.unique_size != blob_len as u64 {
            return Err(QcxError::MalformedArchive(format!(
                "uniqueSize {} does not match blob length {}",
                self.unique_size, blob_len
            )));
        }
        let mut total: u64 = 0;
        for (idx, entry) in self.files.iter().enumerate() {
            match entry.end() {
                Some(end) if end <= self.unique_size => {}
                _ => {
                    return Err(QcxError::MalformedArchive(format!(
                        "entry {} ('{}') window {}+{} exceeds blob of {} bytes",
                        idx, entry.path, entry.offset, entry.length, self.unique_size
                    )))
                }
            }
            if entry.length != entry.size {
                return Err(QcxError::MalformedArchive(format!(
                    "entry {} ('{}') length {} differs from size {}",
                    idx, entry.path, entry.length, entry.size
                )));
            }
            total = total.checked_add(entry.size).ok_or_else(|| {
                QcxError::MalformedArchive("totalSize overflows u64".into())
            })?;
        }
        if total != self.total_size {
            return Err(QcxError::MalformedArchive(format!(
                "totalSize {} does not match sum of sizes {}",
                self.total_size, total
            )));
        }
        Ok(())
    }
}

/// Appends `len(header) as u32 LE || header` to `out`.
pub fn write_framed(out: &mut Vec<u8>, header: &[u8]) -> Result<()> {
    let len = u32::try_from(header.len()).map_err(|_| {
        QcxError::InvalidInput(format!("header of {} bytes exceeds u32 length prefix", header.len()))
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(header);
    Ok(())
}

/// Splits `buf` into `(header, rest)` using its 4-byte little-endian length
/// prefix. The prefix must be non-zero and fit within the remaining bytes.
pub fn read_framed<'a>(buf: &'a [u8], what: &str) -> Result<(&'a [u8], &'a [u8])> {
    if buf.len() < LEN_PREFIX {
        return Err(QcxError::MalformedArchive(format!(
            "{} length prefix truncated ({} bytes)",
            what,
            buf.len()
        )));
    }
    let (prefix, rest) = buf.split_at(LEN_PREFIX);
    let mut le = [0u8; LEN_PREFIX];
    le.copy_from_slice(prefix);
    let len = u32::from_le_bytes(le) as usize;
    if len == 0 || len > rest.len() {
        return Err(QcxError::MalformedArchive(format!(
            "{} length {} out of bounds ({} bytes remaining)",
            what,
            len,
            rest.len()
        )));
    }
    Ok(rest.split_at(len))
}

/// Parses the outer header. Magic and version are compared on the raw JSON
/// first, so a header from another format or version is reported as
/// unsupported whatever the rest of its layout looks like.
pub fn parse_outer_header(bytes: &[u8]) -> Result<OuterHeader> {
    let value: Value = parse_header(bytes, "outer header")?;
    let fields = value
        .as_object()
        .ok_or_else(|| QcxError::MalformedArchive("outer header is not a JSON object".into()))?;

    let magic = fields.get("magic");
    let version = fields.get("version");
    if magic.and_then(Value::as_str) != Some(MAGIC)
        || version.and_then(Value::as_u64) != Some(u64::from(FORMAT_VERSION))
    {
        let show = |v: Option<&Value>| v.map_or_else(|| "none".to_string(), Value::to_string);
        return Err(QcxError::UnsupportedFormat(format!(
            "expected {} version {}, found magic {} version {}",
            MAGIC,
            FORMAT_VERSION,
            show(magic),
            show(version)
        )));
    }

    serde_json::from_value(value)
        .map_err(|e| QcxError::MalformedArchive(format!("cannot parse outer header: {}", e)))
}

/// Parses a JSON header; any failure is a malformed archive.
pub fn parse_header<'a, T: Deserialize<'a>>(bytes: &'a [u8], what: &str) -> Result<T> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| QcxError::MalformedArchive(format!("{} is not valid UTF-8: {}", what, e)))?;
    serde_json::from_str(text)
        .map_err(|e| QcxError::MalformedArchive(format!("cannot parse {}: {}", what, e)))
}
