//! CRC-32 checksums and hex helpers.
//!
//! The checksum is the standard IEEE CRC-32 (reflected polynomial `0xEDB88320`,
//! all-ones initial value and final XOR). It is a dedup pre-filter and an
//! integrity hint shown to callers, never a security primitive: tamper
//! detection is the job of the AES-GCM tag.

use crate::error::{QcxError, Result};

/// Computes the CRC-32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Renders a checksum as lowercase hex without padding, as stored in the inner header.
pub fn crc32_to_hex(crc: u32) -> String {
    format!("{:x}", crc)
}

/// Parses a hex checksum written by [`crc32_to_hex`]. Zero-padded input is accepted too.
pub fn crc32_from_hex(s: &str) -> Result<u32> {
    if s.is_empty() || s.len() > 8 || !is_hex_digits(s) {
        return Err(QcxError::MalformedArchive(format!("invalid crc32 hex '{}'", s)));
    }
    u32::from_str_radix(s, 16)
        .map_err(|_| QcxError::MalformedArchive(format!("invalid crc32 hex '{}'", s)))
}

/// Lowercase hex encoding for salts and IVs.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

fn is_hex_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Decodes a hex string; odd lengths, whitespace and non-hex characters are rejected.
pub fn from_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| QcxError::MalformedArchive(format!("invalid hex: {e}")))
}
