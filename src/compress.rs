//! zlib (DEFLATE) transform for the inner payload.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{QcxError, Result};

/// Compresses `data` as a zlib stream at `level` (0-9).
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 64), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflates a zlib stream. A bad stream here comes after the cipher has
/// already authenticated the buffer, so it is reported as a malformed
/// archive rather than an authentication failure.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len().saturating_mul(2));
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| QcxError::MalformedArchive(format!("zlib stream is corrupt: {}", e)))?;
    Ok(out)
}
