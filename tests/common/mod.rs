//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use qcx::checksum::to_hex;
use qcx::crypto;
use qcx::format::{write_framed, ArchiveMeta, CipherParams, KdfParams, OuterHeader};
use qcx::{build_archive, BuildOptions, FileRecord};

/// Low iteration count so tests do not spend their time in PBKDF2.
pub const TEST_ROUNDS: u32 = 1_000;

pub fn fast_options() -> BuildOptions {
    BuildOptions::default().with_iterations(TEST_ROUNDS)
}

pub fn record(path: &str, data: &[u8]) -> FileRecord {
    FileRecord::new(path, "application/octet-stream", data.to_vec())
}

/// Builds an archive from `(path, content)` pairs.
pub fn build(entries: &[(&str, &[u8])], password: &str) -> Vec<u8> {
    let records = entries.iter().map(|(p, d)| record(p, d)).collect();
    build_archive(records, password, &fast_options(), None)
        .expect("build archive")
        .bytes
}

/// Length of the outer header declared by an archive's first four bytes.
pub fn outer_len(archive: &[u8]) -> usize {
    u32::from_le_bytes([archive[0], archive[1], archive[2], archive[3]]) as usize
}

/// Re-frames an archive after editing its outer header JSON.
pub fn rewrite_outer(archive: &[u8], edit: impl FnOnce(&mut serde_json::Value)) -> Vec<u8> {
    let len = outer_len(archive);
    let mut outer: serde_json::Value = serde_json::from_slice(&archive[4..4 + len]).unwrap();
    edit(&mut outer);
    let text = serde_json::to_vec(&outer).unwrap();
    let mut out = Vec::new();
    write_framed(&mut out, &text).unwrap();
    out.extend_from_slice(&archive[4 + len..]);
    out
}

/// Seals an arbitrary inner payload exactly the way the builder does, so tests
/// can feed authenticated but malformed content to `open`.
pub fn seal_inner_raw(inner_raw: &[u8], password: &str) -> Vec<u8> {
    let compressed = qcx::compress::compress(inner_raw, 9).unwrap();
    let salt = crypto::generate_salt();
    let iv = crypto::generate_iv();
    let key = crypto::derive_key(password, &salt, TEST_ROUNDS).unwrap();
    let ciphertext = crypto::encrypt(&key, &iv, &compressed).unwrap();
    seal_ciphertext(&ciphertext, &salt, &iv)
}

/// Seals raw bytes without compressing them first.
pub fn seal_uncompressed(payload: &[u8], password: &str) -> Vec<u8> {
    let salt = crypto::generate_salt();
    let iv = crypto::generate_iv();
    let key = crypto::derive_key(password, &salt, TEST_ROUNDS).unwrap();
    let ciphertext = crypto::encrypt(&key, &iv, payload).unwrap();
    seal_ciphertext(&ciphertext, &salt, &iv)
}

fn seal_ciphertext(ciphertext: &[u8], salt: &[u8], iv: &[u8]) -> Vec<u8> {
    let outer = OuterHeader {
        magic: "QCX3".into(),
        version: 3,
        kdf: KdfParams {
            algo: "PBKDF2".into(),
            hash: "SHA-256".into(),
            iterations: TEST_ROUNDS,
            salt_hex: to_hex(salt),
        },
        cipher: CipherParams {
            algo: "AES-GCM".into(),
            iv_hex: to_hex(iv),
        },
        meta: ArchiveMeta {
            file_count: 0,
            total_size: 0,
            note: String::new(),
        },
    };
    let mut out = Vec::new();
    write_framed(&mut out, &serde_json::to_vec(&outer).unwrap()).unwrap();
    out.extend_from_slice(ciphertext);
    out
}

fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        let mut c = i as u32;
        for _ in 0..8 {
            c = if c & 1 != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
        }
        *slot = c;
    }
    table
}

/// Returns four bytes that, appended to `prefix`, make its CRC-32 equal `target`.
pub fn forge_crc_suffix(prefix: &[u8], target: u32) -> [u8; 4] {
    let table = crc_table();
    let mut by_top_byte = [0u8; 256];
    for (i, v) in table.iter().enumerate() {
        by_top_byte[(v >> 24) as usize] = i as u8;
    }

    // Walk back from the desired register to find the table index of each step.
    let mut state = !target;
    let mut indices = [0u8; 4];
    for k in (0..4).rev() {
        let i = by_top_byte[(state >> 24) as usize];
        indices[k] = i;
        state = (state ^ table[i as usize]) << 8;
    }

    // Walk forward from the real register, choosing bytes that hit those indices.
    let mut reg = !qcx::checksum::crc32(prefix);
    let mut suffix = [0u8; 4];
    for k in 0..4 {
        suffix[k] = ((reg ^ indices[k] as u32) & 0xff) as u8;
        reg = (reg >> 8) ^ table[indices[k] as usize];
    }
    suffix
}

/// Two different payloads of equal length and equal CRC-32.
pub fn colliding_pair() -> (Vec<u8>, Vec<u8>) {
    let target = 0xC0FF_EE00;
    let mut a = b"first payload".to_vec();
    let mut b = b"other payload".to_vec();
    let sa = forge_crc_suffix(&a, target);
    let sb = forge_crc_suffix(&b, target);
    a.extend_from_slice(&sa);
    b.extend_from_slice(&sb);
    (a, b)
}
