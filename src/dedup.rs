//! Content-addressed deduplication.
//!
//! Every input file becomes a [`FileEntry`] pointing at an `(offset, length)`
//! window in one concatenated blob. `(size, crc32)` is only a pre-filter: a hit
//! is confirmed by comparing the full content against the bytes already in the
//! blob. Two different payloads that happen to share size and checksum each
//! get their own window, stored under the same pre-filter key with a higher
//! `slot`, so later copies of either one still deduplicate.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::checksum;
use crate::format::{FileEntry, DEFAULT_MIME};

/// One input file, read fully into memory. Content and checksum are fixed
/// at construction so the two always agree.
///
/// ```compile_fail
/// let mut record = qcx::FileRecord::new("a.txt", "text/plain", b"hello".to_vec());
/// record.checksum = 0;
/// ```
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: String,
    pub mime: String,
    data: Vec<u8>,
    checksum: u32,
}

impl FileRecord {
    /// Builds a record and computes its checksum. An empty `mime` falls back to
    /// `application/octet-stream`.
    pub fn new(path: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        let mut mime = mime.into();
        if mime.is_empty() {
            mime = DEFAULT_MIME.to_string();
        }
        let checksum = checksum::crc32(&data);
        Self {
            path: path.into(),
            mime,
            data,
            checksum,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// CRC-32 of [`data`](Self::data).
    pub fn checksum(&self) -> u32 {
        self.checksum
    }
}

/// Pre-filter key. `slot` separates payloads that collide on `(size, crc32)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DedupKey {
    size: u64,
    crc32: u32,
    slot: u32,
}

/// A window into the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub length: u64,
}

/// What happened to a record when it was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// First time this content was seen; its bytes were appended.
    Unique,
    /// Identical content already stored; the window was reused.
    Duplicate,
    /// Size and checksum matched stored content that differs; appended as new.
    Collision,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DedupStats {
    pub unique: u64,
    pub duplicates: u64,
    pub collisions: u64,
}

/// Accumulates unique payloads for a single archive build.
#[derive(Debug, Default)]
pub struct DedupStore {
    windows: HashMap<DedupKey, Window>,
    blob: Vec<u8>,
    entries: Vec<FileEntry>,
    total_size: u64,
    stats: DedupStats,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one record and returns where its content ended up.
    pub fn insert(&mut self, record: FileRecord) -> (Window, Placement) {
        let size = record.size();
        let mut key = DedupKey {
            size,
            crc32: record.checksum,
            slot: 0,
        };

        let (window, placement) = loop {
            match self.windows.get(&key).copied() {
                None => {
                    let placement = if key.slot == 0 {
                        Placement::Unique
                    } else {
                        Placement::Collision
                    };
                    let window = self.append(&record.data);
                    self.windows.insert(key, window);
                    break (window, placement);
                }
                Some(window) if self.window_bytes(window) == record.data.as_slice() => {
                    break (window, Placement::Duplicate);
                }
                Some(_) => key.slot += 1,
            }
        };

        match placement {
            Placement::Unique => self.stats.unique += 1,
            Placement::Duplicate => {
                self.stats.duplicates += 1;
                debug!(path = %record.path, offset = window.offset, "dedup hit");
            }
            Placement::Collision => {
                self.stats.unique += 1;
                self.stats.collisions += 1;
                warn!(
                    path = %record.path,
                    size,
                    crc32 = record.checksum,
                    slot = key.slot,
                    "size/checksum collision with different content, stored separately"
                );
            }
        }

        self.total_size += size;
        self.entries.push(FileEntry {
            path: record.path,
            mime: record.mime,
            offset: window.offset,
            length: window.length,
            size,
            crc32_hex: checksum::crc32_to_hex(record.checksum),
        });
        (window, placement)
    }

    fn append(&mut self, data: &[u8]) -> Window {
        let window = Window {
            offset: self.blob.len() as u64,
            length: data.len() as u64,
        };
        self.blob.extend_from_slice(data);
        window
    }

    fn window_bytes(&self, window: Window) -> &[u8] {
        let start = window.offset as usize;
        &self.blob[start..start + window.length as usize]
    }

    pub fn unique_size(&self) -> u64 {
        self.blob.len() as u64
    }

    /// Sum of all inserted sizes, before deduplication.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn stats(&self) -> DedupStats {
        self.stats
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Consumes the store, yielding the blob and the entries in insertion order.
    pub fn finish(self) -> (Vec<u8>, Vec<FileEntry>) {
        (self.blob, self.entries)
    }
}
