//! Reading input files and directories into [`FileRecord`]s.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::dedup::FileRecord;
use crate::error::{QcxError, Result};

/// Replaces backslashes with forward slashes, drops a leading `./` and
/// collapses doubled slashes. Directory structure is kept as-is.
/// Example: "./dir1\\dir2//file.txt" becomes "dir1/dir2/file.txt"
pub(crate) fn normalize_path(path: &str) -> String {
    let mut s = path.replace('\\', "/");
    while s.contains("//") {
        s = s.replace("//", "/");
    }
    let mut trimmed = s.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.trim_start_matches('/').to_string()
}

/// Returns the longest common ancestor directory shared by all provided paths.
/// If the slice is empty, an empty `PathBuf` is returned.
pub(crate) fn common_parent(paths: &[PathBuf]) -> PathBuf {
    use std::path::Component;

    if paths.is_empty() {
        return PathBuf::new();
    }

    let mut prefix: Vec<Component> = paths[0].components().collect();
    for p in &paths[1..] {
        let comps: Vec<Component> = p.components().collect();
        let mut idx = 0usize;
        while idx < prefix.len() && idx < comps.len() && prefix[idx] == comps[idx] {
            idx += 1;
        }
        prefix.truncate(idx);
        if prefix.is_empty() {
            break;
        }
    }

    let mut out = PathBuf::new();
    for c in prefix {
        out.push(c.as_os_str());
    }
    out
}

/// Best-effort MIME type from the file extension.
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => crate::format::DEFAULT_MIME,
    }
}

/// Expands `inputs` into a list of `(absolute path, archive path)` pairs.
///
/// Archive paths are relative to the common parent of the inputs, so a
/// directory keeps its own name as the first component and loose files are
/// stored by file name. Files found under a directory are sorted by path.
pub fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<(PathBuf, String)>> {
    let mut roots = Vec::with_capacity(inputs.len());
    for input in inputs {
        roots.push(fs::canonicalize(input).map_err(|e| QcxError::io(e, input))?);
    }
    let parents: Vec<PathBuf> = roots
        .iter()
        .map(|r| r.parent().map(Path::to_path_buf).unwrap_or_default())
        .collect();
    let base = common_parent(&parents);

    let mut files = Vec::new();
    for root in &roots {
        if root.is_file() {
            files.push(root.clone());
        } else if root.is_dir() {
            let mut found = Vec::new();
            for entry in WalkDir::new(root).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    QcxError::io(std::io::Error::other(e.to_string()), path)
                })?;
                if entry.file_type().is_file() {
                    found.push(entry.into_path());
                }
            }
            files.extend(found);
        }
    }

    let mut out = Vec::with_capacity(files.len());
    for path in files {
        let rel = path.strip_prefix(&base).unwrap_or(&path);
        let archive_path = normalize_path(&rel.to_string_lossy());
        out.push((path, archive_path));
    }
    Ok(out)
}

/// Reads every input fully into memory.
pub fn read_inputs(inputs: &[PathBuf]) -> Result<Vec<FileRecord>> {
    let mut records = Vec::new();
    for (path, archive_path) in collect_inputs(inputs)? {
        let data = fs::read(&path).map_err(|e| QcxError::io(e, &path))?;
        debug!(path = %archive_path, size = data.len(), "input read");
        records.push(FileRecord::new(archive_path, guess_mime(&path), data));
    }
    if records.is_empty() {
        return Err(QcxError::InvalidInput("no input files found".into()));
    }
    Ok(records)
}
