//! Input format detection via content inspection.
//!
//! Detects JSON (leading `{` or `[`) and delimited text by inspecting the
//! first bytes of a file, falling back to the file extension.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Input formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// Comma/tab/pipe/semicolon separated values.
    Csv,
    /// JSON array, JSON object of records, or NDJSON.
    Json,
    /// Unrecognized format.
    Unknown,
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileFormat::Csv => write!(f, "CSV"),
            FileFormat::Json => write!(f, "JSON"),
            FileFormat::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Maximum number of bytes to read for format detection.
const DETECT_BUF_SIZE: usize = 256;

/// Detect the format of the file at `path` by inspecting its contents.
///
/// Detection rules (applied in order):
/// 1. First non-whitespace byte is `{` or `[` → [`FileFormat::Json`]
/// 2. Recognized extension (.json, .jsonl, .ndjson, .csv, .tsv, .txt) → corresponding format
/// 3. Otherwise → [`FileFormat::Csv`]
///
/// An empty file is classified by extension alone.
///
/// # Errors
/// Returns an I/O error if the file cannot be opened or read.
pub fn detect_format<P: AsRef<Path>>(path: P) -> io::Result<FileFormat> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let mut buf = [0u8; DETECT_BUF_SIZE];
    let n = file.read(&mut buf)?;

    if n == 0 {
        return Ok(format_from_extension(path));
    }

    Ok(detect_bytes(&buf[..n]).unwrap_or_else(|| {
        match format_from_extension(path) {
            FileFormat::Unknown => FileFormat::Csv,
            known => known,
        }
    }))
}

/// Content-only detection for in-memory input. `None` when inconclusive.
pub fn detect_bytes(bytes: &[u8]) -> Option<FileFormat> {
    // Skip a UTF-8 BOM before looking for the first significant byte.
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') | Some(b'[') => Some(FileFormat::Json),
        _ => None,
    }
}

fn format_from_extension(path: &Path) -> FileFormat {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("json") | Some("jsonl") | Some("ndjson") => FileFormat::Json,
        Some("csv") | Some("tsv") | Some("txt") | Some("dat") => FileFormat::Csv,
        _ => FileFormat::Unknown,
    }
}
