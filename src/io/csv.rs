//! Delimited-text reader.
//!
//! Detects the delimiter (comma, tab, pipe, or semicolon by frequency analysis of the
//! header line), then parses the whole input with the `csv` crate into
//! [`RawRecord`]s. Empty cells become [`RawValue::Null`]; short rows simply
//! omit their trailing fields.

use std::path::{Path, PathBuf};

use super::{RawRecord, RawTable, RawValue};
use crate::error::{PipelineError, Result};
use crate::io::format_detect::FileFormat;

/// Metadata extracted from a CSV header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvMetadata {
    /// Column names extracted from the header line.
    pub column_names: Vec<String>,
    /// Detected delimiter character.
    pub delimiter: u8,
    /// Path to the source file, when the input came from disk.
    pub file_path: Option<PathBuf>,
}

impl CsvMetadata {
    /// The delimiter as a displayable character.
    pub fn delimiter_char(&self) -> char {
        self.delimiter as char
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }
}

/// Candidate delimiters in priority order.
const CANDIDATES: &[u8] = b",\t|;";

/// Detect the most likely delimiter in a header line.
///
/// Counts occurrences of each candidate delimiter and returns the one with
/// the highest frequency. If no candidate appears, defaults to comma.
fn detect_delimiter(line: &str) -> u8 {
    let mut best = b',';
    let mut best_count = 0usize;

    for &delim in CANDIDATES {
        let count = line.bytes().filter(|&b| b == delim).count();
        if count > best_count {
            best_count = count;
            best = delim;
        }
    }

    best
}

/// Normalize header cells: trim, and name empty cells `_col_N` (0-indexed).
fn normalize_headers<'a>(cells: impl Iterator<Item = &'a str>) -> Vec<String> {
    cells
        .enumerate()
        .map(|(i, name)| {
            let trimmed = name.trim().trim_start_matches('\u{feff}').to_string();
            if trimmed.is_empty() {
                format!("_col_{}", i)
            } else {
                trimmed
            }
        })
        .collect()
}

/// Parse CSV content held in memory.
///
/// # Errors
/// Returns [`PipelineError::Parse`] if the content has no header line or a
/// row is malformed (for example an unterminated quote). No partial table is
/// returned in that case.
pub fn parse_csv_str(content: &str) -> Result<(CsvMetadata, RawTable)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let header_line = content
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| PipelineError::parse(FileFormat::Csv, "input is empty, no header line"))?;
    let delimiter = detect_delimiter(header_line);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::parse(FileFormat::Csv, format!("bad header: {}", e)))?;
    let column_names = normalize_headers(headers.iter());

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            PipelineError::parse(FileFormat::Csv, format!("row {}: {}", row + 1, e))
        })?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        let fields = column_names
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| {
                let value = if cell.is_empty() {
                    RawValue::Null
                } else {
                    RawValue::Str(cell.to_string())
                };
                (name.clone(), value)
            })
            .collect();
        records.push(RawRecord { key: None, fields });
    }

    let meta = CsvMetadata {
        column_names: column_names.clone(),
        delimiter,
        file_path: None,
    };
    Ok((
        meta,
        RawTable {
            columns: column_names,
            records,
            format: FileFormat::Csv,
        },
    ))
}

/// Read and parse a CSV file.
///
/// # Errors
/// Returns an I/O error if the file cannot be read, or a parse error as for
/// [`parse_csv_str`].
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<(CsvMetadata, RawTable)> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let (mut meta, table) = parse_csv_str(&content)?;
    meta.file_path = Some(path.to_path_buf());
    Ok((meta, table))
}
