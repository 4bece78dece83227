//! I/O subsystem: format detection and raw (untyped) record readers.

pub mod csv;
pub mod format_detect;
pub mod json;

use std::collections::HashMap;
use std::path::Path;

use crate::error::{PipelineError, Result};
use format_detect::FileFormat;

/// An untyped cell as produced by a reader, before schema coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

impl RawValue {
    /// Textual form of the cell, `None` for null.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Str(s) => Some(s.clone()),
            RawValue::Num(n) => Some(format_raw_number(*n)),
            RawValue::Bool(b) => Some(b.to_string()),
            RawValue::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

/// Integral floats print without a fractional part (`201.0` → `"201"`).
pub(crate) fn format_raw_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// One source row: field name → raw cell. Missing fields are simply absent.
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    /// Source key for keyed JSON objects (`{"k1": {...}, "k2": {...}}`).
    pub key: Option<String>,
    pub fields: HashMap<String, RawValue>,
}

impl RawRecord {
    pub fn get(&self, field: &str) -> Option<&RawValue> {
        self.fields.get(field)
    }
}

/// A fully parsed input file.
#[derive(Debug, Clone)]
pub struct RawTable {
    /// Column names in first-seen order.
    pub columns: Vec<String>,
    pub records: Vec<RawRecord>,
    pub format: FileFormat,
}

/// Detect the format of `path` and parse it in full.
///
/// # Errors
/// I/O failures, unrecognized formats, and parse failures are all fatal:
/// no partial table is returned.
pub fn load_raw<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let path = path.as_ref();
    let format = format_detect::detect_format(path)?;
    log::debug!("detected {} input: {}", format, path.display());
    match format {
        FileFormat::Csv => {
            let (meta, table) = csv::read_csv(path)?;
            log::debug!(
                "delimiter '{}', {} columns, {} rows",
                meta.delimiter_char().escape_default(),
                meta.column_count(),
                table.records.len()
            );
            Ok(table)
        }
        FileFormat::Json => json::read_json(path),
        FileFormat::Unknown => Err(PipelineError::parse(
            FileFormat::Unknown,
            format!("cannot determine format of '{}'", path.display()),
        )),
    }
}

/// Parse in-memory content, detecting JSON by its leading byte and treating
/// everything else as delimited text.
pub fn parse_raw(content: &str) -> Result<RawTable> {
    match format_detect::detect_bytes(content.as_bytes()) {
        Some(FileFormat::Json) => json::parse_json_str(content),
        _ => csv::parse_csv_str(content).map(|(_, table)| table),
    }
}
