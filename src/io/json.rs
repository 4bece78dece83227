//! JSON reader.
//!
//! Accepts three shapes:
//! - a top-level array of objects (one record per element),
//! - a top-level object whose values are all objects (one record per entry,
//!   in source order; the entry key becomes the record's source key),
//! - NDJSON, one object per line.
//!
//! Nested objects are flattened into dotted column names
//! (`{"brand": {"key": "PARK"}}` → `brand.key`). Arrays of scalars are joined
//! with `", "`; arrays of objects are flattened per sub-field and joined the
//! same way (`awardTypes.label`).

use std::collections::HashMap;
use std::path::Path;

use serde_json::{Map, Value as Json};

use super::{RawRecord, RawTable, RawValue};
use crate::error::{PipelineError, Result};
use crate::io::format_detect::FileFormat;

/// Separator used when joining array elements into a single cell.
const ARRAY_JOIN: &str = ", ";

/// Parse JSON or NDJSON content held in memory.
///
/// # Errors
/// Returns [`PipelineError::Parse`] when the content is neither a JSON
/// document of a supported shape nor valid NDJSON.
pub fn parse_json_str(content: &str) -> Result<RawTable> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    if content.trim().is_empty() {
        return Err(PipelineError::parse(FileFormat::Json, "input is empty"));
    }

    let mut columns = ColumnOrder::default();
    let records = match serde_json::from_str::<Json>(content) {
        Ok(doc) => records_from_document(doc, &mut columns)?,
        Err(doc_err) => parse_ndjson(content, &mut columns).map_err(|line_err| {
            // Report the whole-document error when the input is not line-oriented either.
            if content.lines().filter(|l| !l.trim().is_empty()).count() <= 1 {
                PipelineError::parse(FileFormat::Json, doc_err.to_string())
            } else {
                line_err
            }
        })?,
    };

    Ok(RawTable {
        columns: columns.names,
        records,
        format: FileFormat::Json,
    })
}

/// Read and parse a JSON / NDJSON file.
pub fn read_json<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let content = std::fs::read_to_string(path)?;
    parse_json_str(&content)
}

fn records_from_document(doc: Json, columns: &mut ColumnOrder) -> Result<Vec<RawRecord>> {
    match doc {
        Json::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Json::Object(obj) => Ok(flatten_record(None, obj, columns)),
                other => Err(PipelineError::parse(
                    FileFormat::Json,
                    format!("array element {} is not an object (found {})", i, kind(&other)),
                )),
            })
            .collect(),
        Json::Object(obj) => {
            if !obj.is_empty() && obj.values().all(Json::is_object) {
                Ok(obj
                    .into_iter()
                    .filter_map(|(key, value)| match value {
                        Json::Object(inner) => Some(flatten_record(Some(key), inner, columns)),
                        _ => None,
                    })
                    .collect())
            } else {
                Ok(vec![flatten_record(None, obj, columns)])
            }
        }
        other => Err(PipelineError::parse(
            FileFormat::Json,
            format!("top-level value must be an array or object (found {})", kind(&other)),
        )),
    }
}

fn parse_ndjson(content: &str, columns: &mut ColumnOrder) -> Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Json>(line) {
            Ok(Json::Object(obj)) => records.push(flatten_record(None, obj, columns)),
            Ok(other) => {
                return Err(PipelineError::parse(
                    FileFormat::Json,
                    format!("line {} is not an object (found {})", line_no + 1, kind(&other)),
                ))
            }
            Err(e) => {
                return Err(PipelineError::parse(
                    FileFormat::Json,
                    format!("line {}: {}", line_no + 1, e),
                ))
            }
        }
    }
    Ok(records)
}

fn flatten_record(key: Option<String>, obj: Map<String, Json>, columns: &mut ColumnOrder) -> RawRecord {
    let mut fields = HashMap::new();
    flatten_into("", obj, &mut fields);
    // Columns first seen in the same record are discovered in name order.
    let mut names: Vec<&String> = fields.keys().collect();
    names.sort();
    for name in names {
        columns.push(name);
    }
    RawRecord { key, fields }
}

fn flatten_into(prefix: &str, obj: Map<String, Json>, out: &mut HashMap<String, RawValue>) {
    for (name, value) in obj {
        let path = join_path(prefix, &name);
        match value {
            Json::Object(inner) => flatten_into(&path, inner, out),
            Json::Array(items) => flatten_array(&path, items, out),
            scalar => {
                out.insert(path, scalar_to_raw(scalar));
            }
        }
    }
}

fn flatten_array(path: &str, items: Vec<Json>, out: &mut HashMap<String, RawValue>) {
    if items.iter().any(Json::is_object) {
        let mut joined: Vec<(String, Vec<String>)> = Vec::new();
        for item in items {
            if let Json::Object(obj) = item {
                let mut flat = HashMap::new();
                flatten_into("", obj, &mut flat);
                let mut entries: Vec<_> = flat.into_iter().collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                for (sub, value) in entries {
                    let Some(text) = value.as_text() else { continue };
                    match joined.iter_mut().find(|(k, _)| *k == sub) {
                        Some((_, parts)) => parts.push(text),
                        None => joined.push((sub, vec![text])),
                    }
                }
            }
        }
        for (sub, parts) in joined {
            out.insert(join_path(path, &sub), RawValue::Str(parts.join(ARRAY_JOIN)));
        }
    } else {
        let parts: Vec<String> = items
            .into_iter()
            .filter_map(|item| scalar_to_raw(item).as_text())
            .collect();
        let value = if parts.is_empty() {
            RawValue::Null
        } else {
            RawValue::Str(parts.join(ARRAY_JOIN))
        };
        out.insert(path.to_string(), value);
    }
}

fn scalar_to_raw(value: Json) -> RawValue {
    match value {
        Json::Null => RawValue::Null,
        Json::Bool(b) => RawValue::Bool(b),
        Json::Number(n) => n.as_f64().map(RawValue::Num).unwrap_or(RawValue::Null),
        Json::String(s) if s.is_empty() => RawValue::Null,
        Json::String(s) => RawValue::Str(s),
        // Nested containers are handled by the callers.
        Json::Array(_) | Json::Object(_) => RawValue::Null,
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Column names in first-seen order.
#[derive(Default)]
struct ColumnOrder {
    names: Vec<String>,
    seen: std::collections::HashSet<String>,
}

impl ColumnOrder {
    fn push(&mut self, name: &str) {
        if self.seen.insert(name.to_string()) {
            self.names.push(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn get<'a>(table: &'a RawTable, row: usize, col: &str) -> Option<&'a RawValue> {
        table.records[row].fields.get(col)
    }

    #[test]
    fn test_parse_array_of_objects() {
        let table = parse_json_str(r#"[{"id":1,"name":"alice"},{"id":2,"name":"bob"}]"#).unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(get(&table, 0, "id"), Some(&RawValue::Num(1.0)));
        assert_eq!(get(&table, 1, "name"), Some(&RawValue::Str("bob".into())));
        assert_eq!(table.format, FileFormat::Json);
    }

    #[test]
    fn test_parse_keyed_object_keeps_keys() {
        let table = parse_json_str(
            r#"{"h1": {"name": "Park Hyatt", "brand": {"key": "PARK"}},
                "h2": {"name": "Andaz", "brand": {"key": "ANDAZ"}}}"#,
        )
        .unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[0].key.as_deref(), Some("h1"));
        assert_eq!(get(&table, 1, "brand.key"), Some(&RawValue::Str("ANDAZ".into())));
        assert!(table.columns.contains(&"brand.key".to_string()));
    }

    #[test]
    fn test_parse_ndjson() {
        let table = parse_json_str("{\"x\":1.5}\n\n{\"x\":2,\"y\":true}\n").unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(get(&table, 1, "y"), Some(&RawValue::Bool(true)));
        assert_eq!(table.columns, vec!["x", "y"]);
    }

    #[test]
    fn test_keyed_object_keeps_source_order() {
        let table = parse_json_str(r#"{"zeta": {"v": 1}, "alpha": {"v": 2}, "mid": {"v": 3}}"#).unwrap();
        let keys: Vec<_> = table.records.iter().map(|r| r.key.as_deref().unwrap()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(get(&table, 1, "v"), Some(&RawValue::Num(2.0)));
    }

    #[test]
    fn test_flatten_arrays() {
        let table = parse_json_str(
            r#"[{"tags": ["a", "b"], "awardTypes": [{"label": "Gold"}, {"label": "Silver"}]}]"#,
        )
        .unwrap();
        assert_eq!(get(&table, 0, "tags"), Some(&RawValue::Str("a, b".into())));
        assert_eq!(
            get(&table, 0, "awardTypes.label"),
            Some(&RawValue::Str("Gold, Silver".into()))
        );
    }

    #[test]
    fn test_null_and_empty_string_are_null() {
        let table = parse_json_str(r#"[{"a": null, "b": ""}]"#).unwrap();
        assert_eq!(get(&table, 0, "a"), Some(&RawValue::Null));
        assert_eq!(get(&table, 0, "b"), Some(&RawValue::Null));
    }

    #[test]
    fn test_single_flat_object_is_one_record() {
        let table = parse_json_str(r#"{"a": 1, "b": "x"}"#).unwrap();
        assert_eq!(table.records.len(), 1);
        assert!(table.records[0].key.is_none());
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = parse_json_str(r#"[{"a": 1},"#).unwrap_err();
        assert!(matches!(err, PipelineError::Parse { format: FileFormat::Json, .. }));
    }

    #[test]
    fn test_array_of_scalars_rejected() {
        assert!(parse_json_str("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_ndjson_bad_line_rejected() {
        let err = parse_json_str("{\"a\":1}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(parse_json_str("   ").is_err());
    }

    #[test]
    fn test_read_json_file() {
        let mut f = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        f.write_all(br#"[{"v": 3}]"#).unwrap();
        f.flush().unwrap();
        let table = read_json(f.path()).unwrap();
        assert_eq!(get(&table, 0, "v"), Some(&RawValue::Num(3.0)));
    }
}
