//! Raw record → typed record normalization.
//!
//! Policies, per declared type:
//! - `number` / `integer`: unparsable or missing → `0` (or null under
//!   `missing = "null"`); integers truncate toward zero.
//! - `date`: declared sentinels and unparsable values → null, never a zero date.
//!   Raw JSON numbers are read as epoch milliseconds.
//! - `category`: looked up in the field's label table; unknown codes pass
//!   through as their own label.
//! - `text`: trimmed; empty → null.
//!
//! A non-empty cell that fails to parse counts as one anomaly. Anomalies are
//! never fatal and the record is kept.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::io::{RawRecord, RawTable, RawValue};
use crate::storage::labels::LabelTable;
use crate::storage::record::{Dataset, Record, Value};
use crate::storage::schema::{DataType, FieldDef, MissingPolicy, Schema};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Parse a numeric token. Accepts a leading `$` and `,` thousands separators.
pub fn parse_number(token: &str) -> Option<f64> {
    let trimmed = token.trim();
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }
    let cleaned: String = trimmed.chars().filter(|&c| c != ',').collect();
    match cleaned.parse::<f64>() {
        Ok(n) if n.is_finite() => Some(n),
        _ => None,
    }
}

/// Parse a date or date-time token.
pub fn parse_date(token: &str) -> Option<NaiveDateTime> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Outcome of coercing one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub value: Value,
    /// A non-empty cell failed to parse and fell back to the default.
    pub anomaly: bool,
}

impl Coerced {
    fn ok(value: Value) -> Self {
        Self {
            value,
            anomaly: false,
        }
    }

    fn fallback(value: Value) -> Self {
        Self {
            value,
            anomaly: true,
        }
    }
}

/// Coerce one raw cell (absent = `None`) according to `field`.
pub fn coerce_value(raw: Option<&RawValue>, field: &FieldDef, table: Option<&LabelTable>) -> Coerced {
    let raw = raw.unwrap_or(&RawValue::Null);
    match field.data_type {
        DataType::Number => coerce_numeric(raw, field.missing, false),
        DataType::Integer => coerce_numeric(raw, field.missing, true),
        DataType::Date => coerce_date(raw, &field.sentinels),
        DataType::Category => Coerced::ok(match raw.as_text() {
            Some(code) => {
                let code = code.trim();
                if code.is_empty() {
                    Value::Null
                } else {
                    Value::Text(match table {
                        Some(t) => t.label_or_raw(code),
                        None => code.to_string(),
                    })
                }
            }
            None => Value::Null,
        }),
        DataType::Text => Coerced::ok(match raw.as_text() {
            Some(text) if !text.trim().is_empty() => Value::Text(text.trim().to_string()),
            _ => Value::Null,
        }),
    }
}

fn missing_value(policy: MissingPolicy) -> Value {
    match policy {
        MissingPolicy::Zero => Value::Number(0.0),
        MissingPolicy::Null => Value::Null,
    }
}

fn coerce_numeric(raw: &RawValue, policy: MissingPolicy, truncate: bool) -> Coerced {
    let parsed = match raw {
        RawValue::Null => return Coerced::ok(missing_value(policy)),
        RawValue::Num(n) if n.is_finite() => Some(*n),
        RawValue::Num(_) | RawValue::Bool(_) => None,
        RawValue::Str(s) if s.trim().is_empty() => return Coerced::ok(missing_value(policy)),
        RawValue::Str(s) => parse_number(s),
    };
    match parsed {
        Some(n) if truncate => Coerced::ok(Value::Number(n.trunc())),
        Some(n) => Coerced::ok(Value::Number(n)),
        None => Coerced::fallback(missing_value(policy)),
    }
}

fn coerce_date(raw: &RawValue, sentinels: &[String]) -> Coerced {
    match raw {
        RawValue::Null => Coerced::ok(Value::Null),
        RawValue::Str(s) => {
            let token = s.trim();
            if token.is_empty() || sentinels.iter().any(|sentinel| sentinel == token) {
                return Coerced::ok(Value::Null);
            }
            match parse_date(token) {
                Some(dt) => Coerced::ok(Value::Date(dt)),
                None => Coerced::fallback(Value::Null),
            }
        }
        RawValue::Num(ms) => match DateTime::from_timestamp_millis(*ms as i64) {
            Some(dt) if ms.is_finite() => Coerced::ok(Value::Date(dt.naive_utc())),
            _ => Coerced::fallback(Value::Null),
        },
        RawValue::Bool(_) => Coerced::fallback(Value::Null),
    }
}

/// Coerce a raw record into a typed record. Returns the record and its anomaly count.
pub fn coerce_record(index: usize, raw: &RawRecord, schema: &Schema) -> (Record, usize) {
    let mut anomalies = 0;
    let values = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let coerced = coerce_value(raw.get(&field.name), field, schema.label_table(i));
            if coerced.anomaly {
                anomalies += 1;
                log::debug!(
                    "record {}: field '{}' failed to coerce to {}, using default",
                    index,
                    field.name,
                    field.data_type
                );
            }
            coerced.value
        })
        .collect();
    (Record::new(index, raw.key.clone(), values), anomalies)
}

/// Normalize a whole raw table into an immutable [`Dataset`].
pub fn normalize(table: &RawTable, schema: Arc<Schema>) -> Dataset {
    for field in schema.fields() {
        if !table.columns.iter().any(|c| c == &field.name) {
            log::warn!("field '{}' does not appear in the input; treating as absent", field.name);
        }
    }

    let mut anomalies = 0;
    let records = table
        .records
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let (record, n) = coerce_record(i, raw, &schema);
            anomalies += n;
            record
        })
        .collect();

    if anomalies > 0 {
        log::info!("{} cells fell back to their default value during coercion", anomalies);
    }
    Dataset::new(schema, records, anomalies)
}
