//! Typed records and the immutable dataset they belong to.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::schema::Schema;

/// A normalized cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Date(NaiveDateTime),
    Text(String),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric value, `None` for non-numbers and NaN.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    /// Position on the field's ordinal axis: numbers as-is, dates as epoch
    /// milliseconds. `None` for text, null, and NaN.
    pub fn ordinal(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            Value::Date(d) => Some(d.and_utc().timestamp_millis() as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&NaiveDateTime> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", crate::io::format_raw_number(*n)),
            Value::Date(d) => {
                if d.time() == chrono::NaiveTime::MIN {
                    write!(f, "{}", d.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S"))
                }
            }
            Value::Text(s) => write!(f, "{}", s),
            Value::Null => write!(f, ""),
        }
    }
}

/// One normalized row. Values are positional, in schema field order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Position in the source input; the record's identity.
    pub index: usize,
    /// Source key for keyed JSON objects.
    pub key: Option<String>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(index: usize, key: Option<String>, values: Vec<Value>) -> Self {
        Self { index, key, values }
    }

    pub fn get(&self, field_idx: usize) -> &Value {
        self.values.get(field_idx).unwrap_or(&Value::Null)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Categorical label for grouping and membership: text as-is, numbers
    /// and dates in display form, `None` when absent.
    pub fn label(&self, field_idx: usize) -> Option<String> {
        match self.get(field_idx) {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// The full, immutable record collection for a session.
#[derive(Debug, Clone)]
pub struct Dataset {
    schema: Arc<Schema>,
    records: Vec<Record>,
    anomalies: usize,
}

impl Dataset {
    pub fn new(schema: Arc<Schema>, records: Vec<Record>, anomalies: usize) -> Self {
        Self {
            schema,
            records,
            anomalies,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of cells that failed to coerce and fell back to a default.
    pub fn anomalies(&self) -> usize {
        self.anomalies
    }
}

/// Serializes a record as a JSON object keyed by field name.
pub struct RecordView<'a> {
    pub schema: &'a Schema,
    pub record: &'a Record,
}

impl Serialize for RecordView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.schema.num_fields()))?;
        for (i, field) in self.schema.fields().iter().enumerate() {
            match self.record.get(i) {
                Value::Number(n) => map.serialize_entry(&field.name, n)?,
                Value::Null => map.serialize_entry(&field.name, &())?,
                other => map.serialize_entry(&field.name, &other.to_string())?,
            }
        }
        map.end()
    }
}
