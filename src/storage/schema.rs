//! Coercion schema for a loaded dataset.
//!
//! Declares, per field, the target type and the fallback policy applied when
//! a raw cell is missing or unparsable. The schema is the bridge between the
//! untyped reader output and the typed [`Record`](super::record::Record).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::labels::{LabelRegistry, LabelTable};
use crate::error::{PipelineError, Result};
use crate::io::{RawTable, RawValue};

/// Target types for field coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// 64-bit float.
    Number,
    /// Float truncated toward zero.
    Integer,
    /// Timestamp (naive, no zone).
    Date,
    /// Categorical code, optionally mapped through a label table.
    Category,
    /// Free text.
    Text,
}

impl DataType {
    /// Whether range constraints and bounds apply to this type.
    pub fn is_ordinal(self) -> bool {
        matches!(self, DataType::Number | DataType::Integer | DataType::Date)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Number | DataType::Integer)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Number => write!(f, "number"),
            DataType::Integer => write!(f, "integer"),
            DataType::Date => write!(f, "date"),
            DataType::Category => write!(f, "category"),
            DataType::Text => write!(f, "text"),
        }
    }
}

/// What a numeric field becomes when its cell is missing or unparsable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Coerce to `0`.
    #[default]
    Zero,
    /// Leave the value absent.
    Null,
}

/// Default date sentinel: the all-zero placeholder date.
fn default_sentinels() -> Vec<String> {
    vec!["0000-00-00".to_string()]
}

/// Label used for absent categorical values when a field declares none.
pub const DEFAULT_MISSING_LABEL: &str = "Unknown";

/// A declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field (column) name as it appears in the input.
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Fallback for numeric fields.
    #[serde(default)]
    pub missing: MissingPolicy,
    /// Name of a label table for `category` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
    /// Literal date tokens that mean "no date".
    #[serde(default = "default_sentinels")]
    pub sentinels: Vec<String>,
    /// Label reported for absent values in grouping and membership checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_label: Option<String>,
    /// Exclude zeros when deriving the field's bounds.
    #[serde(default)]
    pub bounds_ignore_zero: bool,
}

impl FieldDef {
    /// A field with default policies.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            missing: MissingPolicy::Zero,
            labels: None,
            sentinels: default_sentinels(),
            missing_label: None,
            bounds_ignore_zero: false,
        }
    }

    pub fn with_missing(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }

    pub fn with_labels(mut self, table: impl Into<String>) -> Self {
        self.labels = Some(table.into());
        self
    }

    pub fn with_missing_label(mut self, label: impl Into<String>) -> Self {
        self.missing_label = Some(label.into());
        self
    }

    pub fn ignoring_zero_bounds(mut self) -> Self {
        self.bounds_ignore_zero = true;
        self
    }

    pub fn missing_label(&self) -> &str {
        self.missing_label.as_deref().unwrap_or(DEFAULT_MISSING_LABEL)
    }
}

/// Runtime schema: declared fields plus their resolved label tables.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldDef>,
    tables: Vec<Option<Arc<LabelTable>>>,
}

impl Schema {
    /// Create a schema whose fields reference no label tables.
    ///
    /// Fields that do name a table resolve against the built-in registry.
    pub fn new(fields: Vec<FieldDef>) -> Result<Self> {
        Self::with_registry(fields, LabelRegistry::builtin())
    }

    /// Create a schema, resolving label-table names against `registry`.
    ///
    /// # Errors
    /// Returns [`PipelineError::Config`] for duplicate field names, label
    /// tables on non-category fields, or unknown table names.
    pub fn with_registry(fields: Vec<FieldDef>, registry: &LabelRegistry) -> Result<Self> {
        let mut tables = Vec::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(PipelineError::Config(format!(
                    "field '{}' declared twice",
                    field.name
                )));
            }
            let table = match &field.labels {
                None => None,
                Some(_) if field.data_type != DataType::Category => {
                    return Err(PipelineError::Config(format!(
                        "field '{}' has a label table but is of type {}",
                        field.name, field.data_type
                    )))
                }
                Some(name) => Some(registry.get(name).ok_or_else(|| {
                    PipelineError::Config(format!(
                        "field '{}' references unknown label table '{}'",
                        field.name, name
                    ))
                })?),
            };
            tables.push(table);
        }
        Ok(Self { fields, tables })
    }

    /// Infer a schema from raw cells.
    ///
    /// A column whose non-null cells all parse as numbers becomes `number`;
    /// all dates (and not numbers) → `date`; otherwise `category`.
    pub fn infer(table: &RawTable) -> Self {
        let fields = table
            .columns
            .iter()
            .map(|name| {
                let cells = table.records.iter().filter_map(|r| r.get(name));
                FieldDef::new(name.clone(), infer_type(cells))
            })
            .collect();
        Self {
            tables: vec![None; table.columns.len()],
            fields,
        }
    }

    /// Number of fields.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field_at(&self, idx: usize) -> &FieldDef {
        &self.fields[idx]
    }

    /// Field index by name: exact match first, then case-insensitive.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .or_else(|| self.fields.iter().position(|f| f.name.eq_ignore_ascii_case(name)))
    }

    /// Field index by name, as an error when absent.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.field_index(name)
            .ok_or_else(|| PipelineError::UnknownField(name.to_string()))
    }

    /// Field index by name, additionally requiring the given kind of type.
    pub fn require_numeric(&self, name: &str) -> Result<usize> {
        let idx = self.require(name)?;
        if !self.fields[idx].data_type.is_numeric() {
            return Err(PipelineError::Config(format!(
                "field '{}' is {}, expected a numeric field",
                name, self.fields[idx].data_type
            )));
        }
        Ok(idx)
    }

    pub fn require_date(&self, name: &str) -> Result<usize> {
        let idx = self.require(name)?;
        if self.fields[idx].data_type != DataType::Date {
            return Err(PipelineError::Config(format!(
                "field '{}' is {}, expected a date field",
                name, self.fields[idx].data_type
            )));
        }
        Ok(idx)
    }

    /// The resolved label table for field `idx`, if any.
    pub fn label_table(&self, idx: usize) -> Option<&LabelTable> {
        self.tables[idx].as_deref()
    }

    /// Indices of fields that carry bounds.
    pub fn ordinal_fields(&self) -> impl Iterator<Item = usize> + '_ {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.data_type.is_ordinal())
            .map(|(i, _)| i)
    }
}

fn infer_type<'a>(cells: impl Iterator<Item = &'a RawValue>) -> DataType {
    let mut numeric = true;
    let mut dated = true;
    let mut any = false;
    for cell in cells {
        match cell {
            RawValue::Null => continue,
            RawValue::Num(_) => dated = false,
            RawValue::Bool(_) => {
                numeric = false;
                dated = false;
            }
            RawValue::Str(s) => {
                if crate::pipeline::coerce::parse_number(s).is_none() {
                    numeric = false;
                }
                if crate::pipeline::coerce::parse_date(s).is_none() {
                    dated = false;
                }
            }
        }
        any = true;
        if !numeric && !dated {
            break;
        }
    }
    match (any, numeric, dated) {
        (false, _, _) => DataType::Category,
        (true, true, _) => DataType::Number,
        (true, false, true) => DataType::Date,
        _ => DataType::Category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_raw;

    fn sample() -> Schema {
        Schema::new(vec![
            FieldDef::new("id", DataType::Integer),
            FieldDef::new("amount", DataType::Number).with_missing(MissingPolicy::Null),
            FieldDef::new("name", DataType::Text),
            FieldDef::new("when", DataType::Date),
        ])
        .unwrap()
    }

    #[test]
    fn test_schema_basics() {
        let schema = sample();
        assert_eq!(schema.num_fields(), 4);
        assert_eq!(schema.field_index("id"), Some(0));
        assert_eq!(schema.field_index("AMOUNT"), Some(1));
        assert_eq!(schema.field_index("missing"), None);
        assert_eq!(schema.ordinal_fields().collect::<Vec<_>>(), vec![0, 1, 3]);
    }

    #[test]
    fn test_require_errors() {
        let schema = sample();
        assert!(matches!(schema.require("nope"), Err(PipelineError::UnknownField(_))));
        assert!(matches!(schema.require_numeric("name"), Err(PipelineError::Config(_))));
        assert!(schema.require_numeric("amount").is_ok());
        assert!(schema.require_date("when").is_ok());
        assert!(schema.require_date("id").is_err());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = Schema::new(vec![
            FieldDef::new("a", DataType::Number),
            FieldDef::new("a", DataType::Text),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn test_label_table_resolution() {
        let schema = Schema::new(vec![
            FieldDef::new("Municipality", DataType::Category).with_labels("bergen_municipalities"),
        ])
        .unwrap();
        assert_eq!(schema.label_table(0).unwrap().lookup("201"), Some("Allendale"));

        let err = Schema::new(vec![FieldDef::new("m", DataType::Category).with_labels("nope")]);
        assert!(err.is_err());
        let err = Schema::new(vec![FieldDef::new("m", DataType::Number).with_labels("bergen_municipalities")]);
        assert!(err.is_err());
    }

    #[test]
    fn test_missing_label_default() {
        let f = FieldDef::new("brand", DataType::Category);
        assert_eq!(f.missing_label(), "Unknown");
        let f = f.with_missing_label("NO_BRAND");
        assert_eq!(f.missing_label(), "NO_BRAND");
    }

    #[test]
    fn test_infer_schema() {
        let raw = parse_raw("id,price,sold,city\n1,100.5,2024-01-02,Paris\n2,,2024-02-03,\n").unwrap();
        let schema = Schema::infer(&raw);
        let types: Vec<DataType> = schema.fields().iter().map(|f| f.data_type).collect();
        assert_eq!(
            types,
            vec![DataType::Number, DataType::Number, DataType::Date, DataType::Category]
        );
    }

    #[test]
    fn test_field_def_serde_defaults() {
        let f: FieldDef = serde_json::from_str(r#"{"name": "Sale Date", "type": "date"}"#).unwrap();
        assert_eq!(f.data_type, DataType::Date);
        assert_eq!(f.missing, MissingPolicy::Zero);
        assert_eq!(f.sentinels, vec!["0000-00-00"]);
        assert!(!f.bounds_ignore_zero);
    }
}
