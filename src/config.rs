//! Dashboard configuration file.
//!
//! A JSON document declaring the coercion schema, extra label tables, and the
//! aggregates to compute. Every section is optional:
//!
//! ```json
//! {
//!   "fields": [
//!     {"name": "Municipality", "type": "category", "labels": "bergen_municipalities"},
//!     {"name": "Sale Price", "type": "number"},
//!     {"name": "Sale Date", "type": "date"}
//!   ],
//!   "label_tables": {
//!     "regions": {"codes": {"N": "North", "S": "South"}}
//!   },
//!   "aggregates": [
//!     {"kind": "groups", "title": "Sales by town", "key": "Municipality",
//!      "value": "Sale Price", "sort": "sum_desc", "top": 10, "metric": "sum"}
//!   ],
//!   "page_size": 50
//! }
//! ```
//!
//! Without `fields` the schema is inferred from the data.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::io::RawTable;
use crate::pipeline::aggregate::{Bucket, GroupSort, GroupSpec, Histogram, Metric, MissingKey};
use crate::pipeline::timeseries::{Period, SeriesSpec};
use crate::pipeline::{AggregateRequest, Pipeline};
use crate::storage::labels::{LabelRegistry, LabelTable};
use crate::storage::schema::{FieldDef, Schema};

/// A label table declared in the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelTableDef {
    /// Code → label.
    Codes { codes: BTreeMap<String, String> },
    /// Group name → member codes, in order. A code in several groups belongs to the first.
    Groups { groups: Vec<GroupDef> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDef {
    pub name: String,
    pub codes: Vec<String>,
}

impl LabelTableDef {
    pub fn build(&self) -> LabelTable {
        match self {
            LabelTableDef::Codes { codes } => LabelTable::from_pairs(codes.iter().map(|(c, l)| (c.clone(), l.clone()))),
            LabelTableDef::Groups { groups } => LabelTable::from_pairs(
                groups
                    .iter()
                    .flat_map(|g| g.codes.iter().map(move |c| (c.clone(), g.name.clone()))),
            ),
        }
    }
}

/// One aggregate declared in the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateDef {
    Groups {
        title: String,
        key: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        missing_key: MissingKey,
        #[serde(default)]
        missing_label: Option<String>,
        #[serde(default)]
        regroup: Option<String>,
        #[serde(default)]
        regroup_fallback: Option<String>,
        #[serde(default)]
        sort: GroupSort,
        #[serde(default)]
        exclude_missing: bool,
        #[serde(default)]
        top: Option<usize>,
        #[serde(default)]
        metric: Metric,
    },
    Histogram {
        title: String,
        field: String,
        buckets: Vec<Bucket>,
    },
    Series {
        title: String,
        date: String,
        entity: String,
        value: String,
        #[serde(default)]
        period: Period,
        #[serde(default)]
        top_k: Option<usize>,
        #[serde(default)]
        label_width: Option<usize>,
        #[serde(default)]
        year: Option<String>,
    },
    Sums {
        title: String,
        fields: Vec<String>,
    },
    Summary {
        title: String,
        field: String,
    },
}

impl AggregateDef {
    /// Resolve table names and validate buckets.
    pub fn resolve(&self, registry: &LabelRegistry) -> Result<AggregateRequest> {
        Ok(match self.clone() {
            AggregateDef::Groups {
                title,
                key,
                value,
                missing_key,
                missing_label,
                regroup,
                regroup_fallback,
                sort,
                exclude_missing,
                top,
                metric,
            } => {
                let regroup = match regroup {
                    Some(name) => Some(registry.get(&name).ok_or_else(|| {
                        PipelineError::Config(format!("aggregate '{}' references unknown label table '{}'", title, name))
                    })?),
                    None => None,
                };
                let spec = GroupSpec {
                    key,
                    value,
                    missing_key,
                    missing_label,
                    regroup,
                    regroup_fallback,
                    sort,
                    exclude_missing,
                };
                AggregateRequest::Groups {
                    title,
                    spec,
                    top: top.map(|n| (n, metric)),
                }
            }
            AggregateDef::Histogram { title, field, buckets } => AggregateRequest::Histogram {
                title,
                field,
                histogram: Histogram::new(buckets)?,
            },
            AggregateDef::Series {
                title,
                date,
                entity,
                value,
                period,
                top_k,
                label_width,
                year,
            } => {
                let mut spec = SeriesSpec::new(date, entity, value);
                spec.period = period;
                if let Some(k) = top_k {
                    spec.top_k = k;
                }
                if let Some(w) = label_width {
                    spec.label_width = w;
                }
                AggregateRequest::Series { title, spec, year }
            }
            AggregateDef::Sums { title, fields } => AggregateRequest::Sums { title, fields },
            AggregateDef::Summary { title, field } => AggregateRequest::Summary { title, field },
        })
    }
}

/// Top-level dashboard configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Declared fields; empty = infer from the data.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub label_tables: BTreeMap<String, LabelTableDef>,
    #[serde(default)]
    pub aggregates: Vec<AggregateDef>,
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Where filter state persists; the home-directory default when unset.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

/// Read a config file.
///
/// # Errors
/// I/O failures, and [`PipelineError::Config`] for malformed JSON.
pub fn load_config(path: &Path) -> Result<DashboardConfig> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| PipelineError::Config(format!("failed to parse config {}: {}", path.display(), e)))
}

impl DashboardConfig {
    /// Built-in tables plus the ones declared here.
    pub fn registry(&self) -> LabelRegistry {
        let mut local = LabelRegistry::new();
        for (name, def) in &self.label_tables {
            local.insert(name.clone(), def.build());
        }
        local.layered_on_builtin()
    }

    /// The schema for `raw`: declared fields, or inferred when none are declared.
    pub fn schema_for(&self, raw: &RawTable, registry: &LabelRegistry) -> Result<Schema> {
        if self.fields.is_empty() {
            let schema = Schema::infer(raw);
            log::debug!("inferred schema with {} fields", schema.num_fields());
            Ok(schema)
        } else {
            Schema::with_registry(self.fields.clone(), registry)
        }
    }

    pub fn aggregate_requests(&self, registry: &LabelRegistry) -> Result<Vec<AggregateRequest>> {
        self.aggregates.iter().map(|a| a.resolve(registry)).collect()
    }

    /// Load `data_path` and assemble the pipeline this config describes.
    pub fn build_pipeline(&self, data_path: &Path) -> Result<Pipeline> {
        let raw = crate::io::load_raw(data_path)?;
        self.build_pipeline_from(&raw)
    }

    /// Assemble the pipeline over an already parsed table.
    pub fn build_pipeline_from(&self, raw: &RawTable) -> Result<Pipeline> {
        let registry = self.registry();
        let schema = self.schema_for(raw, &registry)?;
        let requests = self.aggregate_requests(&registry)?;
        let pipeline = Pipeline::from_raw(raw, Arc::new(schema)).with_aggregates(requests)?;
        Ok(match self.page_size {
            Some(n) => pipeline.with_page_size(n),
            None => pipeline,
        })
    }
}
