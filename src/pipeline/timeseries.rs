//! Period-bucketed series broken down by entity.
//!
//! Entities are ranked once by their sum over the whole input. The top K get
//! their own column in every period; everything else lands in `Others`.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::aggregate::{shorten_label, OTHERS_LABEL};
use crate::error::Result;
use crate::storage::record::Record;
use crate::storage::schema::Schema;

/// Period granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Day,
    /// `YYYY-MM`.
    #[default]
    Month,
    Year,
}

impl Period {
    /// Sortable period key for `date`.
    pub fn key(self, date: &NaiveDateTime) -> String {
        match self {
            Period::Day => date.format("%Y-%m-%d").to_string(),
            Period::Month => date.format("%Y-%m").to_string(),
            Period::Year => date.format("%Y").to_string(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

fn default_label_width() -> usize {
    15
}

/// A time-series request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub date: String,
    pub entity: String,
    pub value: String,
    #[serde(default)]
    pub period: Period,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Entity labels longer than this are shortened.
    #[serde(default = "default_label_width")]
    pub label_width: usize,
}

impl SeriesSpec {
    pub fn new(date: impl Into<String>, entity: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            entity: entity.into(),
            value: value.into(),
            period: Period::default(),
            top_k: default_top_k(),
            label_width: default_label_width(),
        }
    }
}

/// One period's row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub period: String,
    /// Per ranked entity, in ranking order.
    pub values: Vec<f64>,
    pub others: f64,
}

/// The bucketed series.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSeries {
    /// Ranked entities, full names.
    pub entities: Vec<String>,
    /// Display labels, parallel to `entities`.
    pub labels: Vec<String>,
    /// Ascending by period.
    pub points: Vec<SeriesPoint>,
}

impl TimeSeries {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Distinct years present, ascending.
    pub fn years(&self) -> Vec<String> {
        let mut years: Vec<String> = self
            .points
            .iter()
            .filter_map(|p| p.period.split('-').next().map(str::to_string))
            .collect();
        years.dedup();
        years
    }

    /// Keep periods starting with `prefix` (a year, or `"all"` for everything).
    pub fn filter_year(&self, prefix: &str) -> TimeSeries {
        if prefix == "all" {
            return self.clone();
        }
        TimeSeries {
            entities: self.entities.clone(),
            labels: self.labels.clone(),
            points: self
                .points
                .iter()
                .filter(|p| p.period.starts_with(prefix))
                .cloned()
                .collect(),
        }
    }

    /// Column headers for tabular output: period, entity labels, `Others`.
    pub fn columns(&self) -> Vec<String> {
        let mut cols = Vec::with_capacity(self.labels.len() + 2);
        cols.push("period".to_string());
        cols.extend(self.labels.iter().cloned());
        cols.push(OTHERS_LABEL.to_string());
        cols
    }
}

/// Bucket `records` by period and entity.
///
/// Records without a date, an entity, or a non-zero value are left out.
///
/// # Errors
/// Only for a spec naming unknown fields or fields of the wrong type.
pub fn time_series(records: &[&Record], schema: &Schema, spec: &SeriesSpec) -> Result<TimeSeries> {
    let date_idx = schema.require_date(&spec.date)?;
    let entity_idx = schema.require(&spec.entity)?;
    let value_idx = schema.require_numeric(&spec.value)?;

    let mut rows: Vec<(String, String, f64)> = Vec::new();
    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, f64> = HashMap::new();
    for record in records {
        let (Some(date), Some(entity), Some(amount)) = (
            record.get(date_idx).as_date(),
            record.label(entity_idx),
            record.get(value_idx).as_f64(),
        ) else {
            continue;
        };
        if amount == 0.0 {
            continue;
        }
        match totals.get_mut(&entity) {
            Some(total) => *total += amount,
            None => {
                totals.insert(entity.clone(), amount);
                order.push(entity.clone());
            }
        }
        rows.push((spec.period.key(date), entity, amount));
    }

    let mut ranked = order;
    ranked.sort_by(|a, b| totals[b].total_cmp(&totals[a]));
    ranked.truncate(spec.top_k);
    let slot_of: HashMap<&str, usize> = ranked.iter().enumerate().map(|(i, e)| (e.as_str(), i)).collect();

    let mut periods: BTreeMap<String, SeriesPoint> = BTreeMap::new();
    for (period, entity, amount) in &rows {
        let point = periods.entry(period.clone()).or_insert_with(|| SeriesPoint {
            period: period.clone(),
            values: vec![0.0; ranked.len()],
            others: 0.0,
        });
        match slot_of.get(entity.as_str()) {
            Some(&i) => point.values[i] += amount,
            None => point.others += amount,
        }
    }

    let labels = ranked.iter().map(|e| shorten_label(e, spec.label_width)).collect();
    Ok(TimeSeries {
        entities: ranked,
        labels,
        points: periods.into_values().collect(),
    })
}
