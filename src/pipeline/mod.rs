//! The aggregation pipeline: normalize once, then filter and re-aggregate on
//! every filter change.
//!
//! ```text
//! RawTable --coerce--> Dataset --derive--> Bounds
//!                         |                  |
//!            FilterState -+--> apply --> rows --> aggregates --> Snapshot
//! ```
//!
//! [`Pipeline::evaluate`] is a pure function of the dataset and a filter
//! state. [`Pipeline::on_filter_changed`] additionally keeps the result as the
//! current snapshot and rewinds pagination.

pub mod aggregate;
pub mod bounds;
pub mod coerce;
pub mod filter;
pub mod paginate;
pub mod timeseries;

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::io::RawTable;
use crate::storage::record::{Dataset, Record};
use crate::storage::schema::Schema;
use crate::storage::state_store::StateStore;
use aggregate::{BucketCount, Group, GroupSpec, Histogram, Metric, Summary};
use bounds::Bounds;
use filter::FilterState;
use paginate::Materializer;
use timeseries::{SeriesSpec, TimeSeries};

/// State-store key under which the filter state is persisted.
pub const FILTER_STATE_KEY: &str = "filter";

/// One aggregate to recompute on every filter change.
#[derive(Debug, Clone)]
pub enum AggregateRequest {
    Groups {
        title: String,
        spec: GroupSpec,
        /// Collapse to the top N by the metric plus `Others`.
        top: Option<(usize, Metric)>,
    },
    Histogram {
        title: String,
        field: String,
        histogram: Histogram,
    },
    Series {
        title: String,
        spec: SeriesSpec,
        /// Restrict to periods of one year.
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

impl AggregateRequest {
    pub fn title(&self) -> &str {
        match self {
            AggregateRequest::Groups { title, .. }
            | AggregateRequest::Histogram { title, .. }
            | AggregateRequest::Series { title, .. }
            | AggregateRequest::Sums { title, .. }
            | AggregateRequest::Summary { title, .. } => title,
        }
    }

    fn compute(&self, records: &[&Record], schema: &Schema) -> Result<AggregateValue> {
        Ok(match self {
            AggregateRequest::Groups { spec, top, .. } => {
                let groups = aggregate::group_by(records, schema, spec)?;
                let groups = match top {
                    Some((n, metric)) => aggregate::top_n_with_others(&groups, *n, *metric),
                    None => groups,
                };
                AggregateValue::Groups { groups }
            }
            AggregateRequest::Histogram { field, histogram, .. } => {
                let idx = schema.require_numeric(field)?;
                AggregateValue::Histogram {
                    buckets: histogram.compute(records, idx),
                }
            }
            AggregateRequest::Series { spec, year, .. } => {
                let series = timeseries::time_series(records, schema, spec)?;
                let series = match year {
                    Some(y) => series.filter_year(y),
                    None => series,
                };
                AggregateValue::Series { series }
            }
            AggregateRequest::Sums { fields, .. } => {
                let idxs = fields
                    .iter()
                    .map(|f| schema.require_numeric(f))
                    .collect::<Result<Vec<_>>>()?;
                AggregateValue::Sums {
                    fields: fields.clone(),
                    totals: aggregate::sums(records, &idxs),
                }
            }
            AggregateRequest::Summary { field, .. } => {
                let idx = schema.require_numeric(field)?;
                AggregateValue::Summary {
                    field: field.clone(),
                    summary: aggregate::summary(records, idx),
                }
            }
        })
    }
}

/// Result of one [`AggregateRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateValue {
    Groups { groups: Vec<Group> },
    Histogram { buckets: Vec<BucketCount> },
    Series { series: TimeSeries },
    Sums { fields: Vec<String>, totals: Vec<f64> },
    Summary { field: String, summary: Summary },
}

/// A titled aggregate result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedAggregate {
    pub title: String,
    #[serde(flatten)]
    pub value: AggregateValue,
}

/// All aggregates of one filtered subset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregates {
    /// Matching records.
    pub count: usize,
    pub results: Vec<NamedAggregate>,
}

impl Aggregates {
    pub fn get(&self, title: &str) -> Option<&AggregateValue> {
        self.results.iter().find(|a| a.title == title).map(|a| &a.value)
    }
}

/// The filtered subset and its aggregates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Positions of matching records, in source order.
    pub rows: Vec<usize>,
    pub aggregates: Aggregates,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The matching records of `dataset`.
    pub fn records<'a>(&self, dataset: &'a Dataset) -> Vec<&'a Record> {
        self.rows.iter().filter_map(|&i| dataset.records().get(i)).collect()
    }
}

/// A loaded dataset with its bounds, aggregate plan, and pagination.
#[derive(Debug)]
pub struct Pipeline {
    dataset: Dataset,
    bounds: Bounds,
    requests: Vec<AggregateRequest>,
    pager: Materializer,
    current: Snapshot,
}

impl Pipeline {
    /// Wrap a normalized dataset. Bounds are derived here, once.
    pub fn new(dataset: Dataset) -> Self {
        let bounds = Bounds::derive(&dataset);
        log::info!(
            "loaded {} records, {} fields, {} coercion anomalies",
            dataset.len(),
            dataset.schema().num_fields(),
            dataset.anomalies()
        );
        // No aggregate plan yet: every row matches and there is nothing to compute.
        let current = Snapshot {
            rows: (0..dataset.len()).collect(),
            aggregates: Aggregates {
                count: dataset.len(),
                results: Vec::new(),
            },
        };
        Self {
            dataset,
            bounds,
            requests: Vec::new(),
            pager: Materializer::default(),
            current,
        }
    }

    /// Normalize `raw` through `schema` and wrap the result.
    pub fn from_raw(raw: &RawTable, schema: Arc<Schema>) -> Self {
        Self::new(coerce::normalize(raw, schema))
    }

    /// Install the aggregate plan and compute it over the unfiltered dataset.
    ///
    /// # Errors
    /// Any request naming an unknown field or a field of the wrong type.
    pub fn with_aggregates(mut self, requests: Vec<AggregateRequest>) -> Result<Self> {
        self.requests = requests;
        self.current = self.evaluate(&FilterState::new())?;
        Ok(self)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.pager = Materializer::new(page_size);
        self
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn schema(&self) -> &Schema {
        self.dataset.schema()
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn requests(&self) -> &[AggregateRequest] {
        &self.requests
    }

    /// The fully inclusive filter state for this dataset.
    pub fn inclusive_filter(&self) -> FilterState {
        FilterState::inclusive(self.schema(), &self.bounds)
    }

    /// Filter and aggregate without touching pipeline state.
    pub fn evaluate(&self, state: &FilterState) -> Result<Snapshot> {
        let matched = filter::apply(&self.dataset, state)?;
        let mut results = Vec::with_capacity(self.requests.len());
        for request in &self.requests {
            results.push(NamedAggregate {
                title: request.title().to_string(),
                value: request.compute(&matched, self.schema())?,
            });
        }
        Ok(Snapshot {
            rows: matched.iter().map(|r| r.index).collect(),
            aggregates: Aggregates {
                count: matched.len(),
                results,
            },
        })
    }

    /// Recompute for a new filter state, keep it as current, and rewind
    /// pagination to the first page.
    pub fn on_filter_changed(&mut self, state: &FilterState) -> Result<&Snapshot> {
        self.current = self.evaluate(state)?;
        self.pager.reset();
        log::debug!(
            "filter changed: {} of {} records match",
            self.current.len(),
            self.dataset.len()
        );
        Ok(&self.current)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.current
    }

    pub fn pager(&self) -> &Materializer {
        &self.pager
    }

    /// Materialize one more page of the current subset.
    pub fn load_more(&mut self) -> bool {
        self.pager.load_more(self.current.len())
    }

    /// Rows materialized so far.
    pub fn visible_rows(&self) -> Vec<&Record> {
        self.pager
            .visible(&self.current.rows)
            .iter()
            .filter_map(|&i| self.dataset.records().get(i))
            .collect()
    }

    /// Rows of the current page only.
    pub fn page_rows(&self) -> Vec<&Record> {
        self.pager
            .page(&self.current.rows)
            .iter()
            .filter_map(|&i| self.dataset.records().get(i))
            .collect()
    }

    /// Load the persisted filter state, clamped to this dataset's bounds.
    /// Without a persisted state, the fully inclusive one.
    pub fn restore_filter(&self, store: &StateStore) -> Result<FilterState> {
        match store.get::<FilterState>(FILTER_STATE_KEY)? {
            Some(mut state) => {
                state.clamp_to(self.schema(), &self.bounds);
                log::info!(
                    "restored {} filter constraints from {}",
                    state.constraints().len(),
                    store.path().display()
                );
                Ok(state)
            }
            None => Ok(self.inclusive_filter()),
        }
    }

    /// Persist `state` to `store` and write it out.
    pub fn save_filter(&self, store: &mut StateStore, state: &FilterState) -> Result<()> {
        store.set(FILTER_STATE_KEY, state)?;
        store.save()
    }
}
