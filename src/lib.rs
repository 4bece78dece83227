//! tabagg: tabular aggregation pipeline.
//!
//! Load one static dataset (CSV, JSON array, keyed JSON object, or NDJSON),
//! coerce it through a declared schema, filter it by membership, range, and
//! text search, and recompute grouped totals, top-N rankings, histograms,
//! and time series on every filter change.

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod storage;
