//! CLI module: one-shot execution and output formatting.
//!
//! Handles the full pipeline:
//! parse args -> load config + data -> build filter state -> evaluate ->
//! format output -> exit.

pub mod args;

use std::io::Write;

use serde_json::{json, Map, Value as Json};

use crate::config::{load_config, AggregateDef, DashboardConfig};
use crate::error::{PipelineError, Result};
use crate::pipeline::aggregate::{GroupSort, Metric, MissingKey};
use crate::pipeline::bounds::Interval;
use crate::pipeline::coerce::{parse_date, parse_number};
use crate::pipeline::filter::{EmptySelection, FilterState};
use crate::pipeline::{AggregateValue, Pipeline, Snapshot};
use crate::storage::record::{Record, Value};
use crate::storage::schema::{DataType, Schema};
use crate::storage::state_store::{default_state_path, StateStore};
use args::{parse_filter_arg, parse_range_arg, CliArgs, OutputFormat};

/// A titled block of output.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Json>>,
}

impl ResultTable {
    fn new(title: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            title: title.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

/// Display form of a cell: integral numbers without a fraction, others to
/// two decimals, null as empty.
fn cell_text(v: &Json) -> String {
    match v {
        Json::Null => String::new(),
        Json::String(s) => s.clone(),
        Json::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            Some(f) => format!("{:.2}", f),
            None => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn value_json(v: &Value) -> Json {
    match v {
        Value::Number(n) => json!(n),
        Value::Null => Json::Null,
        other => Json::String(other.to_string()),
    }
}

/// Format tables according to the output format.
pub fn format_tables(tables: &[ResultTable], format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(format_table(tables)),
        OutputFormat::Csv => format_csv(tables),
        OutputFormat::Json => format_json(tables),
        OutputFormat::Jsonl => format_jsonl(tables),
    }
}

/// ASCII tables, each under its title.
fn format_table(tables: &[ResultTable]) -> String {
    let mut blocks = Vec::with_capacity(tables.len());
    for table in tables {
        let mut out = format!("== {} ==\n", table.title);
        if table.columns.is_empty() {
            out.push_str("(empty result)");
            blocks.push(out);
            continue;
        }

        let cells: Vec<Vec<String>> = table
            .rows
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
        for row in &cells {
            for (i, val) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(val.chars().count());
                }
            }
        }

        let header: Vec<String> = table
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:>width$}", c, width = widths[i]))
            .collect();
        out.push_str(&header.join(" | "));
        out.push('\n');

        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&sep.join("-+-"));
        out.push('\n');

        for row in &cells {
            let formatted: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    let w = widths.get(i).copied().unwrap_or(v.len());
                    format!("{:>width$}", v, width = w)
                })
                .collect();
            out.push_str(&formatted.join(" | "));
            out.push('\n');
        }

        out.push_str(&format!(
            "({} row{})",
            table.rows.len(),
            if table.rows.len() == 1 { "" } else { "s" }
        ));
        blocks.push(out);
    }
    blocks.join("\n\n")
}

/// CSV blocks separated by a blank line, each preceded by a `# title` line.
fn format_csv(tables: &[ResultTable]) -> Result<String> {
    let mut out = String::new();
    for (i, table) in tables.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("# {}\n", table.title));
        let mut writer = csv::Writer::from_writer(Vec::new());
        let io_err = |e: csv::Error| PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e));
        writer.write_record(&table.columns).map_err(io_err)?;
        for row in &table.rows {
            writer.write_record(row.iter().map(cell_text)).map_err(io_err)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        out.push_str(&String::from_utf8_lossy(&bytes));
    }
    if out.ends_with('\n') {
        out.pop();
    }
    Ok(out)
}

fn row_object(columns: &[String], row: &[Json]) -> Map<String, Json> {
    columns.iter().cloned().zip(row.iter().cloned()).collect()
}

/// JSON array of `{title, rows: [{column: value}]}`.
fn format_json(tables: &[ResultTable]) -> Result<String> {
    let doc: Vec<Json> = tables
        .iter()
        .map(|t| {
            let rows: Vec<Json> = t.rows.iter().map(|r| Json::Object(row_object(&t.columns, r))).collect();
            json!({ "title": t.title, "rows": rows })
        })
        .collect();
    serde_json::to_string_pretty(&doc).map_err(|e| PipelineError::Io(e.into()))
}

/// One object per row, tagged with its table title.
fn format_jsonl(tables: &[ResultTable]) -> Result<String> {
    let mut lines = Vec::new();
    for t in tables {
        for row in &t.rows {
            let mut obj = Map::new();
            obj.insert("table".to_string(), Json::String(t.title.clone()));
            obj.extend(row_object(&t.columns, row));
            lines.push(serde_json::to_string(&Json::Object(obj)).map_err(|e| PipelineError::Io(e.into()))?);
        }
    }
    Ok(lines.join("\n"))
}

/// Turn a snapshot into output tables: an overview, one table per
/// aggregate, and optionally the materialized rows.
pub fn build_tables(pipeline: &Pipeline, snapshot: &Snapshot, rows: Option<&[&Record]>) -> Vec<ResultTable> {
    let dataset = pipeline.dataset();
    let mut tables = Vec::new();

    let mut overview = ResultTable::new("overview", &["records", "matched", "anomalies"]);
    overview
        .rows
        .push(vec![json!(dataset.len()), json!(snapshot.len()), json!(dataset.anomalies())]);
    tables.push(overview);

    for agg in &snapshot.aggregates.results {
        let table = match &agg.value {
            AggregateValue::Groups { groups } => {
                let mut t = ResultTable::new(&agg.title, &["key", "count", "sum"]);
                t.rows = groups
                    .iter()
                    .map(|g| vec![json!(g.key), json!(g.count), json!(g.sum)])
                    .collect();
                t
            }
            AggregateValue::Histogram { buckets } => {
                let mut t = ResultTable::new(&agg.title, &["bucket", "count", "sum"]);
                t.rows = buckets
                    .iter()
                    .map(|b| vec![json!(b.label), json!(b.count), json!(b.sum)])
                    .collect();
                t
            }
            AggregateValue::Series { series } => {
                let mut t = ResultTable {
                    title: agg.title.clone(),
                    columns: series.columns(),
                    rows: Vec::new(),
                };
                t.rows = series
                    .points
                    .iter()
                    .map(|p| {
                        let mut row = vec![json!(p.period)];
                        row.extend(p.values.iter().map(|v| json!(v)));
                        row.push(json!(p.others));
                        row
                    })
                    .collect();
                t
            }
            AggregateValue::Sums { fields, totals } => {
                let mut t = ResultTable::new(&agg.title, &["field", "total"]);
                t.rows = fields
                    .iter()
                    .zip(totals)
                    .map(|(f, v)| vec![json!(f), json!(v)])
                    .collect();
                t
            }
            AggregateValue::Summary { field, summary } => {
                let mut t = ResultTable::new(
                    &agg.title,
                    &["field", "records", "valid", "total", "mean", "min", "max"],
                );
                t.rows.push(vec![
                    json!(field),
                    json!(summary.records),
                    json!(summary.valid_count),
                    json!(summary.total),
                    json!(summary.mean),
                    json!(summary.min),
                    json!(summary.max),
                ]);
                t
            }
        };
        tables.push(table);
    }

    if let Some(rows) = rows {
        let schema = dataset.schema();
        let columns: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        let mut t = ResultTable::new("rows", &columns);
        t.rows = rows
            .iter()
            .map(|r| r.values().iter().map(value_json).collect())
            .collect();
        tables.push(t);
    }

    tables
}

/// Aggregates requested by flags, appended to the config's own.
fn flag_aggregates(args: &CliArgs) -> Vec<AggregateDef> {
    let mut defs = Vec::new();
    match (&args.group_by, &args.sum) {
        (Some(key), value) => defs.push(AggregateDef::Groups {
            title: match value {
                Some(v) => format!("{} by {}", v, key),
                None => format!("count by {}", key),
            },
            key: key.clone(),
            value: value.clone(),
            missing_key: MissingKey::Label,
            missing_label: None,
            regroup: None,
            regroup_fallback: None,
            sort: if value.is_some() { GroupSort::SumDesc } else { GroupSort::CountDesc },
            exclude_missing: false,
            top: args.top,
            metric: if value.is_some() { Metric::Sum } else { Metric::Count },
        }),
        (None, Some(field)) => defs.push(AggregateDef::Summary {
            title: format!("{} summary", field),
            field: field.clone(),
        }),
        (None, None) => {}
    }
    defs
}

/// Read one end of a range flag on the field's ordinal axis.
fn range_end(schema: &Schema, field_idx: usize, token: &str) -> Result<f64> {
    let field = schema.field_at(field_idx);
    let parsed = match field.data_type {
        DataType::Date => parse_date(token).map(|d| d.and_utc().timestamp_millis() as f64),
        _ => parse_number(token),
    };
    parsed.ok_or_else(|| {
        PipelineError::Config(format!(
            "invalid range value '{}' for {} field '{}'",
            token, field.data_type, field.name
        ))
    })
}

/// Layer the filter flags over `state`.
fn apply_filter_flags(pipeline: &Pipeline, state: &mut FilterState, args: &CliArgs) -> Result<()> {
    let schema = pipeline.schema();
    for arg in &args.filters {
        let (field, values) = parse_filter_arg(arg).map_err(PipelineError::Config)?;
        let idx = schema.require(&field)?;
        state.set_membership(&schema.field_at(idx).name, values, EmptySelection::AllowAll);
    }
    for arg in &args.ranges {
        let (field, lo, hi) = parse_range_arg(arg).map_err(PipelineError::Config)?;
        let idx = schema.require(&field)?;
        let outer = pipeline.bounds().get(idx).unwrap_or(Interval::ZERO);
        let lo = lo.map(|t| range_end(schema, idx, &t)).transpose()?.unwrap_or(outer.min);
        let hi = hi.map(|t| range_end(schema, idx, &t)).transpose()?.unwrap_or(outer.max);
        let applied = state.set_range(schema, pipeline.bounds(), &field, Interval::new(lo, hi))?;
        log::debug!("range on '{}' applied as [{}, {}]", field, applied.min, applied.max);
    }
    if let Some(needle) = &args.search {
        let fields = args
            .search_fields
            .iter()
            .map(|f| schema.require(f).map(|i| schema.field_at(i).name.clone()))
            .collect::<Result<Vec<_>>>()?;
        state.set_search(fields, needle);
    }
    Ok(())
}

/// Everything up to the formatted output string.
pub fn execute(args: &CliArgs) -> Result<String> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => DashboardConfig::default(),
    };
    config.aggregates.extend(flag_aggregates(args));
    if let Some(n) = args.page_size {
        config.page_size = Some(n);
    }

    let mut pipeline = config.build_pipeline(&args.input)?;

    let state_path = args
        .state
        .clone()
        .or_else(|| config.state_path.clone())
        .or_else(default_state_path);
    let mut store = match (&state_path, args.restore || args.save) {
        (Some(path), true) => Some(StateStore::open(path)?),
        (None, true) => {
            return Err(PipelineError::State(
                "no state file given and no home directory to default to".into(),
            ))
        }
        (_, false) => None,
    };

    let mut state = match (&store, args.restore) {
        (Some(store), true) => pipeline.restore_filter(store)?,
        _ => pipeline.inclusive_filter(),
    };
    apply_filter_flags(&pipeline, &mut state, args)?;

    let snapshot = pipeline.on_filter_changed(&state)?.clone();
    for _ in 1..args.pages {
        if !pipeline.load_more() {
            break;
        }
    }

    if args.save {
        if let Some(store) = store.as_mut() {
            pipeline.save_filter(store, &state)?;
            log::info!("saved filter state to {}", store.path().display());
        }
    }

    let visible = args.rows.then(|| pipeline.visible_rows());
    let tables = build_tables(&pipeline, &snapshot, visible.as_deref());
    format_tables(&tables, &args.format)
}

/// Run one invocation. Returns the exit code.
pub fn run(args: &CliArgs) -> i32 {
    let formatted = match execute(args) {
        Ok(s) => s,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    if let Some(ref path) = args.output {
        if let Err(e) = std::fs::write(path, &formatted) {
            eprintln!("Error writing to '{}': {}", path.display(), e);
            return 1;
        }
    } else {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        if let Err(e) = writeln!(handle, "{}", formatted) {
            // Broken pipe is expected when piping to head/etc
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                eprintln!("Write error: {}", e);
                return 1;
            }
        }
    }

    0
}
