//! Command-line argument parsing via clap derive.
//!
//! One invocation: load file -> restore/apply filters -> aggregate -> format output -> exit.

use clap::Parser;
use std::path::PathBuf;

/// Load a CSV or JSON dataset, filter it, and print aggregates.
///
/// Fields are coerced through the schema declared in --config, or inferred
/// from the data when no config is given.
#[derive(Parser, Debug)]
#[command(name = "tabagg", version, about)]
pub struct CliArgs {
    /// Data file (CSV, JSON array, keyed JSON object, or NDJSON).
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Dashboard config (JSON): schema, label tables, aggregates.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Membership filter, repeatable: FIELD=VALUE[,VALUE...].
    #[arg(long = "filter", value_name = "FIELD=VALUES")]
    pub filters: Vec<String>,

    /// Inclusive range filter, repeatable: FIELD=LO..HI (either end may be empty).
    #[arg(long = "range", value_name = "FIELD=LO..HI")]
    pub ranges: Vec<String>,

    /// Case-insensitive text search.
    #[arg(long = "search", value_name = "TEXT")]
    pub search: Option<String>,

    /// Field to search, repeatable (default: all fields).
    #[arg(long = "search-field", value_name = "FIELD")]
    pub search_fields: Vec<String>,

    /// Group by this field (adds a grouped aggregate).
    #[arg(short = 'g', long = "group-by", value_name = "FIELD")]
    pub group_by: Option<String>,

    /// Numeric field to sum per group, or to summarize without --group-by.
    #[arg(short = 's', long = "sum", value_name = "FIELD")]
    pub sum: Option<String>,

    /// Keep the top N groups and collapse the rest into "Others".
    #[arg(long = "top", value_name = "N", requires = "group_by")]
    pub top: Option<usize>,

    /// Print matching rows as well as aggregates.
    #[arg(long = "rows")]
    pub rows: bool,

    /// Number of row pages to materialize.
    #[arg(long = "pages", value_name = "N", default_value_t = 1)]
    pub pages: usize,

    /// Rows per page.
    #[arg(long = "page-size", value_name = "N")]
    pub page_size: Option<usize>,

    /// Output file path (default: stdout).
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format: table, csv, json, jsonl.
    #[arg(long = "format", value_name = "FORMAT", default_value = "table")]
    pub format: OutputFormat,

    /// Filter state file (default: ~/.tabagg/state.json).
    #[arg(long = "state", value_name = "FILE")]
    pub state: Option<PathBuf>,

    /// Start from the persisted filter state instead of the inclusive one.
    #[arg(long = "restore")]
    pub restore: bool,

    /// Persist the final filter state.
    #[arg(long = "save")]
    pub save: bool,
}

/// Output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// Formatted ASCII tables (default).
    Table,
    /// Comma-separated values, one block per table.
    Csv,
    /// JSON array of titled tables.
    Json,
    /// Newline-delimited JSON (one object per row).
    Jsonl,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Csv => write!(f, "csv"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "ndjson" => Ok(OutputFormat::Jsonl),
            _ => Err(format!(
                "unknown format '{}'. Valid: table, csv, json, jsonl",
                s
            )),
        }
    }
}

/// Split `FIELD=V1,V2` into the field and its trimmed, non-empty values.
pub fn parse_filter_arg(arg: &str) -> Result<(String, Vec<String>), String> {
    let (field, values) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUES, got '{}'", arg))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in '{}'", arg));
    }
    let values = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    Ok((field.to_string(), values))
}

/// Split `FIELD=LO..HI` into the field and its optional ends.
pub fn parse_range_arg(arg: &str) -> Result<(String, Option<String>, Option<String>), String> {
    let (field, range) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=LO..HI, got '{}'", arg))?;
    let (lo, hi) = range
        .split_once("..")
        .ok_or_else(|| format!("expected LO..HI in '{}'", arg))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in '{}'", arg));
    }
    let end = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    Ok((field.to_string(), end(lo), end(hi)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("ndjson".parse::<OutputFormat>().unwrap(), OutputFormat::Jsonl);
        assert!("invalid".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Table.to_string(), "table");
        assert_eq!(OutputFormat::Jsonl.to_string(), "jsonl");
    }

    #[test]
    fn test_parse_filter_arg() {
        assert_eq!(
            parse_filter_arg("Municipality= Alpine ,Tenafly,").unwrap(),
            ("Municipality".to_string(), vec!["Alpine".to_string(), "Tenafly".to_string()])
        );
        assert_eq!(parse_filter_arg("brand=").unwrap().1, Vec::<String>::new());
        assert!(parse_filter_arg("brand").is_err());
        assert!(parse_filter_arg("=x").is_err());
    }

    #[test]
    fn test_parse_range_arg() {
        assert_eq!(
            parse_range_arg("price=100..500").unwrap(),
            ("price".to_string(), Some("100".to_string()), Some("500".to_string()))
        );
        assert_eq!(
            parse_range_arg("Sale Date=2020-01-01..").unwrap(),
            ("Sale Date".to_string(), Some("2020-01-01".to_string()), None)
        );
        assert!(parse_range_arg("price=100").is_err());
        assert!(parse_range_arg("price").is_err());
    }

    #[test]
    fn test_cli_parse() {
        let args = CliArgs::try_parse_from([
            "tabagg", "data.csv", "--filter", "brand=PARK", "--range", "rooms=1..9",
            "--group-by", "brand", "--top", "3", "--format", "json", "--rows",
        ])
        .unwrap();
        assert_eq!(args.input, PathBuf::from("data.csv"));
        assert_eq!(args.filters, vec!["brand=PARK"]);
        assert_eq!(args.top, Some(3));
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.pages, 1);
        assert!(args.rows && !args.save);
    }

    #[test]
    fn test_top_requires_group_by() {
        let err = CliArgs::try_parse_from(["tabagg", "f.csv", "--top", "3"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert!(CliArgs::try_parse_from(["tabagg", "f.csv", "-g", "brand", "--top", "3"]).is_ok());
    }
}
