//! Aggregates over a filtered subset.
//!
//! Every function here is total: records lacking a field an aggregate needs
//! are skipped, and an empty input yields empty or zero output.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::storage::labels::LabelTable;
use crate::storage::record::Record;
use crate::storage::schema::Schema;

/// Label of the residual bucket in top-N rankings.
pub const OTHERS_LABEL: &str = "Others";

/// One group of a grouped aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: String,
    pub count: usize,
    pub sum: f64,
}

impl Group {
    fn new(key: String) -> Self {
        Self { key, count: 0, sum: 0.0 }
    }

    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Count => self.count as f64,
            Metric::Sum => self.sum,
        }
    }
}

/// Ranking metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Count,
    Sum,
}

/// What happens to records whose group key is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKey {
    /// Group under the missing label.
    #[default]
    Label,
    /// Leave the record out.
    Skip,
}

/// Output order of groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSort {
    /// First-seen first.
    #[default]
    Discovery,
    CountDesc,
    SumDesc,
    KeyAsc,
}

/// A resolved grouping request.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    /// Field whose label is the group key.
    pub key: String,
    /// Numeric field summed per group. Without one, sums stay zero.
    pub value: Option<String>,
    pub missing_key: MissingKey,
    /// Overrides the key field's own missing label.
    pub missing_label: Option<String>,
    /// Maps keys to coarser groups (brand → brand family).
    pub regroup: Option<Arc<LabelTable>>,
    /// Group for keys the regroup table does not list; the key itself when unset.
    pub regroup_fallback: Option<String>,
    pub sort: GroupSort,
    /// Drop records whose key is absent instead of grouping them.
    pub exclude_missing: bool,
}

impl GroupSpec {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            missing_key: MissingKey::Label,
            missing_label: None,
            regroup: None,
            regroup_fallback: None,
            sort: GroupSort::Discovery,
            exclude_missing: false,
        }
    }

    pub fn summing(mut self, field: impl Into<String>) -> Self {
        self.value = Some(field.into());
        self
    }

    pub fn sorted(mut self, sort: GroupSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn regrouped(mut self, table: Arc<LabelTable>, fallback: Option<String>) -> Self {
        self.regroup = Some(table);
        self.regroup_fallback = fallback;
        self
    }
}

/// Group `records` by the key field, counting and summing.
///
/// # Errors
/// Only for a spec naming unknown fields or a non-numeric value field.
pub fn group_by(records: &[&Record], schema: &Schema, spec: &GroupSpec) -> Result<Vec<Group>> {
    let key_idx = schema.require(&spec.key)?;
    let value_idx = spec.value.as_deref().map(|v| schema.require_numeric(v)).transpose()?;
    let missing_label = spec
        .missing_label
        .clone()
        .unwrap_or_else(|| schema.field_at(key_idx).missing_label().to_string());

    let mut groups: Vec<Group> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for record in records {
        let amount = match value_idx {
            Some(idx) => match record.get(idx).as_f64() {
                Some(v) => v,
                None => continue,
            },
            None => 0.0,
        };
        let key = match record.label(key_idx) {
            Some(code) => match &spec.regroup {
                Some(table) => match (table.lookup(&code), &spec.regroup_fallback) {
                    (Some(group), _) => group.to_string(),
                    (None, Some(fallback)) => fallback.clone(),
                    (None, None) => code,
                },
                None => code,
            },
            None if spec.exclude_missing => continue,
            None => match spec.missing_key {
                MissingKey::Label => missing_label.clone(),
                MissingKey::Skip => continue,
            },
        };
        let slot = *slots.entry(key).or_insert_with_key(|k| {
            groups.push(Group::new(k.clone()));
            groups.len() - 1
        });
        groups[slot].count += 1;
        groups[slot].sum += amount;
    }

    // Stable sorts keep discovery order among ties.
    match spec.sort {
        GroupSort::Discovery => {}
        GroupSort::CountDesc => groups.sort_by(|a, b| b.count.cmp(&a.count)),
        GroupSort::SumDesc => groups.sort_by(|a, b| b.sum.total_cmp(&a.sum)),
        GroupSort::KeyAsc => groups.sort_by(|a, b| a.key.cmp(&b.key)),
    }
    Ok(groups)
}

/// Keep the `n` largest groups by `metric` and collapse the rest into one
/// [`OTHERS_LABEL`] group holding the tail's exact count and sum.
///
/// Ties keep their input order. No `Others` group is added when nothing is cut.
pub fn top_n_with_others(groups: &[Group], n: usize, metric: Metric) -> Vec<Group> {
    let mut ranked: Vec<Group> = groups.to_vec();
    ranked.sort_by(|a, b| b.metric(metric).total_cmp(&a.metric(metric)));
    if ranked.len() <= n {
        return ranked;
    }
    let tail = ranked.split_off(n);
    let mut others = Group::new(OTHERS_LABEL.to_string());
    for g in &tail {
        others.count += g.count;
        others.sum += g.sum;
    }
    ranked.push(others);
    ranked
}

/// One histogram bucket definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub label: String,
    /// Exclusive upper bound; `None` on the final, unbounded bucket.
    #[serde(default)]
    pub upper: Option<f64>,
}

impl Bucket {
    pub fn below(label: impl Into<String>, upper: f64) -> Self {
        Self {
            label: label.into(),
            upper: Some(upper),
        }
    }

    pub fn rest(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            upper: None,
        }
    }
}

/// Histogram output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketCount {
    pub label: String,
    pub count: usize,
    pub sum: f64,
}

/// A fixed-boundary histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    buckets: Vec<Bucket>,
}

impl Histogram {
    /// Validate bucket definitions: at least one bucket, strictly ascending
    /// upper bounds, and only the last bucket unbounded. A bounded last
    /// bucket still receives every value at or above its bound.
    pub fn new(buckets: Vec<Bucket>) -> Result<Self> {
        if buckets.is_empty() {
            return Err(PipelineError::Config("histogram needs at least one bucket".into()));
        }
        let mut prev: Option<f64> = None;
        for (i, b) in buckets.iter().enumerate() {
            match b.upper {
                None if i + 1 != buckets.len() => {
                    return Err(PipelineError::Config(format!(
                        "histogram bucket '{}' is unbounded but not last",
                        b.label
                    )))
                }
                Some(u) if u.is_nan() || prev.is_some_and(|p| u <= p) => {
                    return Err(PipelineError::Config(format!(
                        "histogram bucket '{}' bound is not above the previous one",
                        b.label
                    )))
                }
                Some(u) => prev = Some(u),
                None => {}
            }
        }
        Ok(Self { buckets })
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Index of the bucket `value` falls into: the first whose upper bound
    /// exceeds it, else the last.
    pub fn assign(&self, value: f64) -> usize {
        self.buckets
            .iter()
            .position(|b| b.upper.is_some_and(|u| value < u))
            .unwrap_or(self.buckets.len() - 1)
    }

    /// Count and sum `field_idx` per bucket. Every bucket is reported.
    pub fn compute(&self, records: &[&Record], field_idx: usize) -> Vec<BucketCount> {
        let mut out: Vec<BucketCount> = self
            .buckets
            .iter()
            .map(|b| BucketCount {
                label: b.label.clone(),
                count: 0,
                sum: 0.0,
            })
            .collect();
        for v in records.iter().filter_map(|r| r.get(field_idx).as_f64()) {
            let slot = &mut out[self.assign(v)];
            slot.count += 1;
            slot.sum += v;
        }
        out
    }
}

/// Totals of several numeric fields, in the order given. Nulls are skipped.
pub fn sums(records: &[&Record], field_idxs: &[usize]) -> Vec<f64> {
    field_idxs
        .iter()
        .map(|&idx| records.iter().filter_map(|r| r.get(idx).as_f64()).sum())
        .collect()
}

/// Summary statistics of one numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Summary {
    /// Records considered, valid or not.
    pub records: usize,
    /// Records with a defined, non-zero value.
    pub valid_count: usize,
    pub total: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Summarize `field_idx`. Zero values count as absent, so under the zero
/// missing policy unparsable cells do not drag the minimum or mean down.
pub fn summary(records: &[&Record], field_idx: usize) -> Summary {
    let mut s = Summary {
        records: records.len(),
        ..Summary::default()
    };
    for v in records.iter().filter_map(|r| r.get(field_idx).as_f64()) {
        if v == 0.0 {
            continue;
        }
        if s.valid_count == 0 {
            s.min = v;
            s.max = v;
        } else {
            s.min = s.min.min(v);
            s.max = s.max.max(v);
        }
        s.valid_count += 1;
        s.total += v;
    }
    if s.valid_count > 0 {
        s.mean = s.total / s.valid_count as f64;
    }
    s
}

/// Shorten a label for display: longer than `max` chars → first `max - 3`
/// chars plus `...`.
pub fn shorten_label(label: &str, max: usize) -> String {
    if label.chars().count() <= max {
        return label.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = label.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::labels::LabelRegistry;
    use crate::storage::record::Value;
    use crate::storage::schema::{DataType, FieldDef};

    fn schema() -> Schema {
        Schema::new(vec![
            FieldDef::new("category", DataType::Category),
            FieldDef::new("value", DataType::Number),
        ])
        .unwrap()
    }

    fn rec(i: usize, cat: Option<&str>, v: Option<f64>) -> Record {
        Record::new(
            i,
            None,
            vec![
                cat.map_or(Value::Null, |c| Value::Text(c.into())),
                v.map_or(Value::Null, Value::Number),
            ],
        )
    }

    fn groups(values: &[f64]) -> Vec<Group> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Group {
                key: format!("g{}", i),
                count: 1,
                sum: *v,
            })
            .collect()
    }

    #[test]
    fn test_group_by_with_unknown_sentinel() {
        let records = vec![
            rec(0, Some("A"), Some(10.0)),
            rec(1, Some("A"), Some(20.0)),
            rec(2, Some("B"), Some(5.0)),
            rec(3, None, Some(7.0)),
        ];
        let refs: Vec<&Record> = records.iter().collect();
        let out = group_by(&refs, &schema(), &GroupSpec::new("category").summing("value")).unwrap();
        assert_eq!(
            out,
            vec![
                Group { key: "A".into(), count: 2, sum: 30.0 },
                Group { key: "B".into(), count: 1, sum: 5.0 },
                Group { key: "Unknown".into(), count: 1, sum: 7.0 },
            ]
        );
    }

    #[test]
    fn test_group_by_skip_and_exclude_missing() {
        let records = vec![rec(0, None, Some(1.0)), rec(1, Some("A"), Some(2.0))];
        let refs: Vec<&Record> = records.iter().collect();
        let mut spec = GroupSpec::new("category").summing("value");
        spec.missing_key = MissingKey::Skip;
        assert_eq!(group_by(&refs, &schema(), &spec).unwrap().len(), 1);

        let mut spec = GroupSpec::new("category");
        spec.missing_label = Some("No Category".into());
        spec.exclude_missing = true;
        let out = group_by(&refs, &schema(), &spec).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key, "A");
    }

    #[test]
    fn test_exclude_missing_keeps_value_spelled_like_label() {
        let records = vec![
            rec(0, Some("Unknown"), Some(4.0)),
            rec(1, None, Some(1.0)),
            rec(2, Some("A"), Some(2.0)),
        ];
        let refs: Vec<&Record> = records.iter().collect();
        let mut spec = GroupSpec::new("category").summing("value");
        spec.exclude_missing = true;
        let out = group_by(&refs, &schema(), &spec).unwrap();
        assert_eq!(
            out,
            vec![
                Group { key: "Unknown".into(), count: 1, sum: 4.0 },
                Group { key: "A".into(), count: 1, sum: 2.0 },
            ]
        );
    }

    #[test]
    fn test_group_by_null_value_excluded() {
        let records = vec![rec(0, Some("A"), None), rec(1, Some("A"), Some(3.0))];
        let refs: Vec<&Record> = records.iter().collect();
        let out = group_by(&refs, &schema(), &GroupSpec::new("category").summing("value")).unwrap();
        assert_eq!(out, vec![Group { key: "A".into(), count: 1, sum: 3.0 }]);
        // Counting only: every record counts.
        let out = group_by(&refs, &schema(), &GroupSpec::new("category")).unwrap();
        assert_eq!(out[0].count, 2);
    }

    #[test]
    fn test_group_sort_orders_are_stable() {
        let records = vec![
            rec(0, Some("b"), Some(1.0)),
            rec(1, Some("a"), Some(1.0)),
            rec(2, Some("c"), Some(5.0)),
            rec(3, Some("c"), Some(5.0)),
        ];
        let refs: Vec<&Record> = records.iter().collect();
        let keys = |sort| -> Vec<String> {
            group_by(&refs, &schema(), &GroupSpec::new("category").summing("value").sorted(sort))
                .unwrap()
                .into_iter()
                .map(|g| g.key)
                .collect()
        };
        assert_eq!(keys(GroupSort::Discovery), vec!["b", "a", "c"]);
        assert_eq!(keys(GroupSort::CountDesc), vec!["c", "b", "a"]);
        assert_eq!(keys(GroupSort::SumDesc), vec!["c", "b", "a"]);
        assert_eq!(keys(GroupSort::KeyAsc), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_group_by_regroup_table() {
        let table = LabelRegistry::builtin().get("hyatt_brand_groups").unwrap();
        let records = vec![
            rec(0, Some("PARK"), Some(1.0)),
            rec(1, Some("ANDAZ"), Some(1.0)),
            rec(2, Some("ALILA"), Some(1.0)),
            rec(3, Some("MYSTERY"), Some(1.0)),
        ];
        let refs: Vec<&Record> = records.iter().collect();
        let spec = GroupSpec::new("category").regrouped(table, Some("Others".into()));
        let out = group_by(&refs, &schema(), &spec).unwrap();
        let pairs: Vec<(&str, usize)> = out.iter().map(|g| (g.key.as_str(), g.count)).collect();
        assert_eq!(pairs, vec![("Luxury", 2), ("Lifestyle", 1), ("Others", 1)]);
    }

    #[test]
    fn test_group_by_errors_on_bad_spec() {
        let refs: Vec<&Record> = Vec::new();
        assert!(group_by(&refs, &schema(), &GroupSpec::new("nope")).is_err());
        assert!(group_by(&refs, &schema(), &GroupSpec::new("value").summing("category")).is_err());
        assert!(group_by(&refs, &schema(), &GroupSpec::new("category")).unwrap().is_empty());
    }

    #[test]
    fn test_top_n_collapses_tail() {
        let out = top_n_with_others(&groups(&[50.0, 30.0, 20.0, 10.0, 5.0, 5.0]), 3, Metric::Sum);
        let sums: Vec<f64> = out.iter().map(|g| g.sum).collect();
        assert_eq!(sums, vec![50.0, 30.0, 20.0, 20.0]);
        assert_eq!(out[3].key, OTHERS_LABEL);
        assert_eq!(out[3].count, 3);
    }

    #[test]
    fn test_top_n_without_tail_has_no_others() {
        let out = top_n_with_others(&groups(&[1.0, 3.0]), 5, Metric::Sum);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].sum, 3.0);
        assert!(top_n_with_others(&[], 3, Metric::Count).is_empty());
    }

    #[test]
    fn test_top_n_ties_keep_input_order() {
        let out = top_n_with_others(&groups(&[5.0, 5.0, 5.0]), 2, Metric::Sum);
        assert_eq!(out[0].key, "g0");
        assert_eq!(out[1].key, "g1");
        assert_eq!(out[2].sum, 5.0);
    }

    fn contribution_ranges() -> Histogram {
        Histogram::new(vec![
            Bucket::below("Under $100", 100.0),
            Bucket::below("$100 - $499", 500.0),
            Bucket::below("$500 - $999", 1000.0),
            Bucket::below("$1000 - $2799", 2800.0),
            Bucket::rest("$2800+"),
        ])
        .unwrap()
    }

    #[test]
    fn test_histogram_boundaries_go_up() {
        let h = contribution_ranges();
        assert_eq!(h.assign(99.99), 0);
        assert_eq!(h.assign(100.0), 1);
        assert_eq!(h.assign(499.0), 1);
        assert_eq!(h.assign(500.0), 2);
        assert_eq!(h.assign(2799.99), 3);
        assert_eq!(h.assign(2800.0), 4);
        assert_eq!(h.assign(1e12), 4);
        assert_eq!(h.assign(-5.0), 0);
    }

    #[test]
    fn test_histogram_compute_reports_all_buckets() {
        let records = vec![rec(0, None, Some(50.0)), rec(1, None, Some(100.0)), rec(2, None, None)];
        let refs: Vec<&Record> = records.iter().collect();
        let out = contribution_ranges().compute(&refs, 1);
        assert_eq!(out.len(), 5);
        assert_eq!((out[0].count, out[0].sum), (1, 50.0));
        assert_eq!((out[1].count, out[1].sum), (1, 100.0));
        assert_eq!(out[4].count, 0);
    }

    #[test]
    fn test_histogram_validation() {
        assert!(Histogram::new(vec![]).is_err());
        assert!(Histogram::new(vec![Bucket::rest("all"), Bucket::below("x", 1.0)]).is_err());
        assert!(Histogram::new(vec![Bucket::below("a", 10.0), Bucket::below("b", 10.0)]).is_err());
        let h = Histogram::new(vec![Bucket::below("a", 10.0), Bucket::below("b", 20.0)]).unwrap();
        assert_eq!(h.assign(25.0), 1);
    }

    #[test]
    fn test_sums_and_summary() {
        let records = vec![
            rec(0, None, Some(10.0)),
            rec(1, None, Some(0.0)),
            rec(2, None, Some(30.0)),
            rec(3, None, None),
        ];
        let refs: Vec<&Record> = records.iter().collect();
        assert_eq!(sums(&refs, &[1]), vec![40.0]);
        let s = summary(&refs, 1);
        assert_eq!(s.records, 4);
        assert_eq!(s.valid_count, 2);
        assert_eq!(s.total, 40.0);
        assert_eq!(s.mean, 20.0);
        assert_eq!((s.min, s.max), (10.0, 30.0));
    }

    #[test]
    fn test_summary_of_nothing_is_zero() {
        let s = summary(&[], 1);
        assert_eq!(s, Summary::default());
    }

    #[test]
    fn test_shorten_label() {
        assert_eq!(shorten_label("SHORT NAME", 15), "SHORT NAME");
        assert_eq!(shorten_label("ACTBLUE NATIONAL FUND", 15), "ACTBLUE NATI...");
    }
}
