//! Declarative record filtering.
//!
//! A [`FilterState`] is an ordered list of constraints combined with AND.
//! Constraints name fields; [`FilterState::compile`] resolves the names once
//! against a schema so per-record checks are index lookups.
//!
//! Membership: the record's label must be in the allowed set. An absent value
//! is checked under the field's missing label. What an empty allowed set means
//! is declared per constraint ([`EmptySelection`]).
//!
//! Range: inclusive on both ends, on the field's ordinal axis (dates as epoch
//! milliseconds). Absent values pass unless the constraint says otherwise
//! ([`NullPolicy`]).
//!
//! Search: case-insensitive substring over one or more fields.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::bounds::{Bounds, Interval};
use crate::error::{PipelineError, Result};
use crate::storage::record::{Dataset, Record};
use crate::storage::schema::Schema;

/// Meaning of an empty membership set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptySelection {
    /// Nothing selected = no filtering on the field.
    #[default]
    AllowAll,
    /// Nothing selected = nothing matches.
    AllowNone,
}

/// Treatment of absent values under a range constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    #[default]
    Pass,
    Reject,
}

/// One filter constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    Membership {
        field: String,
        allowed: BTreeSet<String>,
        #[serde(default)]
        empty: EmptySelection,
    },
    Range {
        field: String,
        min: f64,
        max: f64,
        #[serde(default)]
        nulls: NullPolicy,
    },
    Search {
        /// Fields searched; empty = every field.
        #[serde(default)]
        fields: Vec<String>,
        needle: String,
    },
}

impl Constraint {
    /// The field a membership or range constraint applies to.
    pub fn field(&self) -> Option<&str> {
        match self {
            Constraint::Membership { field, .. } | Constraint::Range { field, .. } => Some(field),
            Constraint::Search { .. } => None,
        }
    }
}

/// The active set of constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(default)]
    constraints: Vec<Constraint>,
}

impl FilterState {
    /// A state with no constraints.
    pub fn new() -> Self {
        Self::default()
    }

    /// The fully inclusive state: one range per ordinal field, spanning its bounds.
    pub fn inclusive(schema: &Schema, bounds: &Bounds) -> Self {
        let constraints = bounds
            .iter()
            .map(|(idx, b)| Constraint::Range {
                field: schema.field_at(idx).name.clone(),
                min: b.min,
                max: b.max,
                nulls: NullPolicy::Pass,
            })
            .collect();
        Self { constraints }
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Allowed set of the membership constraint on `field`, if any.
    pub fn membership(&self, field: &str) -> Option<&BTreeSet<String>> {
        self.constraints.iter().find_map(|c| match c {
            Constraint::Membership { field: f, allowed, .. } if same_field(f, field) => Some(allowed),
            _ => None,
        })
    }

    /// Interval of the range constraint on `field`, if any.
    pub fn range(&self, field: &str) -> Option<Interval> {
        self.constraints.iter().find_map(|c| match c {
            Constraint::Range { field: f, min, max, .. } if same_field(f, field) => Some(Interval::new(*min, *max)),
            _ => None,
        })
    }

    fn membership_mut(&mut self, field: &str) -> &mut BTreeSet<String> {
        let pos = self.constraints.iter().position(
            |c| matches!(c, Constraint::Membership { field: f, .. } if same_field(f, field)),
        );
        let pos = match pos {
            Some(pos) => pos,
            None => {
                self.constraints.push(Constraint::Membership {
                    field: field.to_string(),
                    allowed: BTreeSet::new(),
                    empty: EmptySelection::AllowAll,
                });
                self.constraints.len() - 1
            }
        };
        match &mut self.constraints[pos] {
            Constraint::Membership { allowed, .. } => allowed,
            _ => unreachable!(),
        }
    }

    /// Replace the membership constraint on `field`.
    pub fn set_membership<I, S>(&mut self, field: &str, values: I, empty: EmptySelection)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        self.constraints
            .retain(|c| !matches!(c, Constraint::Membership { field: f, .. } if same_field(f, field)));
        self.constraints.push(Constraint::Membership {
            field: field.to_string(),
            allowed,
            empty,
        });
    }

    /// Add `value` to the allowed set of `field`, or remove it if present.
    /// Returns whether the value is now selected.
    pub fn toggle(&mut self, field: &str, value: &str) -> bool {
        let allowed = self.membership_mut(field);
        if allowed.remove(value) {
            false
        } else {
            allowed.insert(value.to_string());
            true
        }
    }

    /// Select every value in `values` for `field`.
    pub fn select_all<I, S>(&mut self, field: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed = self.membership_mut(field);
        allowed.extend(values.into_iter().map(Into::into));
    }

    /// Empty the allowed set of `field`, keeping its empty-selection policy.
    pub fn clear_selection(&mut self, field: &str) {
        self.membership_mut(field).clear();
    }

    /// Set the range on `field`, clamped to the field's bounds. Returns the
    /// interval actually applied.
    ///
    /// # Errors
    /// [`PipelineError::UnknownField`] if the field does not exist, or
    /// [`PipelineError::Config`] if it is not ordinal.
    pub fn set_range(
        &mut self,
        schema: &Schema,
        bounds: &Bounds,
        field: &str,
        wanted: Interval,
    ) -> Result<Interval> {
        let idx = schema.require(field)?;
        let outer = bounds.get(idx).ok_or_else(|| {
            PipelineError::Config(format!("field '{}' has no range (type {})", field, schema.field_at(idx).data_type))
        })?;
        let applied = wanted.clamp_to(&outer);
        let name = schema.field_at(idx).name.clone();
        for c in &mut self.constraints {
            if let Constraint::Range { field: f, min, max, .. } = c {
                if same_field(f, &name) {
                    *min = applied.min;
                    *max = applied.max;
                    return Ok(applied);
                }
            }
        }
        self.constraints.push(Constraint::Range {
            field: name,
            min: applied.min,
            max: applied.max,
            nulls: NullPolicy::Pass,
        });
        Ok(applied)
    }

    /// Change how the range on `field` treats absent values. No-op without a range.
    pub fn set_null_policy(&mut self, field: &str, policy: NullPolicy) {
        for c in &mut self.constraints {
            if let Constraint::Range { field: f, nulls, .. } = c {
                if same_field(f, field) {
                    *nulls = policy;
                }
            }
        }
    }

    /// Replace the text search. An empty needle removes it.
    pub fn set_search(&mut self, fields: Vec<String>, needle: &str) {
        self.constraints.retain(|c| !matches!(c, Constraint::Search { .. }));
        let needle = needle.trim();
        if !needle.is_empty() {
            self.constraints.push(Constraint::Search {
                fields,
                needle: needle.to_string(),
            });
        }
    }

    /// Back to the fully inclusive state.
    pub fn reset(&mut self, schema: &Schema, bounds: &Bounds) {
        *self = Self::inclusive(schema, bounds);
    }

    /// Bring the state in line with a dataset: clamp every range into the
    /// field's bounds and drop constraints on unknown or non-ordinal fields.
    /// Returns the number of constraints dropped.
    pub fn clamp_to(&mut self, schema: &Schema, bounds: &Bounds) -> usize {
        let before = self.constraints.len();
        self.constraints.retain_mut(|c| match c {
            Constraint::Membership { field, .. } => schema.field_index(field).is_some(),
            Constraint::Range { field, min, max, .. } => {
                match schema.field_index(field).and_then(|idx| bounds.get(idx)) {
                    Some(outer) => {
                        let clamped = Interval::new(*min, *max).clamp_to(&outer);
                        *min = clamped.min;
                        *max = clamped.max;
                        true
                    }
                    None => false,
                }
            }
            Constraint::Search { fields, .. } => {
                fields.retain(|f| schema.field_index(f).is_some());
                true
            }
        });
        let dropped = before - self.constraints.len();
        if dropped > 0 {
            log::warn!("dropped {} filter constraints naming unknown fields", dropped);
        }
        dropped
    }

    /// Resolve field names against `schema`.
    ///
    /// # Errors
    /// [`PipelineError::UnknownField`] for any field the schema lacks.
    pub fn compile<'a>(&'a self, schema: &'a Schema) -> Result<CompiledFilter<'a>> {
        let mut checks = Vec::with_capacity(self.constraints.len());
        for c in &self.constraints {
            match c {
                Constraint::Membership { field, allowed, empty } => {
                    let idx = schema.require(field)?;
                    match (allowed.is_empty(), empty) {
                        (true, EmptySelection::AllowAll) => {}
                        (true, EmptySelection::AllowNone) => checks.push(Check::Never),
                        (false, _) => checks.push(Check::Member {
                            idx,
                            allowed,
                            missing: schema.field_at(idx).missing_label(),
                        }),
                    }
                }
                Constraint::Range { field, min, max, nulls } => {
                    let idx = schema.require(field)?;
                    checks.push(Check::Range {
                        idx,
                        interval: Interval::new(*min, *max),
                        nulls: *nulls,
                    });
                }
                Constraint::Search { fields, needle } => {
                    let idxs = if fields.is_empty() {
                        (0..schema.num_fields()).collect()
                    } else {
                        fields.iter().map(|f| schema.require(f)).collect::<Result<Vec<_>>>()?
                    };
                    checks.push(Check::Search {
                        idxs,
                        needle: needle.to_lowercase(),
                    });
                }
            }
        }
        Ok(CompiledFilter { checks })
    }
}

/// Field names match the way schema lookups fall back: ignoring ASCII case.
fn same_field(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

enum Check<'a> {
    Never,
    Member {
        idx: usize,
        allowed: &'a BTreeSet<String>,
        missing: &'a str,
    },
    Range {
        idx: usize,
        interval: Interval,
        nulls: NullPolicy,
    },
    Search {
        idxs: Vec<usize>,
        needle: String,
    },
}

impl Check<'_> {
    fn passes(&self, record: &Record) -> bool {
        match self {
            Check::Never => false,
            Check::Member { idx, allowed, missing } => match record.label(*idx) {
                Some(label) => allowed.contains(&label),
                None => allowed.contains(*missing),
            },
            Check::Range { idx, interval, nulls } => match record.get(*idx).ordinal() {
                Some(v) => interval.contains(v),
                None => *nulls == NullPolicy::Pass,
            },
            Check::Search { idxs, needle } => idxs.iter().any(|&i| {
                record
                    .label(i)
                    .is_some_and(|text| text.to_lowercase().contains(needle.as_str()))
            }),
        }
    }
}

/// A [`FilterState`] resolved against a schema.
pub struct CompiledFilter<'a> {
    checks: Vec<Check<'a>>,
}

impl CompiledFilter<'_> {
    /// AND across all constraints.
    pub fn matches(&self, record: &Record) -> bool {
        self.checks.iter().all(|c| c.passes(record))
    }
}

/// Whether `record` satisfies every constraint of `state`.
pub fn matches(record: &Record, schema: &Schema, state: &FilterState) -> Result<bool> {
    Ok(state.compile(schema)?.matches(record))
}

/// The records of `dataset` that match `state`, in source order.
pub fn apply<'a>(dataset: &'a Dataset, state: &FilterState) -> Result<Vec<&'a Record>> {
    let filter = state.compile(dataset.schema())?;
    Ok(dataset.records().iter().filter(|r| filter.matches(r)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_raw;
    use crate::pipeline::coerce::normalize;
    use crate::storage::schema::{DataType, FieldDef, MissingPolicy};
    use std::sync::Arc;

    fn dataset() -> Dataset {
        let raw = parse_raw(
            "name,category,amount,when\n\
             Acme Pantry,A,10,2024-01-05\n\
             Bright Futures,A,20,2024-02-10\n\
             Civic Arts,B,5,\n\
             Delta Fund,,,2024-03-15\n",
        )
        .unwrap();
        let schema = Schema::new(vec![
            FieldDef::new("name", DataType::Text),
            FieldDef::new("category", DataType::Category),
            FieldDef::new("amount", DataType::Number).with_missing(MissingPolicy::Null),
            FieldDef::new("when", DataType::Date),
        ])
        .unwrap();
        normalize(&raw, Arc::new(schema))
    }

    fn names(records: &[&Record]) -> Vec<usize> {
        records.iter().map(|r| r.index).collect()
    }

    #[test]
    fn test_inclusive_state_matches_everything() {
        let ds = dataset();
        let bounds = Bounds::derive(&ds);
        let state = FilterState::inclusive(ds.schema(), &bounds);
        assert_eq!(state.constraints().len(), 2);
        assert_eq!(apply(&ds, &state).unwrap().len(), 4);
    }

    #[test]
    fn test_membership_and_missing_label() {
        let ds = dataset();
        let mut state = FilterState::new();
        state.set_membership("category", ["A"], EmptySelection::AllowAll);
        assert_eq!(names(&apply(&ds, &state).unwrap()), vec![0, 1]);
        state.toggle("category", "Unknown");
        assert_eq!(names(&apply(&ds, &state).unwrap()), vec![0, 1, 3]);
    }

    #[test]
    fn test_empty_selection_policies() {
        let ds = dataset();
        let mut state = FilterState::new();
        state.set_membership("category", Vec::<String>::new(), EmptySelection::AllowAll);
        assert_eq!(apply(&ds, &state).unwrap().len(), 4);
        state.set_membership("category", Vec::<String>::new(), EmptySelection::AllowNone);
        assert!(apply(&ds, &state).unwrap().is_empty());
    }

    #[test]
    fn test_field_names_match_case_insensitively() {
        let ds = dataset();
        let mut state = FilterState::new();
        state.set_membership("Category", ["A"], EmptySelection::AllowAll);
        state.set_membership("category", ["B"], EmptySelection::AllowAll);
        assert_eq!(state.constraints().len(), 1);
        assert_eq!(state.membership("CATEGORY").unwrap().len(), 1);
        assert_eq!(names(&apply(&ds, &state).unwrap()), vec![2]);

        state.toggle("CATEGORY", "A");
        assert_eq!(state.constraints().len(), 1);
        assert_eq!(names(&apply(&ds, &state).unwrap()), vec![0, 1, 2]);
    }

    #[test]
    fn test_toggle_select_all_clear() {
        let mut state = FilterState::new();
        assert!(state.toggle("brand", "PARK"));
        assert!(!state.toggle("brand", "PARK"));
        state.select_all("brand", ["PARK", "ANDAZ"]);
        assert_eq!(state.membership("brand").unwrap().len(), 2);
        state.clear_selection("brand");
        assert!(state.membership("brand").unwrap().is_empty());
        assert_eq!(state.constraints().len(), 1);
    }

    #[test]
    fn test_range_inclusive_and_null_pass_through() {
        let ds = dataset();
        let bounds = Bounds::derive(&ds);
        let mut state = FilterState::new();
        let applied = state
            .set_range(ds.schema(), &bounds, "amount", Interval::new(10.0, 20.0))
            .unwrap();
        assert_eq!(applied, Interval::new(10.0, 20.0));
        // Record 3 has no amount and passes.
        assert_eq!(names(&apply(&ds, &state).unwrap()), vec![0, 1, 3]);

        state.set_null_policy("amount", NullPolicy::Reject);
        assert_eq!(names(&apply(&ds, &state).unwrap()), vec![0, 1]);
    }

    #[test]
    fn test_set_range_clamps_to_bounds() {
        let ds = dataset();
        let bounds = Bounds::derive(&ds);
        let mut state = FilterState::new();
        let applied = state
            .set_range(ds.schema(), &bounds, "amount", Interval::new(-100.0, 1e9))
            .unwrap();
        assert_eq!(applied, Interval::new(5.0, 20.0));
        assert_eq!(state.range("amount"), Some(applied));
        assert!(state.set_range(ds.schema(), &bounds, "name", applied).is_err());
        assert!(matches!(
            state.set_range(ds.schema(), &bounds, "nope", applied),
            Err(PipelineError::UnknownField(_))
        ));
    }

    #[test]
    fn test_search_case_insensitive() {
        let ds = dataset();
        let mut state = FilterState::new();
        state.set_search(vec!["name".into()], "FUND");
        assert_eq!(names(&apply(&ds, &state).unwrap()), vec![3]);
        state.set_search(vec![], "b");
        // "Bright Futures" by name, "B" by category.
        assert_eq!(names(&apply(&ds, &state).unwrap()), vec![1, 2]);
        state.set_search(vec![], "   ");
        assert!(state.is_empty());
    }

    #[test]
    fn test_clamp_to_drops_unknown_fields() {
        let ds = dataset();
        let bounds = Bounds::derive(&ds);
        let json = r#"{"constraints": [
            {"kind": "range", "field": "amount", "min": -5, "max": 500},
            {"kind": "range", "field": "gone", "min": 0, "max": 1},
            {"kind": "membership", "field": "vanished", "allowed": ["x"]},
            {"kind": "membership", "field": "category", "allowed": ["B"]}
        ]}"#;
        let mut state: FilterState = serde_json::from_str(json).unwrap();
        assert_eq!(state.clamp_to(ds.schema(), &bounds), 2);
        assert_eq!(state.range("amount"), Some(Interval::new(5.0, 20.0)));
        assert_eq!(names(&apply(&ds, &state).unwrap()), vec![2]);
    }

    #[test]
    fn test_compile_unknown_field_errors() {
        let ds = dataset();
        let mut state = FilterState::new();
        state.toggle("nope", "x");
        assert!(matches!(apply(&ds, &state), Err(PipelineError::UnknownField(_))));
        assert!(matches(&ds.records()[0], ds.schema(), &state).is_err());
    }

    #[test]
    fn test_reset_and_serde_round_trip() {
        let ds = dataset();
        let bounds = Bounds::derive(&ds);
        let mut state = FilterState::new();
        state.toggle("category", "A");
        state.reset(ds.schema(), &bounds);
        assert_eq!(state, FilterState::inclusive(ds.schema(), &bounds));

        let json = serde_json::to_string(&state).unwrap();
        let back: FilterState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
