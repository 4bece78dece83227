//! Per-field `[min, max]` bounds over the full dataset.
//!
//! Computed once per load. Seeds the fully inclusive filter state and limits
//! every range constraint.

use serde::{Deserialize, Serialize};

use crate::storage::record::Dataset;

/// A closed interval on a field's ordinal axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub const ZERO: Interval = Interval { min: 0.0, max: 0.0 };

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }

    /// Intersect with `outer`. An interval lying entirely outside collapses
    /// onto the nearest edge of `outer`; an inverted interval is reordered.
    pub fn clamp_to(&self, outer: &Interval) -> Interval {
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        let lo = lo.max(outer.min).min(outer.max);
        let hi = hi.min(outer.max).max(outer.min);
        Interval::new(lo, hi.max(lo))
    }
}

/// Observed bounds for every ordinal field of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    /// One entry per schema field; `None` for non-ordinal fields.
    per_field: Vec<Option<Interval>>,
}

impl Bounds {
    /// Scan the dataset once.
    ///
    /// Records with a null or NaN value are skipped. A field with no defined
    /// value gets `[0, 0]`.
    pub fn derive(dataset: &Dataset) -> Self {
        let schema = dataset.schema();
        let mut per_field: Vec<Option<Interval>> = vec![None; schema.num_fields()];

        for idx in schema.ordinal_fields() {
            let ignore_zero = schema.field_at(idx).bounds_ignore_zero;
            let mut acc: Option<Interval> = None;
            for v in dataset.records().iter().filter_map(|r| r.get(idx).ordinal()) {
                if ignore_zero && v == 0.0 {
                    continue;
                }
                acc = Some(match acc {
                    None => Interval::new(v, v),
                    Some(i) => Interval::new(i.min.min(v), i.max.max(v)),
                });
            }
            per_field[idx] = Some(acc.unwrap_or(Interval::ZERO));
        }

        Self { per_field }
    }

    /// Bounds for field `idx`; `None` if the field is not ordinal.
    pub fn get(&self, idx: usize) -> Option<Interval> {
        self.per_field.get(idx).copied().flatten()
    }

    /// `(field index, interval)` for every ordinal field.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Interval)> + '_ {
        self.per_field
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.map(|b| (i, b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_raw;
    use crate::pipeline::coerce::normalize;
    use crate::storage::schema::{DataType, FieldDef, MissingPolicy, Schema};
    use std::sync::Arc;

    fn dataset(csv: &str, fields: Vec<FieldDef>) -> Dataset {
        let raw = parse_raw(csv).unwrap();
        normalize(&raw, Arc::new(Schema::new(fields).unwrap()))
    }

    #[test]
    fn test_numeric_bounds() {
        let ds = dataset(
            "price,name\n300,a\n100,b\n250,c\n",
            vec![FieldDef::new("price", DataType::Number), FieldDef::new("name", DataType::Text)],
        );
        let b = Bounds::derive(&ds);
        assert_eq!(b.get(0), Some(Interval::new(100.0, 300.0)));
        assert_eq!(b.get(1), None);
        assert_eq!(b.iter().count(), 1);
    }

    #[test]
    fn test_no_values_degenerates_to_zero() {
        let ds = dataset(
            "price,when\n,\n,0000-00-00\n",
            vec![
                FieldDef::new("price", DataType::Number).with_missing(MissingPolicy::Null),
                FieldDef::new("when", DataType::Date),
            ],
        );
        let b = Bounds::derive(&ds);
        assert_eq!(b.get(0), Some(Interval::ZERO));
        assert_eq!(b.get(1), Some(Interval::ZERO));
    }

    #[test]
    fn test_empty_dataset_and_absent_field() {
        let ds = dataset("other\n", vec![FieldDef::new("price", DataType::Number)]);
        assert!(ds.is_empty());
        assert_eq!(Bounds::derive(&ds).get(0), Some(Interval::ZERO));
    }

    #[test]
    fn test_date_bounds_in_millis() {
        let ds = dataset(
            "when\n1970-01-03\n1970-01-02\n0000-00-00\n",
            vec![FieldDef::new("when", DataType::Date)],
        );
        let b = Bounds::derive(&ds).get(0).unwrap();
        assert_eq!(b, Interval::new(86_400_000.0, 172_800_000.0));
    }

    #[test]
    fn test_ignore_zero() {
        let ds = dataset(
            "built\n0\n1950\n2001\n",
            vec![FieldDef::new("built", DataType::Integer).ignoring_zero_bounds()],
        );
        assert_eq!(Bounds::derive(&ds).get(0), Some(Interval::new(1950.0, 2001.0)));
    }

    #[test]
    fn test_interval_clamp() {
        let outer = Interval::new(0.0, 100.0);
        assert_eq!(Interval::new(-50.0, 500.0).clamp_to(&outer), outer);
        assert_eq!(Interval::new(10.0, 20.0).clamp_to(&outer), Interval::new(10.0, 20.0));
        assert_eq!(Interval::new(20.0, 10.0).clamp_to(&outer), Interval::new(10.0, 20.0));
        assert_eq!(Interval::new(200.0, 300.0).clamp_to(&outer), Interval::new(100.0, 100.0));
        assert_eq!(Interval::new(-9.0, -1.0).clamp_to(&outer), Interval::new(0.0, 0.0));
        assert!(outer.contains(0.0) && outer.contains(100.0) && !outer.contains(100.5));
    }
}
