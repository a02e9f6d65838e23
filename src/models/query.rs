use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::table::ColumnRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extremum {
    Max,
    Min,
}

/// What the question asks the executor to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "extremum")]
pub enum Intent {
    Compare,
    MaxMin(Extremum),
    Average,
    Trend,
    Unknown,
}

/// Inclusive year range, always normalized so that `lo <= hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    lo: i32,
    hi: i32,
}

impl YearRange {
    pub fn new(a: i32, b: i32) -> Self {
        Self { lo: a.min(b), hi: a.max(b) }
    }

    pub fn single(year: i32) -> Self {
        Self { lo: year, hi: year }
    }

    pub fn lo(&self) -> i32 {
        self.lo
    }

    pub fn hi(&self) -> i32 {
        self.hi
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.lo..=self.hi).contains(&year)
    }

    pub fn is_single(&self) -> bool {
        self.lo == self.hi
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.lo)
        } else {
            write!(f, "{}–{}", self.lo, self.hi)
        }
    }
}

/// One conjunct of a query. All filters of a `ParsedQuery` must hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Filter {
    /// Text column restricted to a set of values, compared case-insensitively.
    Values {
        column: String,
        role: ColumnRole,
        values: Vec<String>,
    },
    YearRange {
        column: String,
        range: YearRange,
    },
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Values { column, .. } | Filter::YearRange { column, .. } => column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBy {
    pub column: String,
    pub role: ColumnRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub intent: Intent,
    pub filters: Vec<Filter>,
    pub metrics: Vec<String>,
    pub group_by: Option<GroupBy>,
    /// Trend questions return year-ordered series instead of scalars.
    pub ordered_by_year: bool,
}

impl ParsedQuery {
    pub fn year_range(&self) -> Option<YearRange> {
        self.filters.iter().find_map(|f| match f {
            Filter::YearRange { range, .. } => Some(*range),
            _ => None,
        })
    }

    /// Values of every text filter on columns with the given role, in filter order.
    pub fn values_for(&self, role: ColumnRole) -> Vec<&str> {
        self.filters
            .iter()
            .filter_map(|f| match f {
                Filter::Values { role: r, values, .. } if *r == role => Some(values),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_range_normalizes_order() {
        let r = YearRange::new(2020, 2015);
        assert_eq!((r.lo(), r.hi()), (2015, 2020));
        assert!(r.contains(2015) && r.contains(2020));
        assert!(!r.contains(2021));
        assert_eq!(r.to_string(), "2015–2020");
        assert_eq!(YearRange::single(2016).to_string(), "2016");
    }

    #[test]
    fn intent_serializes_with_extremum() {
        let v = serde_json::to_value(Intent::MaxMin(Extremum::Min)).unwrap();
        assert_eq!(v, serde_json::json!({ "kind": "max_min", "extremum": "min" }));
        let v = serde_json::to_value(Intent::Average).unwrap();
        assert_eq!(v, serde_json::json!({ "kind": "average" }));
    }
}
