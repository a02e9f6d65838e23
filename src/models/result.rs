use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Mean,
    Max,
    Min,
    /// Raw cell, used when a compared group holds a single row.
    Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub year: i32,
    pub value: f64,
    pub row: usize,
}

/// Outcome of one (group, metric) pair. Every value carries the rows that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum QueryResult {
    Value {
        group: Option<String>,
        metric: String,
        aggregation: Aggregation,
        value: f64,
        rows: Vec<usize>,
    },
    Series {
        group: Option<String>,
        metric: String,
        points: Vec<TrendPoint>,
    },
    /// A named group with no usable cells for this metric.
    Missing {
        group: Option<String>,
        metric: String,
    },
    NoData,
}

impl QueryResult {
    pub fn is_no_data(&self) -> bool {
        matches!(self, QueryResult::NoData)
    }

    /// True for results backed by at least one cell.
    pub fn has_data(&self) -> bool {
        matches!(self, QueryResult::Value { .. } | QueryResult::Series { .. })
    }

    pub fn metric(&self) -> Option<&str> {
        match self {
            QueryResult::Value { metric, .. }
            | QueryResult::Series { metric, .. }
            | QueryResult::Missing { metric, .. } => Some(metric),
            QueryResult::NoData => None,
        }
    }

    pub fn group(&self) -> Option<&str> {
        match self {
            QueryResult::Value { group, .. }
            | QueryResult::Series { group, .. }
            | QueryResult::Missing { group, .. } => group.as_deref(),
            QueryResult::NoData => None,
        }
    }

    /// Contributing row indices in citation order.
    pub fn rows(&self) -> Vec<usize> {
        match self {
            QueryResult::Value { rows, .. } => rows.clone(),
            QueryResult::Series { points, .. } => points.iter().map(|p| p.row).collect(),
            QueryResult::Missing { .. } | QueryResult::NoData => Vec::new(),
        }
    }
}

/// Proof of provenance: one metric cell of one table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub row_index: usize,
    pub column: String,
    pub value: f64,
    pub label: String,
}
