use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Geography,
    Year,
    Metric,
    Auxiliary,
}

#[derive(Debug, Clone)]
enum ColumnData {
    Text(Vec<String>),
    Year(Vec<i32>),
    Numeric(Vec<Option<f64>>),
}

/// A role-tagged column. The constructors tie each role to its storage type.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    role: ColumnRole,
    data: ColumnData,
}

impl Column {
    pub fn geography(name: impl Into<String>, values: Vec<String>) -> Self {
        Self { name: name.into(), role: ColumnRole::Geography, data: ColumnData::Text(values) }
    }

    pub fn auxiliary(name: impl Into<String>, values: Vec<String>) -> Self {
        Self { name: name.into(), role: ColumnRole::Auxiliary, data: ColumnData::Text(values) }
    }

    pub fn year(name: impl Into<String>, values: Vec<i32>) -> Self {
        Self { name: name.into(), role: ColumnRole::Year, data: ColumnData::Year(values) }
    }

    pub fn metric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self { name: name.into(), role: ColumnRole::Metric, data: ColumnData::Numeric(values) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> ColumnRole {
        self.role
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Text(v) => v.len(),
            ColumnData::Year(v) => v.len(),
            ColumnData::Numeric(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn text(&self, row: usize) -> Option<&str> {
        match &self.data {
            ColumnData::Text(v) => v.get(row).map(String::as_str),
            _ => None,
        }
    }

    pub fn year_at(&self, row: usize) -> Option<i32> {
        match &self.data {
            ColumnData::Year(v) => v.get(row).copied(),
            _ => None,
        }
    }

    pub fn number(&self, row: usize) -> Option<f64> {
        match &self.data {
            ColumnData::Numeric(v) => v.get(row).copied().flatten(),
            _ => None,
        }
    }

    /// Cell rendered as plain text, empty for a missing metric value.
    pub fn display(&self, row: usize) -> String {
        match &self.data {
            ColumnData::Text(v) => v.get(row).cloned().unwrap_or_default(),
            ColumnData::Year(v) => v.get(row).map(|y| y.to_string()).unwrap_or_default(),
            ColumnData::Numeric(v) => v
                .get(row)
                .copied()
                .flatten()
                .map(|n| n.to_string())
                .unwrap_or_default(),
        }
    }

    /// Distinct non-empty text values in first-occurrence order.
    pub fn distinct_text(&self) -> Vec<String> {
        let ColumnData::Text(values) = &self.data else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        values
            .iter()
            .filter(|v| !v.trim().is_empty())
            .filter(|v| seen.insert(v.to_lowercase()))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch { column: String, expected: usize, actual: usize },

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("table needs exactly one year column, found {0}")]
    YearColumnCount(usize),

    #[error("table needs at least one {0:?} column")]
    MissingRole(ColumnRole),

    #[error("row {row}: year {year} outside [1900, 2100]")]
    YearOutOfBounds { row: usize, year: i32 },
}

/// Immutable, row-indexed dataset handed over by ingestion.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
    year_idx: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let row_count = columns.first().map(Column::len).unwrap_or(0);

        let mut names = HashSet::new();
        for c in &columns {
            if c.len() != row_count {
                return Err(TableError::LengthMismatch {
                    column: c.name.clone(),
                    expected: row_count,
                    actual: c.len(),
                });
            }
            if !names.insert(c.name.to_lowercase()) {
                return Err(TableError::DuplicateColumn(c.name.clone()));
            }
        }

        let year_cols: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.role == ColumnRole::Year)
            .map(|(i, _)| i)
            .collect();
        if year_cols.len() != 1 {
            return Err(TableError::YearColumnCount(year_cols.len()));
        }
        for role in [ColumnRole::Geography, ColumnRole::Metric] {
            if !columns.iter().any(|c| c.role == role) {
                return Err(TableError::MissingRole(role));
            }
        }

        let year_idx = year_cols[0];
        if let ColumnData::Year(years) = &columns[year_idx].data {
            if let Some((row, &year)) = years
                .iter()
                .enumerate()
                .find(|(_, y)| !(MIN_YEAR..=MAX_YEAR).contains(*y))
            {
                return Err(TableError::YearOutOfBounds { row, year });
            }
        }

        Ok(Self { columns, row_count, year_idx })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn year_column(&self) -> &Column {
        &self.columns[self.year_idx]
    }

    pub fn year(&self, row: usize) -> Option<i32> {
        self.year_column().year_at(row)
    }

    pub fn columns_with_role(&self, role: ColumnRole) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(move |c| c.role == role)
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.columns_with_role(ColumnRole::Metric)
            .map(|c| c.name.clone())
            .collect()
    }

    /// First geography value of a row, used to label rows in answers.
    pub fn geography_label(&self, row: usize) -> Option<&str> {
        self.columns_with_role(ColumnRole::Geography)
            .find_map(|c| c.text(row))
            .filter(|s| !s.is_empty())
    }

    /// Metric cell lookup by column name.
    pub fn metric(&self, column: &str, row: usize) -> Option<f64> {
        self.column(column)
            .filter(|c| c.role == ColumnRole::Metric)
            .and_then(|c| c.number(row))
    }
}
