use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::core::lexicon::normalize;
use crate::models::query::{Extremum, Filter, GroupBy, Intent, ParsedQuery, YearRange};
use crate::models::result::{Aggregation, QueryResult, TrendPoint};
use crate::models::table::{Column, ColumnRole, Table};

/// Rows sharing one group key. `key` is `None` when the query is ungrouped.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub key: Option<String>,
    pub rows: Vec<usize>,
}

enum RowTest<'t> {
    Values(&'t Column, HashSet<String>),
    Years(&'t Column, YearRange),
    Never,
}

impl RowTest<'_> {
    fn accepts(&self, row: usize) -> bool {
        match self {
            RowTest::Values(col, allowed) => {
                col.text(row).is_some_and(|v| allowed.contains(&normalize(v)))
            }
            RowTest::Years(col, range) => col.year_at(row).is_some_and(|y| range.contains(y)),
            RowTest::Never => false,
        }
    }
}

/// Runs a `ParsedQuery` against one read-only table.
///
/// Select, partition and reduce are separate steps so that the row indices
/// behind every value can be inspected on their own.
pub struct QueryExecutor<'a> {
    table: &'a Table,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(table: &'a Table) -> Self {
        Self { table }
    }

    pub fn execute(&self, query: &ParsedQuery) -> Vec<QueryResult> {
        let rows = self.select(&query.filters);
        if rows.is_empty() {
            info!("filters matched no rows");
            return vec![QueryResult::NoData];
        }

        let partitions = self.partition(&rows, query);
        debug!(rows = rows.len(), partitions = partitions.len(), "rows partitioned");

        let results = self.reduce(query, &partitions);
        if !results.iter().any(QueryResult::has_data) {
            info!("matched rows hold no usable metric values");
            return vec![QueryResult::NoData];
        }
        results
    }

    /// Row indices passing every filter, in table order.
    pub fn select(&self, filters: &[Filter]) -> Vec<usize> {
        let tests: Vec<RowTest> = filters.iter().map(|f| self.row_test(f)).collect();
        (0..self.table.row_count())
            .filter(|&row| tests.iter().all(|t| t.accepts(row)))
            .collect()
    }

    fn row_test(&self, filter: &Filter) -> RowTest<'a> {
        let Some(column) = self.table.column(filter.column()) else {
            warn!(column = filter.column(), "filter on unknown column");
            return RowTest::Never;
        };
        match filter {
            Filter::Values { values, .. } => {
                RowTest::Values(column, values.iter().map(|v| normalize(v)).collect())
            }
            Filter::YearRange { range, .. } => RowTest::Years(column, *range),
        }
    }

    /// Group rows by the query's group-by column.
    ///
    /// Year groups come out in ascending year order. Text groups follow the
    /// order the question named them in, then first appearance in the table.
    pub fn partition(&self, rows: &[usize], query: &ParsedQuery) -> Vec<Partition> {
        let Some(group_by) = &query.group_by else {
            return vec![Partition { key: None, rows: rows.to_vec() }];
        };
        let Some(column) = self.table.column(&group_by.column) else {
            warn!(column = %group_by.column, "group-by on unknown column");
            return vec![Partition { key: None, rows: rows.to_vec() }];
        };

        let mut order: Vec<(String, Partition)> = Vec::new();
        let mut slot: HashMap<String, usize> = HashMap::new();
        // named values get a partition even when no row carries them
        if group_by.role != ColumnRole::Year {
            for value in mentioned_values(query, group_by) {
                let norm = normalize(value);
                slot.entry(norm.clone()).or_insert_with(|| {
                    order.push((norm, Partition { key: Some(value.to_string()), rows: Vec::new() }));
                    order.len() - 1
                });
            }
        }
        for &row in rows {
            let label = column.display(row);
            let norm = normalize(&label);
            let idx = *slot.entry(norm.clone()).or_insert_with(|| {
                order.push((norm, Partition { key: Some(label.clone()), rows: Vec::new() }));
                order.len() - 1
            });
            let part = &mut order[idx].1;
            if part.rows.is_empty() {
                // prefer the table's spelling over the question's
                part.key = Some(label);
            }
            part.rows.push(row);
        }

        if group_by.role == ColumnRole::Year {
            order.sort_by_key(|(norm, _)| norm.parse::<i32>().unwrap_or(i32::MAX));
        } else {
            let mentioned = mention_order(query, group_by);
            order.sort_by_key(|(norm, _)| {
                mentioned.iter().position(|m| m == norm).unwrap_or(usize::MAX)
            });
        }
        order.into_iter().map(|(_, p)| p).collect()
    }

    /// One result per partition and metric.
    ///
    /// A named group without usable cells yields `Missing`; the single
    /// partition of an ungrouped query yields nothing in that case.
    fn reduce(&self, query: &ParsedQuery, partitions: &[Partition]) -> Vec<QueryResult> {
        let mut results = Vec::new();
        for part in partitions {
            for metric in &query.metrics {
                let cells: Vec<(usize, f64)> = part
                    .rows
                    .iter()
                    .filter_map(|&row| self.table.metric(metric, row).map(|v| (row, v)))
                    .collect();
                if cells.is_empty() {
                    debug!(group = ?part.key, %metric, "no usable cells");
                    if part.key.is_some() {
                        results.push(QueryResult::Missing {
                            group: part.key.clone(),
                            metric: metric.clone(),
                        });
                    }
                    continue;
                }
                if let Some(result) = self.reduce_cells(query.intent, part.key.clone(), metric, &cells) {
                    results.push(result);
                }
            }
        }
        results
    }

    fn reduce_cells(
        &self,
        intent: Intent,
        group: Option<String>,
        metric: &str,
        cells: &[(usize, f64)],
    ) -> Option<QueryResult> {
        let metric = metric.to_string();
        let result = match intent {
            Intent::Average => mean_of(group, metric, cells),
            Intent::Compare if cells.len() == 1 => QueryResult::Value {
                group,
                metric,
                aggregation: Aggregation::Value,
                value: cells[0].1,
                rows: vec![cells[0].0],
            },
            Intent::Compare => mean_of(group, metric, cells),
            Intent::MaxMin(extremum) => {
                let (row, value) = extreme_of(extremum, cells);
                let aggregation = match extremum {
                    Extremum::Max => Aggregation::Max,
                    Extremum::Min => Aggregation::Min,
                };
                QueryResult::Value { group, metric, aggregation, value, rows: vec![row] }
            }
            Intent::Trend => {
                let mut points: Vec<TrendPoint> = cells
                    .iter()
                    .filter_map(|&(row, value)| {
                        self.table.year(row).map(|year| TrendPoint { year, value, row })
                    })
                    .collect();
                // stable: rows of one year keep table order
                points.sort_by_key(|p| p.year);
                QueryResult::Series { group, metric, points }
            }
            Intent::Unknown => {
                warn!("unknown intent reached the executor");
                return None;
            }
        };
        Some(result)
    }
}

fn mean_of(group: Option<String>, metric: String, cells: &[(usize, f64)]) -> QueryResult {
    let sum: f64 = cells.iter().map(|(_, v)| v).sum();
    QueryResult::Value {
        group,
        metric,
        aggregation: Aggregation::Mean,
        value: sum / cells.len() as f64,
        rows: cells.iter().map(|(row, _)| *row).collect(),
    }
}

/// Ties keep the earliest row.
fn extreme_of(extremum: Extremum, cells: &[(usize, f64)]) -> (usize, f64) {
    let mut best = cells[0];
    for &(row, value) in &cells[1..] {
        let better = match extremum {
            Extremum::Max => value > best.1,
            Extremum::Min => value < best.1,
        };
        if better {
            best = (row, value);
        }
    }
    best
}

fn mentioned_values<'q>(query: &'q ParsedQuery, group_by: &GroupBy) -> Vec<&'q str> {
    query
        .filters
        .iter()
        .filter_map(|f| match f {
            Filter::Values { column, values, .. } if *column == group_by.column => Some(values),
            _ => None,
        })
        .flatten()
        .map(String::as_str)
        .collect()
}

fn mention_order(query: &ParsedQuery, group_by: &GroupBy) -> Vec<String> {
    mentioned_values(query, group_by).into_iter().map(normalize).collect()
}
