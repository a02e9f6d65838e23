use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt::Write as _;

use crate::config::FormatConfig;
use crate::core::error::QaError;
use crate::core::lexicon::tokenize;
use crate::infra::utils::row_to_json;
use crate::models::query::{Extremum, Intent, ParsedQuery};
use crate::models::result::{Aggregation, Citation, QueryResult, TrendPoint};
use crate::models::table::{ColumnRole, Table};

const UNIT_WORDS: &[&str] = &["mm", "cm", "in", "inch", "inches", "c", "f", "pct"];

/// Renders results as answer text plus the citations backing it.
pub struct AnswerFormatter {
    config: FormatConfig,
}

impl AnswerFormatter {
    pub fn new(config: FormatConfig) -> Self {
        Self { config }
    }

    /// Fixed precision, half away from zero, thousands separators from 1000 up.
    pub fn format_number(&self, value: f64) -> String {
        let Some(d) = Decimal::from_f64(value) else {
            return "N/A".to_string();
        };
        let mut d = d.round_dp_with_strategy(
            self.config.precision,
            RoundingStrategy::MidpointAwayFromZero,
        );
        d.rescale(self.config.precision);
        group_thousands(&d.to_string())
    }

    /// Unit implied by a metric column name, else the configured default.
    pub fn unit_for(&self, column: &str) -> String {
        let words = tokenize(column);
        let has = |w: &str| words.iter().any(|t| t == w);
        let unit = if has("mm") || words.iter().any(|t| t.starts_with("millimet")) {
            "mm"
        } else if has("cm") {
            "cm"
        } else if has("inch") || has("inches") {
            "in"
        } else if has("fahrenheit") {
            "°F"
        } else if has("celsius") || words.iter().any(|t| t.starts_with("temp")) {
            "°C"
        } else {
            self.config.default_unit.as_str()
        };
        unit.to_string()
    }

    pub fn format_value(&self, value: f64, column: &str) -> String {
        let unit = self.unit_for(column);
        if unit.is_empty() {
            self.format_number(value)
        } else {
            format!("{} {}", self.format_number(value), unit)
        }
    }

    /// Citation for one metric cell; `None` when the cell is empty.
    pub fn cite(&self, table: &Table, row: usize, column: &str) -> Option<Citation> {
        let value = table.metric(column, row)?;
        Some(Citation {
            row_index: row,
            column: column.to_string(),
            value,
            label: format!("Row {}, Column '{}': {}", row, column, self.format_value(value, column)),
        })
    }

    /// Citations for every contributing row, in result order.
    pub fn citations(&self, results: &[QueryResult], table: &Table) -> Vec<Citation> {
        results
            .iter()
            .filter_map(|r| r.metric().map(|m| (m, r.rows())))
            .flat_map(|(metric, rows)| {
                rows.into_iter()
                    .filter_map(|row| self.cite(table, row, metric))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn render(
        &self,
        query: &ParsedQuery,
        results: &[QueryResult],
        table: &Table,
    ) -> (String, Vec<Citation>) {
        if results.is_empty() || results.iter().any(QueryResult::is_no_data) {
            return (self.render_no_data(query), Vec::new());
        }
        let text = match query.intent {
            Intent::Average => self.render_average(query, results),
            Intent::MaxMin(extremum) => self.render_max_min(query, results, table, extremum),
            Intent::Compare => self.render_compare(query, results),
            Intent::Trend => self.render_trend(query, results, table),
            Intent::Unknown => return (self.render_no_data(query), Vec::new()),
        };
        (text, self.citations(results, table))
    }

    pub fn render_no_data(&self, query: &ParsedQuery) -> String {
        let scope = describe_scope(query, "for");
        format!("No matching records were found{}, so there is no value to report.", scope)
    }

    pub fn render_error(&self, err: &QaError) -> String {
        match err {
            QaError::Parse(reason) => format!(
                "I couldn't work out what to compute: {}. Try something like \"What was the average rainfall in Kerala during 2015-2020?\"",
                reason
            ),
            QaError::InvalidRange { year } => format!(
                "Year {} is outside the supported range 1900–2100, so no query was run.",
                year
            ),
            QaError::AmbiguousEntity { token, role, candidates } => format!(
                "'{}' could refer to several {} values ({}). Please name the one you mean.",
                token,
                role,
                candidates.join(", ")
            ),
        }
    }

    fn render_average(&self, query: &ParsedQuery, results: &[QueryResult]) -> String {
        let scope = describe_scope(query, "in");
        results
            .iter()
            .filter_map(|r| match r {
                QueryResult::Value { group, metric, value, rows, .. } => Some(format!(
                    "The average {}{}{} is {} (calculated from {}).",
                    metric_label(metric),
                    group.as_ref().map(|g| format!(" for {}", g)).unwrap_or_default(),
                    scope,
                    self.format_value(*value, metric),
                    records(rows.len())
                )),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn render_max_min(
        &self,
        query: &ParsedQuery,
        results: &[QueryResult],
        table: &Table,
        extremum: Extremum,
    ) -> String {
        let word = match extremum {
            Extremum::Max => "highest",
            Extremum::Min => "lowest",
        };
        let scope = describe_scope(query, "in");
        // a single named place is already in the scope
        let show_place = query.values_for(ColumnRole::Geography).len() != 1;
        results
            .iter()
            .filter_map(|r| match r {
                QueryResult::Value { metric, value, rows, .. } => {
                    let row = *rows.first()?;
                    Some(format!(
                        "The {} {}{} was {}, recorded{}.",
                        word,
                        metric_label(metric),
                        scope,
                        self.format_value(*value, metric),
                        describe_row(table, row, show_place)
                    ))
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn render_compare(&self, query: &ParsedQuery, results: &[QueryResult]) -> String {
        let metrics = distinct_metrics(results);
        let mut out = String::new();
        let heading = match metrics.as_slice() {
            [only] => metric_label(only),
            _ => "the selected measures".to_string(),
        };
        let years = query.year_range().map(|r| format!(" ({})", r)).unwrap_or_default();
        let _ = writeln!(out, "Comparison of {}{}:", heading, years);

        for r in results {
            let (group, metric, aggregation, value, rows) = match r {
                QueryResult::Value { group, metric, aggregation, value, rows } => {
                    (group, metric, aggregation, value, rows)
                }
                QueryResult::Missing { group, metric } => {
                    let name = group.as_deref().unwrap_or("All records");
                    if metrics.len() == 1 {
                        let _ = writeln!(out, "- {}: no records", name);
                    } else {
                        let _ = writeln!(out, "- {}, {}: no records", name, metric_label(metric));
                    }
                    continue;
                }
                _ => continue,
            };
            let name = group.as_deref().unwrap_or("All records");
            let how = match aggregation {
                Aggregation::Value => "single record".to_string(),
                _ => format!("average of {}", records(rows.len())),
            };
            if metrics.len() == 1 {
                let _ = writeln!(out, "- {}: {} ({})", name, self.format_value(*value, metric), how);
            } else {
                let _ = writeln!(
                    out,
                    "- {}, {}: {} ({})",
                    name,
                    metric_label(metric),
                    self.format_value(*value, metric),
                    how
                );
            }
        }

        for metric in &metrics {
            let scored: Vec<(&str, f64)> = results
                .iter()
                .filter_map(|r| match r {
                    QueryResult::Value { group: Some(g), metric: m, value, .. } if m == metric => {
                        Some((g.as_str(), *value))
                    }
                    _ => None,
                })
                .collect();
            if scored.len() < 2 {
                continue;
            }
            let mut hi = scored[0];
            let mut lo = scored[0];
            for &s in &scored[1..] {
                if s.1 > hi.1 {
                    hi = s;
                }
                if s.1 < lo.1 {
                    lo = s;
                }
            }
            let _ = writeln!(
                out,
                "{} had the highest {} ({}), while {} had the lowest ({}).",
                hi.0,
                metric_label(metric),
                self.format_value(hi.1, metric),
                lo.0,
                self.format_value(lo.1, metric)
            );
        }
        out.trim_end().to_string()
    }

    fn render_trend(&self, query: &ParsedQuery, results: &[QueryResult], table: &Table) -> String {
        let scope = describe_scope(query, "in");
        let mut sections = Vec::new();
        for r in results {
            let (group, metric, points) = match r {
                QueryResult::Series { group, metric, points } => (group, metric, points),
                QueryResult::Missing { group: Some(g), metric } => {
                    sections.push(format!(
                        "{} trend for {}: no records",
                        title_case(&metric_label(metric)),
                        g
                    ));
                    continue;
                }
                _ => continue,
            };
            let mut out = String::new();
            let title = match group {
                Some(g) => format!("{} trend for {}", title_case(&metric_label(metric)), g),
                None => format!("{} trend{}", title_case(&metric_label(metric)), scope),
            };
            let _ = writeln!(out, "{}:", title);
            for p in points {
                let place = if group.is_none() {
                    table.geography_label(p.row).map(|g| format!(" ({})", g)).unwrap_or_default()
                } else {
                    String::new()
                };
                let _ = writeln!(out, "- {}: {}{}", p.year, self.format_value(p.value, metric), place);
            }
            if let Some(summary) = self.trend_summary(metric, points) {
                out.push_str(&summary);
            }
            sections.push(out.trim_end().to_string());
        }
        sections.join("\n\n")
    }

    fn trend_summary(&self, metric: &str, points: &[TrendPoint]) -> Option<String> {
        let (first, last) = (points.first()?, points.last()?);
        // one point per year, otherwise first and last may be different places
        if points.len() < 2 || points.windows(2).any(|w| w[0].year >= w[1].year) {
            return None;
        }
        let change = last.value - first.value;
        let label = metric_label(metric);
        let summary = if change == 0.0 {
            format!("Overall, {} stayed the same from {} to {}.", label, first.year, last.year)
        } else if first.value == 0.0 {
            format!(
                "Overall, {} changed by {} from {} to {}.",
                label,
                self.format_value(change, metric),
                first.year,
                last.year
            )
        } else {
            format!(
                "Overall, {} {} by {:.1}% from {} to {}.",
                label,
                if change > 0.0 { "increased" } else { "decreased" },
                (change / first.value * 100.0).abs(),
                first.year,
                last.year
            )
        };
        Some(summary)
    }
}

/// Prompt for an external text model. Pure: builds text, performs no I/O.
pub fn build_prompt(
    question: &str,
    query: Option<&ParsedQuery>,
    results: &[QueryResult],
    table: &Table,
) -> String {
    let mut p = String::from(
        "You are a data analysis assistant. Answer the user's question using only the data points below.\n\n",
    );
    let _ = writeln!(p, "User question: {}\n", question);

    match query {
        Some(q) => {
            let _ = writeln!(p, "Operation: {:?}", q.intent);
            let _ = writeln!(p, "Metrics: {}", q.metrics.join(", "));
            let filters = serde_json::to_string(&q.filters).unwrap_or_default();
            let _ = writeln!(p, "Filters: {}", filters);
            if let Some(g) = &q.group_by {
                let _ = writeln!(p, "Grouped by: {}", g.column);
            }
        }
        None => {
            let _ = writeln!(p, "Operation: none (the question could not be parsed)");
        }
    }
    let _ = writeln!(p, "Number of data points: {}\n", results.len());

    for (i, r) in results.iter().enumerate() {
        let _ = writeln!(p, "Data point {}:", i + 1);
        match r {
            QueryResult::Value { group, metric, aggregation, value, rows } => {
                if let Some(g) = group {
                    let _ = writeln!(p, "  - group: {}", g);
                }
                let _ = writeln!(p, "  - metric: {}", metric);
                let _ = writeln!(p, "  - aggregation: {:?}", aggregation);
                let _ = writeln!(p, "  - value: {}", value);
                let _ = writeln!(p, "  - from {}", records(rows.len()));
            }
            QueryResult::Series { group, metric, points } => {
                if let Some(g) = group {
                    let _ = writeln!(p, "  - group: {}", g);
                }
                let _ = writeln!(p, "  - metric: {}", metric);
                for pt in points {
                    let _ = writeln!(p, "  - {}: {} (row {})", pt.year, pt.value, pt.row);
                }
            }
            QueryResult::Missing { group, metric } => {
                if let Some(g) = group {
                    let _ = writeln!(p, "  - group: {}", g);
                }
                let _ = writeln!(p, "  - metric: {}", metric);
                let _ = writeln!(p, "  - no usable values");
            }
            QueryResult::NoData => {
                let _ = writeln!(p, "  - no matching rows");
            }
        }
        for row in r.rows() {
            let _ = writeln!(p, "  - row {}: {}", row, row_to_json(table, row));
        }
        p.push('\n');
    }

    p.push_str(
        "Instructions:\n\
         1. Give a clear, natural language answer.\n\
         2. Use only the numbers and facts listed above.\n\
         3. After each fact, name the row it comes from (for example 'row 4').\n\
         4. If there are no data points, say that no data was found.\n\
         5. Keep the answer short.\n\n\
         Answer:",
    );
    p
}

/// "Annual_Rainfall_mm" reads as "annual rainfall".
pub fn metric_label(column: &str) -> String {
    let words = tokenize(column);
    match words.split_last() {
        Some((last, rest)) if !rest.is_empty() && UNIT_WORDS.contains(&last.as_str()) => {
            rest.join(" ")
        }
        _ => words.join(" "),
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn records(n: usize) -> String {
    if n == 1 {
        "1 record".to_string()
    } else {
        format!("{} records", n)
    }
}

/// " in Kerala and Goa (Monsoon) during 2015–2020", empty when unfiltered.
fn describe_scope(query: &ParsedQuery, place_word: &str) -> String {
    let mut scope = String::new();
    let places = query.values_for(ColumnRole::Geography);
    if !places.is_empty() {
        let _ = write!(scope, " {} {}", place_word, join_and(&places));
    }
    let aux = query.values_for(ColumnRole::Auxiliary);
    if !aux.is_empty() {
        let _ = write!(scope, " ({})", aux.join(", "));
    }
    if let Some(range) = query.year_range() {
        if range.is_single() {
            let _ = write!(scope, " in {}", range);
        } else {
            let _ = write!(scope, " during {}", range);
        }
    }
    scope
}

fn describe_row(table: &Table, row: usize, with_place: bool) -> String {
    let mut out = String::new();
    if let Some(place) = table.geography_label(row).filter(|_| with_place) {
        let _ = write!(out, " in {}", place);
    }
    if let Some(year) = table.year(row) {
        let _ = write!(out, " in {}", year);
    }
    out
}

fn join_and(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [one] => one.to_string(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

fn distinct_metrics(results: &[QueryResult]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in results.iter().filter_map(QueryResult::metric) {
        if !out.iter().any(|o| o == m) {
            out.push(m.to_string());
        }
    }
    out
}

fn group_thousands(number: &str) -> String {
    let (sign, digits) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (int, frac) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    match frac {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::query::{Filter, YearRange};
    use crate::models::table::Column;

    fn formatter() -> AnswerFormatter {
        AnswerFormatter::new(FormatConfig::default())
    }

    fn table() -> Table {
        Table::new(vec![
            Column::geography("State", vec!["Karnataka".into(), "Goa".into()]),
            Column::year("Year", vec![2015, 2016]),
            Column::metric("Annual_Rainfall_mm", vec![Some(1100.4), Some(3005.0)]),
        ])
        .unwrap()
    }

    fn query(intent: Intent, filters: Vec<Filter>) -> ParsedQuery {
        ParsedQuery {
            intent,
            filters,
            metrics: vec!["Annual_Rainfall_mm".into()],
            group_by: None,
            ordered_by_year: intent == Intent::Trend,
        }
    }

    #[test]
    fn numbers_round_and_group() {
        let f = formatter();
        assert_eq!(f.format_number(1100.4), "1,100.40");
        assert_eq!(f.format_number(985.556), "985.56");
        assert_eq!(f.format_number(0.125), "0.13");
        assert_eq!(f.format_number(1234567.0), "1,234,567.00");
        assert_eq!(f.format_number(-1500.5), "-1,500.50");
        assert_eq!(f.format_number(f64::NAN), "N/A");

        let f = AnswerFormatter::new(FormatConfig { precision: 0, default_unit: String::new() });
        assert_eq!(f.format_number(2.5), "3");
    }

    #[test]
    fn units_come_from_column_names() {
        let f = AnswerFormatter::new(FormatConfig { precision: 2, default_unit: "units".into() });
        assert_eq!(f.unit_for("Annual_Rainfall_mm"), "mm");
        assert_eq!(f.unit_for("Avg_Temp"), "°C");
        assert_eq!(f.unit_for("Rain_cm"), "cm");
        assert_eq!(f.unit_for("Rainy_Days"), "units");
    }

    #[test]
    fn citation_label_is_fixed_format() {
        let c = formatter().cite(&table(), 0, "Annual_Rainfall_mm").unwrap();
        assert_eq!(c.row_index, 0);
        assert_eq!(c.value, 1100.4);
        assert_eq!(c.label, "Row 0, Column 'Annual_Rainfall_mm': 1,100.40 mm");
    }

    #[test]
    fn max_template_names_row_context() {
        let t = table();
        let q = query(
            Intent::MaxMin(Extremum::Max),
            vec![Filter::Values {
                column: "State".into(),
                role: ColumnRole::Geography,
                values: vec!["Karnataka".into()],
            }],
        );
        let results = vec![QueryResult::Value {
            group: None,
            metric: "Annual_Rainfall_mm".into(),
            aggregation: Aggregation::Max,
            value: 1100.4,
            rows: vec![0],
        }];
        let (text, cites) = formatter().render(&q, &results, &t);
        assert_eq!(
            text,
            "The highest annual rainfall in Karnataka was 1,100.40 mm, recorded in 2015."
        );
        assert_eq!(cites.len(), 1);

        // no place named, so the row's place is shown
        let (text, _) = formatter().render(&query(Intent::MaxMin(Extremum::Max), vec![]), &results, &t);
        assert_eq!(text, "The highest annual rainfall was 1,100.40 mm, recorded in Karnataka in 2015.");
    }

    #[test]
    fn no_data_template_has_no_citations() {
        let q = query(
            Intent::Average,
            vec![
                Filter::Values {
                    column: "State".into(),
                    role: ColumnRole::Geography,
                    values: vec!["Kerala".into()],
                },
                Filter::YearRange { column: "Year".into(), range: YearRange::new(2015, 2020) },
            ],
        );
        let (text, cites) = formatter().render(&q, &[QueryResult::NoData], &table());
        assert_eq!(
            text,
            "No matching records were found for Kerala during 2015–2020, so there is no value to report."
        );
        assert!(cites.is_empty());
    }

    #[test]
    fn trend_lists_points_and_overall_change() {
        let t = table();
        let results = vec![QueryResult::Series {
            group: None,
            metric: "Annual_Rainfall_mm".into(),
            points: vec![
                TrendPoint { year: 2015, value: 1100.4, row: 0 },
                TrendPoint { year: 2016, value: 3005.0, row: 1 },
            ],
        }];
        let (text, cites) = formatter().render(&query(Intent::Trend, vec![]), &results, &t);
        assert!(text.starts_with("Annual Rainfall trend:\n- 2015: 1,100.40 mm (Karnataka)\n"));
        assert!(text.ends_with("Overall, annual rainfall increased by 173.1% from 2015 to 2016."));
        let rows: Vec<_> = cites.iter().map(|c| c.row_index).collect();
        assert_eq!(rows, vec![0, 1]);
    }

    #[test]
    fn trend_mixing_places_in_one_year_has_no_overall_line() {
        let t = table();
        let results = vec![QueryResult::Series {
            group: None,
            metric: "Annual_Rainfall_mm".into(),
            points: vec![
                TrendPoint { year: 2015, value: 1100.4, row: 0 },
                TrendPoint { year: 2015, value: 3005.0, row: 1 },
                TrendPoint { year: 2016, value: 900.0, row: 0 },
            ],
        }];
        let (text, _) = formatter().render(&query(Intent::Trend, vec![]), &results, &t);
        assert!(!text.contains("Overall"));
    }

    #[test]
    fn compare_names_groups_without_records() {
        let t = table();
        let q = ParsedQuery {
            group_by: Some(crate::models::query::GroupBy {
                column: "State".into(),
                role: ColumnRole::Geography,
            }),
            ..query(Intent::Compare, vec![])
        };
        let results = vec![
            QueryResult::Missing { group: Some("Kerala".into()), metric: "Annual_Rainfall_mm".into() },
            QueryResult::Value {
                group: Some("Karnataka".into()),
                metric: "Annual_Rainfall_mm".into(),
                aggregation: Aggregation::Value,
                value: 1100.4,
                rows: vec![0],
            },
        ];
        let (text, cites) = formatter().render(&q, &results, &t);
        assert_eq!(
            text,
            "Comparison of annual rainfall:\n- Kerala: no records\n- Karnataka: 1,100.40 mm (single record)"
        );
        assert_eq!(cites.len(), 1);
    }

    #[test]
    fn prompt_embeds_question_and_cited_rows() {
        let t = table();
        let results = vec![QueryResult::Value {
            group: None,
            metric: "Annual_Rainfall_mm".into(),
            aggregation: Aggregation::Mean,
            value: 2052.7,
            rows: vec![0, 1],
        }];
        let q = query(Intent::Average, vec![]);
        let prompt = build_prompt("average rainfall?", Some(&q), &results, &t);
        assert!(prompt.contains("User question: average rainfall?"));
        assert!(prompt.contains("Data point 1:"));
        assert!(prompt.contains("row 1: {"));
        assert!(prompt.contains("\"State\":\"Goa\""));
        assert!(prompt.trim_end().ends_with("Answer:"));
    }

    #[test]
    fn joins_and_labels() {
        assert_eq!(join_and(&["A", "B", "C"]), "A, B and C");
        assert_eq!(metric_label("Monsoon_Rainfall_mm"), "monsoon rainfall");
        assert_eq!(title_case("monsoon rainfall"), "Monsoon Rainfall");
    }
}
