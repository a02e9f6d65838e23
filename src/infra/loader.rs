use anyhow::Context;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::core::lexicon::tokenize;
use crate::models::table::{Column, ColumnRole, Table, MAX_YEAR, MIN_YEAR};

const GEOGRAPHY_WORDS: &[&str] = &[
    "state", "region", "district", "subdivision", "area", "location", "country", "city",
];
const YEAR_WORDS: &[&str] = &["year", "yr"];
const AUXILIARY_WORDS: &[&str] = &["month", "season"];
const CURRENCY: &[char] = &[',', '$', '₹', '€', '£'];

/// Share of non-empty cells that must parse as numbers for a metric column.
const NUMERIC_SHARE: f64 = 0.8;

pub fn load_csv_path(path: &Path) -> anyhow::Result<Table> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    load_csv(file).with_context(|| format!("cannot load {}", path.display()))
}

pub fn load_csv_str(raw: &str) -> anyhow::Result<Table> {
    load_csv(raw.as_bytes())
}

/// Reads a CSV into a role-tagged `Table`.
pub fn load_csv<R: Read>(reader: R) -> anyhow::Result<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    // A. headers and non-empty rows, padded to the header width
    let mut headers: Vec<String> = rdr
        .headers()
        .context("CSV has no header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("malformed CSV record {}", i + 1))?;
        let mut cells: Vec<String> = record.iter().map(|c| c.trim().to_string()).collect();
        if cells.iter().all(String::is_empty) {
            continue;
        }
        cells.resize(headers.len().max(cells.len()), String::new());
        rows.push(cells);
    }
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(headers.len());
    for (i, h) in headers.iter_mut().enumerate() {
        if h.is_empty() {
            *h = format!("column_{}", i + 1);
        }
    }
    while headers.len() < width {
        headers.push(format!("column_{}", headers.len() + 1));
    }
    for row in &mut rows {
        row.resize(width, String::new());
    }

    // B. drop columns without a single value
    let kept: Vec<usize> = (0..width)
        .filter(|&c| rows.iter().any(|r| !r[c].is_empty()))
        .collect();
    anyhow::ensure!(!kept.is_empty(), "CSV has no data");

    // C. roles from header keywords, then from cell contents
    let mut roles: Vec<(usize, ColumnRole)> = Vec::new();
    let mut year_col = None;
    for &c in &kept {
        let words = tokenize(&headers[c]);
        let has = |set: &[&str]| words.iter().any(|w| set.contains(&w.as_str()));
        let role = if year_col.is_none() && has(YEAR_WORDS) {
            year_col = Some(c);
            ColumnRole::Year
        } else if has(GEOGRAPHY_WORDS) {
            ColumnRole::Geography
        } else if has(AUXILIARY_WORDS) {
            ColumnRole::Auxiliary
        } else if mostly_numeric(rows.iter().map(|r| r[c].as_str())) {
            ColumnRole::Metric
        } else {
            ColumnRole::Auxiliary
        };
        roles.push((c, role));
    }
    let year_col = year_col.context("CSV needs a year column (a header containing 'year')")?;
    if !roles.iter().any(|(_, r)| *r == ColumnRole::Geography) {
        // no keyword hit: the first text column names the places
        if let Some(entry) = roles.iter_mut().find(|(_, r)| *r == ColumnRole::Auxiliary) {
            entry.1 = ColumnRole::Geography;
        }
    }

    // D. rows need a usable year
    let mut years = Vec::with_capacity(rows.len());
    let mut usable = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        match parse_year(&row[year_col]) {
            Some(y) if (MIN_YEAR..=MAX_YEAR).contains(&y) => {
                years.push(y);
                usable.push(i);
            }
            _ => warn!(record = i + 1, year = %row[year_col], "dropping record without a usable year"),
        }
    }

    // E. typed columns
    let columns = roles
        .iter()
        .map(|&(c, role)| {
            let name = headers[c].clone();
            let text = || usable.iter().map(|&i| rows[i][c].clone()).collect::<Vec<_>>();
            match role {
                ColumnRole::Year => Column::year(name, years.clone()),
                ColumnRole::Metric => {
                    Column::metric(name, usable.iter().map(|&i| parse_number(&rows[i][c])).collect())
                }
                ColumnRole::Geography => Column::geography(name, text()),
                ColumnRole::Auxiliary => Column::auxiliary(name, text()),
            }
        })
        .collect();

    let table = Table::new(columns).context("CSV does not form a valid table")?;
    info!(
        rows = table.row_count(),
        dropped = rows.len() - table.row_count(),
        metrics = table.metric_names().len(),
        "dataset loaded"
    );
    Ok(table)
}

/// Numeric cell with thousands separators and currency symbols stripped.
pub fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell.chars().filter(|c| !CURRENCY.contains(c)).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_year(cell: &str) -> Option<i32> {
    let v = cell.trim().parse::<f64>().ok()?;
    (v.fract() == 0.0 && v.abs() < 1e6).then_some(v as i32)
}

fn mostly_numeric<'a>(cells: impl Iterator<Item = &'a str>) -> bool {
    let (mut filled, mut numeric) = (0usize, 0usize);
    for cell in cells.filter(|c| !c.is_empty()) {
        filled += 1;
        if parse_number(cell).is_some() {
            numeric += 1;
        }
    }
    filled > 0 && numeric as f64 / filled as f64 >= NUMERIC_SHARE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
 State , Year ,Season, Annual_Rainfall_mm ,Notes,
Maharashtra,2016,Monsoon,\"1,350.2\",,
Tamil Nadu,2015,Monsoon,950.8,late,
,,,,,
Goa,2016,Monsoon,n/a,,
Kerala,1850,Monsoon,3000,,
Karnataka,,Monsoon,1100,,
";

    #[test]
    fn detects_roles_and_cleans_rows() {
        let table = load_csv_str(SAMPLE).unwrap();
        let roles: Vec<_> = table.columns().iter().map(|c| (c.name(), c.role())).collect();
        assert_eq!(
            roles,
            vec![
                ("State", ColumnRole::Geography),
                ("Year", ColumnRole::Year),
                ("Season", ColumnRole::Auxiliary),
                ("Annual_Rainfall_mm", ColumnRole::Metric),
                ("Notes", ColumnRole::Auxiliary),
            ]
        );
        // blank record, 1850 and the missing year are gone
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.metric("Annual_Rainfall_mm", 0), Some(1350.2));
        assert_eq!(table.metric("Annual_Rainfall_mm", 2), None);
    }

    #[test]
    fn first_text_column_becomes_geography() {
        let table = load_csv_str("Name,Year,Rain_mm\nKonkan,2015,10\n").unwrap();
        assert_eq!(table.column("Name").map(Column::role), Some(ColumnRole::Geography));
    }

    #[test]
    fn missing_year_column_is_an_error() {
        let err = load_csv_str("State,Rain_mm\nGoa,10\n").unwrap_err();
        assert!(err.to_string().contains("year"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let table = load_csv_path(file.path()).unwrap();
        assert_eq!(table.geography_label(1), Some("Tamil Nadu"));
        assert!(load_csv_path(Path::new("/nonexistent/rain.csv")).is_err());
    }

    #[test]
    fn numbers_tolerate_separators() {
        assert_eq!(parse_number("₹1,200.5"), Some(1200.5));
        assert_eq!(parse_number("  "), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_year("2015.0"), Some(2015));
        assert_eq!(parse_year("2015.5"), None);
    }
}
