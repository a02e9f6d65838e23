use serde_json::{json, Map, Value};

use crate::models::table::{ColumnRole, Table};

/// One table row as a JSON object keyed by column name. Missing metrics become `null`.
pub fn row_to_json(table: &Table, row: usize) -> Value {
    let mut map = Map::new();

    for col in table.columns() {
        let val = match col.role() {
            ColumnRole::Year => json!(col.year_at(row)),
            ColumnRole::Metric => json!(col.number(row)),
            ColumnRole::Geography | ColumnRole::Auxiliary => json!(col.text(row)),
        };
        map.insert(col.name().to_string(), val);
    }

    Value::Object(map)
}

/// Up to `limit` leading rows, for previews.
pub fn rows_to_json(table: &Table, limit: usize) -> Vec<Value> {
    (0..table.row_count().min(limit)).map(|row| row_to_json(table, row)).collect()
}
