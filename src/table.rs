//! In-memory tables produced by dataset loaders.

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

use crate::types::{ColumnName, RowIndex};

/// One row: column name to value (string, number, null, or nested JSON).
pub type Row = IndexMap<ColumnName, Value>;

/// Ordered rows with a column list that is the union of row keys in first-seen order.
///
/// Every row carries every column; keys a source row lacked hold null. Tables
/// are immutable once loaded; a cursor holds one for its whole lifetime.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<ColumnName>,
    rows: Vec<Row>,
}

impl Table {
    /// Build a table from rows, deriving the column list and filling absent columns with null.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut columns: IndexSet<ColumnName> = IndexSet::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.contains(key) {
                    columns.insert(key.clone());
                }
            }
        }
        let rows = rows
            .into_iter()
            .map(|mut row| {
                if row.len() < columns.len() {
                    for column in &columns {
                        row.entry(column.clone()).or_insert(Value::Null);
                    }
                }
                row
            })
            .collect();
        Self {
            columns: columns.into_iter().collect(),
            rows,
        }
    }

    /// Build a table from JSON objects, in order.
    pub fn from_json_objects(objects: Vec<Map<String, Value>>) -> Self {
        Self::from_rows(objects.into_iter().map(row_from_object).collect())
    }

    /// Concatenate tables in order.
    pub fn concat(tables: impl IntoIterator<Item = Table>) -> Self {
        let rows = tables
            .into_iter()
            .flat_map(|table| table.rows.into_iter())
            .collect();
        Self::from_rows(rows)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in first-seen order.
    pub fn columns(&self) -> &[ColumnName] {
        &self.columns
    }

    /// True if any row carries `name`.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column == name)
    }

    /// Row at `idx`, if in range.
    pub fn row(&self, idx: RowIndex) -> Option<&Row> {
        self.rows.get(idx)
    }

    /// All rows in order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

/// Convert a JSON object into a row, keeping key order.
pub fn row_from_object(object: Map<String, Value>) -> Row {
    object.into_iter().collect()
}

/// Render a cell as prompt text.
///
/// Strings are returned as-is, null as empty, and nested values as compact JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => row_from_object(map),
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn columns_are_union_in_first_seen_order() {
        let table = Table::from_rows(vec![
            row(json!({"b": 1, "a": "x"})),
            row(json!({"a": "y", "c": null})),
        ]);
        assert_eq!(table.columns(), ["b", "a", "c"]);
        assert!(table.has_column("c"));
        assert!(!table.has_column("d"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn sparse_rows_are_filled_with_null() {
        let table = Table::from_rows(vec![
            row(json!({"text": "a"})),
            row(json!({"caption": "b"})),
        ]);
        assert_eq!(table.row(0).unwrap()["caption"], Value::Null);
        assert_eq!(table.row(1).unwrap()["text"], Value::Null);
        assert_eq!(table.row(1).unwrap()["caption"], json!("b"));
        assert!(table.rows().iter().all(|r| r.len() == 2));
    }

    #[test]
    fn concat_preserves_row_order() {
        let first = Table::from_rows(vec![row(json!({"id": 1}))]);
        let second = Table::from_rows(vec![row(json!({"id": 2})), row(json!({"id": 3}))]);
        let joined = Table::concat([first, second]);
        let ids: Vec<&Value> = joined.rows().iter().map(|r| &r["id"]).collect();
        assert_eq!(ids, [&json!(1), &json!(2), &json!(3)]);
    }

    #[test]
    fn value_to_text_renders_scalars_and_nested_values() {
        assert_eq!(value_to_text(&json!(null)), "");
        assert_eq!(value_to_text(&json!("  keep  ")), "  keep  ");
        assert_eq!(value_to_text(&json!(4.5)), "4.5");
        assert_eq!(value_to_text(&json!(true)), "true");
        assert_eq!(value_to_text(&json!(["a", 1])), r#"["a",1]"#);
    }
}
