use std::io::Read;
use std::path::Path;

use serde_json::{Number, Value};

use crate::errors::LoadError;
use crate::table::{Row, Table};

/// Read a CSV file whose first record names the columns.
pub fn read_csv(path: &Path) -> Result<Table, LoadError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    collect_rows(reader)
}

/// Parse CSV text from any reader.
pub fn parse_csv<R: Read>(input: R) -> Result<Table, LoadError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    collect_rows(reader)
}

fn collect_rows<R: Read>(mut reader: csv::Reader<R>) -> Result<Table, LoadError> {
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Row::with_capacity(headers.len());
        for (idx, column) in headers.iter().enumerate() {
            let cell = record.get(idx).unwrap_or_default();
            row.insert(column.to_string(), typed_cell(cell));
        }
        rows.push(row);
    }
    Ok(Table::from_rows(rows))
}

/// Infer a cell type the way data-frame readers do: empty is null, then integer, float, string.
fn typed_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = cell.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Ok(float) = cell.parse::<f64>()
        && let Some(number) = Number::from_f64(float)
    {
        return Value::Number(number);
    }
    Value::String(cell.to_string())
}
