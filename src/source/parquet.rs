use std::fs::File;
use std::path::Path;

use parquet::file::reader::{FileReader, SerializedFileReader};
use serde_json::Value;

use crate::errors::LoadError;
use crate::table::{Table, row_from_object};

/// Read every row of a parquet file as JSON objects.
pub fn read_parquet(path: &Path) -> Result<Table, LoadError> {
    let file = File::open(path)?;
    let reader = SerializedFileReader::new(file).map_err(|err| {
        LoadError::Parquet(format!("failed reading parquet {}: {err}", path.display()))
    })?;
    let iter = reader.get_row_iter(None).map_err(|err| {
        LoadError::Parquet(format!("failed iterating parquet {}: {err}", path.display()))
    })?;

    let mut rows = Vec::new();
    for (position, row) in iter.enumerate() {
        let row = row.map_err(|err| {
            LoadError::Parquet(format!(
                "failed reading parquet row {} in {}: {err}",
                position,
                path.display()
            ))
        })?;
        if let Value::Object(object) = row.to_json_value() {
            rows.push(row_from_object(object));
        }
    }
    Ok(Table::from_rows(rows))
}
