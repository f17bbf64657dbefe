use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde_json::Value;
use tracing::warn;

use crate::errors::LoadError;
use crate::table::{Table, row_from_object};

/// Read a JSONL file, skipping lines that are not valid JSON objects.
pub fn read_jsonl(path: &Path) -> Result<Table, LoadError> {
    let file = File::open(path)?;
    parse_jsonl(BufReader::new(file), &path.display().to_string())
}

/// Parse line-delimited JSON objects from `reader`.
///
/// Blank lines are ignored. Malformed lines are logged and skipped; only I/O
/// failures abort the read. `label` names the input in log messages.
pub fn parse_jsonl<R: BufRead>(reader: R, label: &str) -> Result<Table, LoadError> {
    let mut rows = Vec::new();
    for (line_idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(Value::Object(object)) => rows.push(row_from_object(object)),
            Ok(other) => warn!(
                "[dataset_batch:source] skipping non-object JSON line {} in {}: {}",
                line_idx + 1,
                label,
                json_kind(&other)
            ),
            Err(err) => warn!(
                "[dataset_batch:source] error decoding JSON line {} in {}: {err}",
                line_idx + 1,
                label
            ),
        }
    }
    Ok(Table::from_rows(rows))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
