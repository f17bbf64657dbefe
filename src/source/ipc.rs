use std::fs::File;
use std::path::Path;

use arrow::array::RecordBatch;
use arrow::error::ArrowError;
use arrow::ipc::reader::{FileReader, StreamReader};
use arrow::json::ArrayWriter;
use serde_json::{Map, Value};

use crate::errors::LoadError;
use crate::table::Table;

/// Read an Arrow IPC shard, as written by `save_to_disk` snapshots.
///
/// Snapshot shards are IPC streams; files in the IPC file format are accepted too.
pub fn read_arrow(path: &Path) -> Result<Table, LoadError> {
    let arrow_err = |err: ArrowError| {
        LoadError::Arrow(format!("failed reading arrow {}: {err}", path.display()))
    };

    let batches: Vec<RecordBatch> = match StreamReader::try_new(File::open(path)?, None) {
        Ok(reader) => reader.collect::<Result<_, _>>().map_err(arrow_err)?,
        Err(_) => FileReader::try_new(File::open(path)?, None)
            .map_err(arrow_err)?
            .collect::<Result<_, _>>()
            .map_err(arrow_err)?,
    };

    let mut writer = ArrayWriter::new(Vec::new());
    for batch in &batches {
        writer.write(batch).map_err(arrow_err)?;
    }
    writer.finish().map_err(arrow_err)?;
    let buffer = writer.into_inner();
    if buffer.is_empty() {
        return Ok(Table::default());
    }
    let objects: Vec<Map<String, Value>> = serde_json::from_slice(&buffer)?;
    Ok(Table::from_json_objects(objects))
}
