//! Per-row metadata records and their append-only JSONL files.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::constants::metadata::{
    METADATA_FILE_EXTENSION, METADATA_FILE_PREFIX, METADATA_SUBFOLDER, TIMESTAMP_FORMAT,
};
use crate::errors::BatchError;
use crate::table::Row;
use crate::types::{MagicNumber, OutputName, RowIndex, RowSeed};

/// Shape of each written metadata line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MetadataLayout {
    /// `{"fixed": {...}, "row": {...}}`; row columns never shadow fixed fields.
    #[default]
    Nested,
    /// Fixed fields with every row column merged in last, so row columns win on collision.
    Flat,
}

/// Fields the cursor records for every processed row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    /// Table index of the visited row.
    pub row_index: RowIndex,
    /// Seed returned to the host.
    pub seed: RowSeed,
    /// Magic number before this row was counted.
    pub magic_number: MagicNumber,
    /// `row_<row_index>_<seed>_<timestamp>`.
    pub output_filename: OutputName,
    /// Final prompt text.
    pub prompt: String,
    /// Raw mixed-fields JSON as supplied, if any.
    pub mixed_fields_config: Option<String>,
}

/// One processed row: fixed fields plus the source row's columns.
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataRecord {
    /// Fixed fields.
    pub fields: RecordFields,
    /// Every column of the visited row.
    pub row: Row,
}

impl MetadataRecord {
    /// Render the record in `layout`.
    pub fn to_json(&self, layout: MetadataLayout) -> Result<Value, BatchError> {
        let fixed = serde_json::to_value(&self.fields)?;
        let row: Map<String, Value> = self
            .row
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(match layout {
            MetadataLayout::Nested => {
                let mut nested = Map::new();
                nested.insert("fixed".to_string(), fixed);
                nested.insert("row".to_string(), Value::Object(row));
                Value::Object(nested)
            }
            MetadataLayout::Flat => {
                let mut flat = match fixed {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                flat.extend(row);
                Value::Object(flat)
            }
        })
    }
}

/// Timestamp used in output names and metadata file names.
pub fn run_timestamp<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// Output name recorded for a processed row.
pub fn output_name(row_index: RowIndex, seed: RowSeed, timestamp: &str) -> OutputName {
    format!("row_{row_index}_{seed}_{timestamp}")
}

/// Appends metadata lines under `<output root>/dataset_batch_metadata/`.
///
/// Files are opened, appended, and closed on every record, so a crash loses at
/// most the record being written.
#[derive(Clone, Debug)]
pub struct MetadataWriter {
    dir: PathBuf,
    layout: MetadataLayout,
}

impl MetadataWriter {
    /// Writer for metadata under `output_root`.
    pub fn new(output_root: impl AsRef<Path>, layout: MetadataLayout) -> Self {
        Self {
            dir: output_root.as_ref().join(METADATA_SUBFOLDER),
            layout,
        }
    }

    /// Metadata directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Line layout.
    pub fn layout(&self) -> MetadataLayout {
        self.layout
    }

    /// Create the metadata directory if needed. Safe to call repeatedly.
    pub fn ensure_dir(&self) -> Result<(), BatchError> {
        fs::create_dir_all(&self.dir).map_err(|source| BatchError::Metadata {
            path: self.dir.clone(),
            source,
        })
    }

    /// Metadata file for a run timestamp.
    pub fn file_path(&self, timestamp: &str) -> PathBuf {
        self.dir.join(format!(
            "{METADATA_FILE_PREFIX}{timestamp}.{METADATA_FILE_EXTENSION}"
        ))
    }

    /// Append one record as a JSON line and return the file written.
    pub fn append(&self, record: &MetadataRecord, timestamp: &str) -> Result<PathBuf, BatchError> {
        self.ensure_dir()?;
        let mut line = serde_json::to_string(&record.to_json(self.layout)?)?;
        line.push('\n');

        let path = self.file_path(timestamp);
        let io_err = |source| BatchError::Metadata {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        file.write_all(line.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        Ok(path)
    }
}

/// Read every JSON line of a metadata file.
pub fn read_metadata_file(path: &Path) -> Result<Vec<Value>, BatchError> {
    let io_err = |source| BatchError::Metadata {
        path: path.to_path_buf(),
        source,
    };
    let file = fs::File::open(path).map_err(io_err)?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}
