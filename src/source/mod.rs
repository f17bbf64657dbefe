//! Dataset resolution: turning a host-supplied locator into a [`Table`].
//!
//! Ownership model:
//! - `DatasetLoader` is the cursor-facing interface; the cursor owns one boxed loader.
//! - `FsDatasetLoader` dispatches on what the locator names (directory, file, hub id).
//! - Format readers (`jsonl`, `delimited`, `parquet`, `ipc`) each turn one file into a table
//!   and are shared by the single-file, snapshot, and hub paths.

use std::path::Path;
use std::time::Instant;

use tracing::info;

use crate::constants::source::{
    ARROW_EXTENSION, CSV_EXTENSION, JSONL_EXTENSION, NDJSON_EXTENSION, PARQUET_EXTENSION,
};
use crate::errors::LoadError;
use crate::table::Table;

/// Delimited-text reader.
pub mod delimited;
/// Hugging Face hub datasets.
#[cfg(feature = "huggingface")]
pub mod huggingface;
/// Arrow IPC shard reader.
#[cfg(feature = "huggingface")]
pub mod ipc;
/// Line-delimited JSON reader.
pub mod jsonl;
/// Parquet shard reader.
#[cfg(feature = "huggingface")]
pub mod parquet;
/// Pre-materialized snapshot directories.
pub mod snapshot;

/// Cursor-facing dataset loader.
///
/// Implementations turn a locator into a fully materialized table. Loads are not
/// retried by callers; a failure is reported once per call.
pub trait DatasetLoader: Send + Sync {
    /// Load the table named by `locator`.
    fn load(&self, locator: &str) -> Result<Table, LoadError>;
}

/// Default loader for local directories, local files, and hub dataset ids.
#[derive(Clone, Debug, Default)]
pub struct FsDatasetLoader;

impl FsDatasetLoader {
    /// Create the default loader.
    pub fn new() -> Self {
        Self
    }
}

impl DatasetLoader for FsDatasetLoader {
    fn load(&self, locator: &str) -> Result<Table, LoadError> {
        let started = Instant::now();
        let path = Path::new(locator);
        let table = if path.is_dir() {
            info!(
                "[dataset_batch:source] loading snapshot directory {}",
                path.display()
            );
            snapshot::read_snapshot(path)?
        } else if path.is_file() {
            let ext = lowercase_extension(path).unwrap_or_default();
            match ext.as_str() {
                JSONL_EXTENSION => jsonl::read_jsonl(path)?,
                CSV_EXTENSION => delimited::read_csv(path)?,
                _ => return Err(LoadError::UnsupportedFormat(format!(".{ext}"))),
            }
        } else if looks_local(path) {
            return Err(LoadError::NotFound(locator.to_string()));
        } else {
            load_remote(locator)?
        };
        info!(
            "[dataset_batch:source] loaded '{}' in {:.2}s (rows={}, columns={})",
            locator,
            started.elapsed().as_secs_f64(),
            table.len(),
            table.columns().len()
        );
        Ok(table)
    }
}

#[cfg(feature = "huggingface")]
fn load_remote(locator: &str) -> Result<Table, LoadError> {
    if locator.trim().is_empty() {
        return Err(LoadError::NotFound(locator.to_string()));
    }
    huggingface::load_hub_dataset(locator)
}

#[cfg(not(feature = "huggingface"))]
fn load_remote(locator: &str) -> Result<Table, LoadError> {
    if locator.trim().is_empty() {
        return Err(LoadError::NotFound(locator.to_string()));
    }
    Err(LoadError::RemoteUnavailable(locator.to_string()))
}

/// Loader serving a fixed table regardless of locator, for hosts that load data themselves.
#[derive(Clone, Debug)]
pub struct InMemoryLoader {
    table: Table,
}

impl InMemoryLoader {
    /// Serve `table` for every load.
    pub fn new(table: Table) -> Self {
        Self { table }
    }
}

impl DatasetLoader for InMemoryLoader {
    fn load(&self, _locator: &str) -> Result<Table, LoadError> {
        Ok(self.table.clone())
    }
}

/// File formats accepted as shards of snapshot directories and hub datasets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShardFormat {
    /// Line-delimited JSON objects.
    Jsonl,
    /// Delimited text with a header row.
    Csv,
    /// Parquet (requires the `huggingface` feature).
    Parquet,
    /// Arrow IPC, as in `save_to_disk` snapshots (requires the `huggingface` feature).
    Arrow,
}

impl ShardFormat {
    /// Detect the shard format from a file extension.
    ///
    /// Parquet and Arrow are only recognized when the crate can read them.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = lowercase_extension(path)?;
        match ext.as_str() {
            JSONL_EXTENSION | NDJSON_EXTENSION => Some(Self::Jsonl),
            CSV_EXTENSION => Some(Self::Csv),
            PARQUET_EXTENSION if cfg!(feature = "huggingface") => Some(Self::Parquet),
            ARROW_EXTENSION if cfg!(feature = "huggingface") => Some(Self::Arrow),
            _ => None,
        }
    }

    /// Read one shard file into a table.
    pub fn read(self, path: &Path) -> Result<Table, LoadError> {
        match self {
            Self::Jsonl => jsonl::read_jsonl(path),
            Self::Csv => delimited::read_csv(path),
            #[cfg(feature = "huggingface")]
            Self::Parquet => parquet::read_parquet(path),
            #[cfg(feature = "huggingface")]
            Self::Arrow => ipc::read_arrow(path),
            #[cfg(not(feature = "huggingface"))]
            Self::Parquet => Err(LoadError::UnsupportedFormat(format!(
                ".{PARQUET_EXTENSION}"
            ))),
            #[cfg(not(feature = "huggingface"))]
            Self::Arrow => Err(LoadError::UnsupportedFormat(format!(".{ARROW_EXTENSION}"))),
        }
    }
}

/// Absolute, dot-relative, or data-file paths never name hub datasets.
fn looks_local(path: &Path) -> bool {
    path.is_absolute()
        || path.starts_with(".")
        || path.starts_with("..")
        || ShardFormat::from_path(path).is_some()
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
