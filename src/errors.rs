use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ColumnName, RowIndex, SourceLocator};

/// Error type for cursor configuration, dataset loading, and metadata persistence failures.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed loading dataset '{locator}': {source}")]
    DatasetLoad {
        locator: SourceLocator,
        #[source]
        source: LoadError,
    },
    #[error("prompt field '{field}' not found in dataset. Available fields: {available:?}")]
    MissingField {
        field: ColumnName,
        available: Vec<ColumnName>,
    },
    #[error("invalid mixed fields config: {0}")]
    MalformedConfig(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("selected row {row_index} is outside the loaded table ({total} rows)")]
    RowOutOfRange { row_index: RowIndex, total: usize },
    #[error("failed writing metadata to {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// Underlying cause of a dataset load failure.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("no dataset found at '{0}'")]
    NotFound(String),
    #[error("snapshot directory {} contains no data shards", .0.display())]
    EmptySnapshot(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "huggingface")]
    #[error("parquet error: {0}")]
    Parquet(String),
    #[cfg(feature = "huggingface")]
    #[error("arrow error: {0}")]
    Arrow(String),
    #[cfg(feature = "huggingface")]
    #[error("hub error: {0}")]
    Remote(String),
    #[error("remote dataset '{0}' requires the `huggingface` feature")]
    RemoteUnavailable(String),
}
