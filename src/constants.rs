/// Defaults and accepted ranges for per-call batch inputs.
pub mod config {
    /// Default column read in single-field mode.
    pub const DEFAULT_PROMPT_FIELD: &str = "text";
    /// Row limit meaning "every remaining row".
    pub const ALL_ROWS: i64 = -1;
    /// Default row limit.
    pub const DEFAULT_NUM_ROWS: i64 = ALL_ROWS;
    /// Largest accepted row limit.
    pub const MAX_NUM_ROWS: i64 = 10_000;
    /// Largest accepted start row.
    pub const MAX_START_ROW: usize = 10_000;
    /// Largest accepted externally forced magic number.
    pub const MAX_MAGIC_NUMBER: u64 = 9_999_999;
    /// Default field delimiter, as typed by users: a backslash followed by `n`.
    pub const DEFAULT_DELIMITER: &str = "\\n";
}

/// Limits applied when parsing row filters.
pub mod filter {
    /// Deepest accepted nesting of `not` and parentheses.
    pub const MAX_FILTER_DEPTH: usize = 64;
    /// Most `and` / `or` / `not` operators accepted in one filter.
    pub const MAX_FILTER_OPERATORS: usize = 256;
}

/// Constants used by metadata persistence.
pub mod metadata {
    /// Subdirectory of the output root holding metadata files.
    pub const METADATA_SUBFOLDER: &str = "dataset_batch_metadata";
    /// Metadata file name prefix.
    pub const METADATA_FILE_PREFIX: &str = "metadata_";
    /// Metadata file extension.
    pub const METADATA_FILE_EXTENSION: &str = "jsonl";
    /// Timestamp format shared by metadata file names and output names.
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
}

/// Constants used by host notifications.
pub mod events {
    /// Event published after each processed row.
    pub const ROW_PROCESSED_EVENT: &str = "dataset_row_processed";
}

/// Constants used by dataset resolution.
pub mod source {
    /// Extension of line-delimited JSON files.
    pub const JSONL_EXTENSION: &str = "jsonl";
    /// Alternate extension accepted for snapshot shards.
    pub const NDJSON_EXTENSION: &str = "ndjson";
    /// Extension of delimited text files.
    pub const CSV_EXTENSION: &str = "csv";
    /// Extension of parquet shards (snapshot directories and hub datasets only).
    pub const PARQUET_EXTENSION: &str = "parquet";
    /// Extension of Arrow IPC shards (snapshot directories and hub datasets only).
    pub const ARROW_EXTENSION: &str = "arrow";
    /// Canonical split loaded from hub datasets before falling back to the unsplit table.
    pub const TRAIN_SPLIT: &str = "train";
    /// Environment variable consulted for the CLI output root.
    pub const OUTPUT_DIR_ENV: &str = "DATASET_BATCH_OUTPUT_DIR";
    /// Output root used when neither an argument nor the environment provides one.
    pub const DEFAULT_OUTPUT_DIR: &str = "output";
}
