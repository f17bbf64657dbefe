#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Command-line host driver.
pub mod cli;
/// Per-call batch configuration and mixed-fields parsing.
pub mod config;
/// Centralized constants used across the cursor, sources, and metadata.
pub mod constants;
/// The stateful batch cursor.
pub mod cursor;
/// Notifications published to the host.
pub mod events;
/// Row filter predicates for mixed-fields entries.
pub mod filter;
/// Metadata records and JSONL persistence.
pub mod metadata;
/// Prompt synthesis.
pub mod prompt;
/// Batch row selection.
pub mod selection;
/// Dataset loaders and format readers.
pub mod source;
/// In-memory tables.
pub mod table;
/// Shared type aliases.
pub mod types;

mod errors;

pub use config::{BatchConfig, MixedField, MixedFieldPlan, parse_mixed_fields};
pub use cursor::{BatchCursor, BatchOutput, CursorOptions, CursorPhase, CursorState};
pub use errors::{BatchError, LoadError};
pub use events::{ChannelPublisher, EventPublisher, LogPublisher, NullPublisher, RowProcessedEvent};
pub use filter::{Filter, FilterError};
pub use metadata::{MetadataLayout, MetadataRecord, MetadataWriter, RecordFields};
pub use selection::SelectionPlan;
pub use source::{DatasetLoader, FsDatasetLoader, InMemoryLoader};
pub use table::{Row, Table};
pub use types::{
    ColumnName, EventName, FilterSource, MagicNumber, NodeId, OutputName, RowIndex, RowSeed,
    SourceLocator,
};
