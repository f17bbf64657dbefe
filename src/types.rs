/// Column name in a loaded table.
/// Examples: `text`, `dense_caption`, `style_caption`
pub type ColumnName = String;
/// Dataset locator passed by the host: a directory, a local file, or a hub dataset id.
/// Examples: `/data/captions.jsonl`, `/data/snapshot`, `user/captions`
pub type SourceLocator = String;
/// Position of a row in a loaded table.
pub type RowIndex = usize;
/// Count of rows consumed so far, added to `start_row` for the next selection.
pub type MagicNumber = u64;
/// Identity of one cursor instance, reported in emitted events.
pub type NodeId = u64;
/// Per-row seed returned to the host alongside the prompt.
pub type RowSeed = u32;
/// Name of an event published to the host.
/// Example: `dataset_row_processed`
pub type EventName = String;
/// Raw filter expression text from a mixed-fields entry.
/// Example: `example["style"] == "anime" and score >= 4`
pub type FilterSource = String;
/// Generated output name recorded in metadata.
/// Example: `row_12_3735928559_20250101-120000`
pub type OutputName = String;
