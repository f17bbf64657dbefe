//! The batch cursor: one row per `advance` call, with persisted metadata and host events.
//!
//! Lifecycle:
//! - `Empty`: no dataset handle. The next call loads the dataset once and keeps it.
//! - `Loaded` / `Advancing`: a selection exists and rows are handed out in order.
//! - `Exhausted`: the selection was used up (or came out empty). The next call
//!   computes a fresh selection from the config supplied with that call; if the
//!   fresh selection is empty, the call returns the empty output and resets the
//!   magic number to 0.
//!
//! The selection is only recomputed while it is empty, so changing `start_row`,
//! `num_rows`, or `shuffle` in the middle of a batch has no effect until the
//! batch is exhausted.
//!
//! A cursor is not synchronized; hosts must not share one across concurrent runs.

use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info};

use crate::config::BatchConfig;
use crate::errors::BatchError;
use crate::events::{EventPublisher, LogPublisher, RowProcessedEvent};
use crate::metadata::{
    MetadataLayout, MetadataRecord, MetadataWriter, RecordFields, output_name, run_timestamp,
};
use crate::prompt::{finalize_prompt, mixed_fields_prompt, single_field_prompt};
use crate::selection::SelectionPlan;
use crate::source::{DatasetLoader, FsDatasetLoader};
use crate::table::Table;
use crate::types::{MagicNumber, NodeId, RowIndex, RowSeed};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Construction-time cursor settings.
#[derive(Clone, Debug)]
pub struct CursorOptions {
    /// Root under which the metadata subdirectory is created.
    pub output_root: PathBuf,
    /// Metadata line layout.
    pub layout: MetadataLayout,
    /// Seed for per-row seeds and filter draws; `None` seeds from the OS.
    pub rng_seed: Option<u64>,
    /// Identity reported in events; `None` assigns a process-unique id.
    pub node_id: Option<NodeId>,
}

impl CursorOptions {
    /// Options writing metadata under `output_root`.
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            layout: MetadataLayout::default(),
            rng_seed: None,
            node_id: None,
        }
    }

    /// Override the metadata layout.
    pub fn with_layout(mut self, layout: MetadataLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Make per-row seeds and filter draws reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Fix the node id reported in events.
    pub fn with_node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }
}

/// Result of one `advance` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchOutput {
    /// Prompt text; empty when there was nothing to do.
    pub prompt: String,
    /// Per-row seed; 0 when there was nothing to do.
    pub seed: RowSeed,
}

impl BatchOutput {
    /// The `("", 0)` output returned when no row was processed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True for the empty output.
    pub fn is_empty(&self) -> bool {
        self.prompt.is_empty() && self.seed == 0
    }

    /// `(prompt, seed)` as returned to graph hosts.
    pub fn into_tuple(self) -> (String, RowSeed) {
        (self.prompt, self.seed)
    }
}

/// Coarse cursor state derived from [`CursorState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorPhase {
    /// No dataset handle yet.
    Empty,
    /// Selection computed, no row handed out yet.
    Loaded,
    /// Part of the selection handed out.
    Advancing,
    /// Handle kept, selection cleared; the next call selects again.
    Exhausted,
}

/// Mutable core of a cursor.
#[derive(Clone, Debug, Default)]
pub struct CursorState {
    dataset: Option<Arc<Table>>,
    selection: Vec<RowIndex>,
    pointer: usize,
    magic_number: MagicNumber,
    history: Vec<MetadataRecord>,
}

impl CursorState {
    /// Loaded table, if any.
    pub fn dataset(&self) -> Option<&Table> {
        self.dataset.as_deref()
    }

    /// Row indices of the active batch.
    pub fn selection(&self) -> &[RowIndex] {
        &self.selection
    }

    /// Position of the next row in [`selection`](Self::selection).
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Rows consumed so far.
    pub fn magic_number(&self) -> MagicNumber {
        self.magic_number
    }

    /// Rows left in the active batch.
    pub fn remaining(&self) -> usize {
        self.selection.len().saturating_sub(self.pointer)
    }

    /// Every metadata record produced by this cursor, in order.
    pub fn history(&self) -> &[MetadataRecord] {
        &self.history
    }

    /// Current phase.
    pub fn phase(&self) -> CursorPhase {
        if self.dataset.is_none() {
            CursorPhase::Empty
        } else if self.selection.is_empty() {
            CursorPhase::Exhausted
        } else if self.pointer == 0 {
            CursorPhase::Loaded
        } else {
            CursorPhase::Advancing
        }
    }
}

/// Stateful row iterator producing one `(prompt, seed)` per call.
pub struct BatchCursor {
    node_id: NodeId,
    loader: Box<dyn DatasetLoader>,
    publisher: Arc<dyn EventPublisher>,
    writer: MetadataWriter,
    rng: StdRng,
    state: CursorState,
}

impl BatchCursor {
    /// Cursor using the filesystem/hub loader and a logging publisher.
    pub fn new(options: CursorOptions) -> Self {
        let rng = match options.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            node_id: options
                .node_id
                .unwrap_or_else(|| NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)),
            loader: Box::new(FsDatasetLoader::new()),
            publisher: Arc::new(LogPublisher),
            writer: MetadataWriter::new(&options.output_root, options.layout),
            rng,
            state: CursorState::default(),
        }
    }

    /// Replace the dataset loader.
    pub fn with_loader(mut self, loader: Box<dyn DatasetLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Replace the event publisher.
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Identity reported in events.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Read-only view of the cursor state.
    pub fn state(&self) -> &CursorState {
        &self.state
    }

    /// Current phase.
    pub fn phase(&self) -> CursorPhase {
        self.state.phase()
    }

    /// Rows consumed so far.
    pub fn magic_number(&self) -> MagicNumber {
        self.state.magic_number
    }

    /// Every metadata record produced by this cursor.
    pub fn history(&self) -> &[MetadataRecord] {
        &self.state.history
    }

    /// Directory receiving metadata files.
    pub fn metadata_dir(&self) -> &Path {
        self.writer.dir()
    }

    /// Create the metadata directory ahead of the first row. Safe to call repeatedly.
    pub fn ensure_metadata_dir(&self) -> Result<(), BatchError> {
        self.writer.ensure_dir()
    }

    /// Drop the dataset handle, the selection, and the magic number. History is kept.
    pub fn reset(&mut self) {
        self.state.dataset = None;
        self.state.selection.clear();
        self.state.pointer = 0;
        self.state.magic_number = 0;
    }

    /// Process the next row.
    ///
    /// Returns the empty output when the dataset cannot be loaded (the cursor
    /// stays `Empty` so a corrected locator can succeed later) and when no rows
    /// are left. Configuration problems are returned as errors. On any error the
    /// cursor does not advance.
    pub fn advance(&mut self, config: &BatchConfig) -> Result<BatchOutput, BatchError> {
        config.validate()?;
        let mixed = config.mixed_fields()?;

        if self.state.dataset.is_none() {
            let table = match self.loader.load(&config.dataset_path) {
                Ok(table) => table,
                Err(source) => {
                    let err = BatchError::DatasetLoad {
                        locator: config.dataset_path.clone(),
                        source,
                    };
                    error!("[dataset_batch:cursor] error loading dataset: {err}");
                    return Ok(BatchOutput::empty());
                }
            };
            if mixed.is_none() && !table.has_column(&config.prompt_field) {
                return Err(BatchError::MissingField {
                    field: config.prompt_field.clone(),
                    available: table.columns().to_vec(),
                });
            }
            self.state.dataset = Some(Arc::new(table));
            self.state.selection.clear();
            self.state.pointer = 0;
        }
        let Some(table) = self.state.dataset.clone() else {
            return Ok(BatchOutput::empty());
        };

        if self.state.selection.is_empty() {
            self.start_batch(config, table.len());
        }
        debug!(
            "[dataset_batch:cursor] advance called. magic_number={}, start_row={}, num_rows={}",
            self.state.magic_number, config.start_row, config.num_rows
        );

        let Some(&row_index) = self.state.selection.get(self.state.pointer) else {
            info!("[dataset_batch:cursor] dataset processing complete");
            self.state.magic_number = 0;
            self.state.pointer = 0;
            self.state.selection.clear();
            return Ok(BatchOutput::empty());
        };
        let row = table.row(row_index).ok_or(BatchError::RowOutOfRange {
            row_index,
            total: table.len(),
        })?;

        let seed: RowSeed = self.rng.random();
        let delimiter = config.delimiter_text();
        let body = match &mixed {
            Some(plans) => mixed_fields_prompt(&table, row, plans, &delimiter, &mut self.rng),
            None => single_field_prompt(&table, row, &config.prompt_field)?,
        };
        let prompt = finalize_prompt(&body, config.text_prefix(), &delimiter);

        let timestamp = run_timestamp(&Local::now());
        let magic_number = self.state.magic_number;
        let record = MetadataRecord {
            fields: RecordFields {
                row_index,
                seed,
                magic_number,
                output_filename: output_name(row_index, seed, &timestamp),
                prompt: prompt.clone(),
                mixed_fields_config: config.mixed_fields_config_json.clone(),
            },
            row: row.clone(),
        };
        let event = serde_json::to_value(RowProcessedEvent {
            node_id: self.node_id,
            magic_number: magic_number + 1,
            row_index,
        })?;

        info!(
            "[dataset_batch:cursor] processing row {} with seed {}",
            row_index, seed
        );
        let path = self.writer.append(&record, &timestamp)?;
        info!(
            "[dataset_batch:metadata] metadata for row {} saved to {}",
            row_index,
            path.display()
        );
        self.state.history.push(record);
        self.publisher.publish(RowProcessedEvent::NAME, &event);

        self.state.pointer += 1;
        self.state.magic_number = magic_number + 1;
        if self.state.pointer >= self.state.selection.len() {
            self.state.pointer = 0;
            self.state.selection.clear();
            info!(
                "[dataset_batch:cursor] batch complete. magic_number updated to {}",
                self.state.magic_number
            );
        }

        Ok(BatchOutput { prompt, seed })
    }

    fn start_batch(&mut self, config: &BatchConfig, total: usize) {
        if let Some(forced) = config.magic_number {
            self.state.magic_number = forced;
        }
        let plan = SelectionPlan {
            total,
            start_row: config.start_row,
            num_rows: config.num_rows,
            shuffle: config.shuffle,
            random_seed: config.random_seed,
            magic_number: self.state.magic_number,
        };
        self.state.selection = plan.select();
        self.state.pointer = 0;
        info!(
            "[dataset_batch:cursor] selected {} of {} rows (effective_start={}, shuffle={})",
            self.state.selection.len(),
            total,
            plan.effective_start(),
            config.shuffle
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LoadError;
    use crate::events::ChannelPublisher;
    use crate::source::InMemoryLoader;
    use crate::table::row_from_object;
    use serde_json::{Value, json};
    use std::sync::atomic::AtomicUsize;
    use tempfile::{TempDir, tempdir};

    fn table(n: usize) -> Table {
        Table::from_rows(
            (0..n)
                .map(|idx| {
                    let Value::Object(map) = json!({"text": format!("row {idx}"), "id": idx})
                    else {
                        unreachable!()
                    };
                    row_from_object(map)
                })
                .collect(),
        )
    }

    fn cursor(n: usize) -> (BatchCursor, TempDir) {
        let temp = tempdir().unwrap();
        let cursor = BatchCursor::new(CursorOptions::new(temp.path()).with_rng_seed(5))
            .with_loader(Box::new(InMemoryLoader::new(table(n))));
        (cursor, temp)
    }

    struct CountingLoader {
        loads: Arc<AtomicUsize>,
        fail_first: bool,
    }

    impl DatasetLoader for CountingLoader {
        fn load(&self, _locator: &str) -> Result<Table, LoadError> {
            let previous = self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && previous == 0 {
                return Err(LoadError::NotFound("first".into()));
            }
            Ok(table(3))
        }
    }

    #[test]
    fn phases_follow_the_batch_lifecycle() {
        let (mut cursor, _temp) = cursor(2);
        let config = BatchConfig::new("mem");
        assert_eq!(cursor.phase(), CursorPhase::Empty);

        cursor.advance(&config).unwrap();
        assert_eq!(cursor.phase(), CursorPhase::Advancing);
        assert_eq!(cursor.state().remaining(), 1);

        cursor.advance(&config).unwrap();
        assert_eq!(cursor.phase(), CursorPhase::Exhausted);
        assert_eq!(cursor.magic_number(), 2);

        assert!(cursor.advance(&config).unwrap().is_empty());
        assert_eq!(cursor.magic_number(), 0);
        assert_eq!(cursor.phase(), CursorPhase::Exhausted);
    }

    #[test]
    fn loads_once_and_retries_after_load_failure() {
        let temp = tempdir().unwrap();
        let loads = Arc::new(AtomicUsize::new(0));
        let mut cursor = BatchCursor::new(CursorOptions::new(temp.path()).with_rng_seed(1))
            .with_loader(Box::new(CountingLoader {
                loads: Arc::clone(&loads),
                fail_first: true,
            }));
        let config = BatchConfig::new("mem");

        assert_eq!(cursor.advance(&config).unwrap(), BatchOutput::empty());
        assert_eq!(cursor.phase(), CursorPhase::Empty);
        assert!(!cursor.metadata_dir().exists());

        for _ in 0..5 {
            cursor.advance(&config).unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_field_is_raised_without_keeping_the_handle() {
        let (mut cursor, _temp) = cursor(2);
        let err = cursor
            .advance(&BatchConfig::new("mem").with_prompt_field("caption"))
            .unwrap_err();
        assert!(matches!(err, BatchError::MissingField { ref field, .. } if field == "caption"));
        assert_eq!(cursor.phase(), CursorPhase::Empty);

        let output = cursor.advance(&BatchConfig::new("mem")).unwrap();
        assert_eq!(output.prompt, "row 0");
    }

    #[test]
    fn malformed_mixed_fields_abort_without_advancing() {
        let (mut cursor, _temp) = cursor(3);
        let config = BatchConfig::new("mem");
        cursor.advance(&config).unwrap();

        let err = cursor
            .advance(&config.clone().with_mixed_fields("{\"field\": \"text\"}"))
            .unwrap_err();
        assert!(matches!(err, BatchError::MalformedConfig(_)));
        assert_eq!(cursor.magic_number(), 1);
        assert_eq!(cursor.state().pointer(), 1);
        assert_eq!(cursor.history().len(), 1);
    }

    #[test]
    fn config_changes_wait_for_exhaustion() {
        let (mut cursor, _temp) = cursor(10);
        let first = BatchConfig::new("mem").with_num_rows(2);
        assert_eq!(cursor.advance(&first).unwrap().prompt, "row 0");

        let changed = BatchConfig::new("mem").with_num_rows(5).with_start_row(1);
        assert_eq!(cursor.advance(&changed).unwrap().prompt, "row 1");
        assert_eq!(cursor.phase(), CursorPhase::Exhausted);

        // start_row 1 + magic 2
        assert_eq!(cursor.advance(&changed).unwrap().prompt, "row 3");
        assert_eq!(cursor.state().selection(), &[3, 4, 5, 6, 7]);
    }

    #[test]
    fn forced_magic_number_applies_at_selection_time() {
        let (mut cursor, _temp) = cursor(10);
        let config = BatchConfig::new("mem").with_magic_number(7);
        assert_eq!(cursor.advance(&config).unwrap().prompt, "row 7");
        assert_eq!(cursor.magic_number(), 8);
        // Ignored mid-batch.
        assert_eq!(cursor.advance(&config).unwrap().prompt, "row 8");
        assert_eq!(cursor.magic_number(), 9);
    }

    #[test]
    fn events_carry_node_id_and_post_increment_magic() {
        let temp = tempdir().unwrap();
        let (publisher, receiver) = ChannelPublisher::new();
        let mut cursor = BatchCursor::new(
            CursorOptions::new(temp.path())
                .with_rng_seed(9)
                .with_node_id(77),
        )
        .with_loader(Box::new(InMemoryLoader::new(table(3))))
        .with_publisher(Arc::new(publisher));

        let config = BatchConfig::new("mem").with_start_row(1);
        cursor.advance(&config).unwrap();
        cursor.advance(&config).unwrap();

        let events: Vec<RowProcessedEvent> = receiver
            .try_iter()
            .map(|(name, payload)| {
                assert_eq!(name, "dataset_row_processed");
                RowProcessedEvent::from_payload(&payload).unwrap()
            })
            .collect();
        assert_eq!(
            events,
            vec![
                RowProcessedEvent {
                    node_id: 77,
                    magic_number: 1,
                    row_index: 1
                },
                RowProcessedEvent {
                    node_id: 77,
                    magic_number: 2,
                    row_index: 2
                },
            ]
        );
    }

    #[test]
    fn node_ids_are_unique_per_instance() {
        let temp = tempdir().unwrap();
        let a = BatchCursor::new(CursorOptions::new(temp.path()));
        let b = BatchCursor::new(CursorOptions::new(temp.path()));
        assert_ne!(a.node_id(), b.node_id());
    }

    #[test]
    fn reset_returns_to_empty_and_keeps_history() {
        let (mut cursor, _temp) = cursor(4);
        let config = BatchConfig::new("mem");
        cursor.advance(&config).unwrap();
        cursor.reset();
        assert_eq!(cursor.phase(), CursorPhase::Empty);
        assert_eq!(cursor.magic_number(), 0);
        assert_eq!(cursor.history().len(), 1);
        assert_eq!(cursor.advance(&config).unwrap().prompt, "row 0");
    }

    #[test]
    fn invalid_ranges_are_rejected_before_loading() {
        let (mut cursor, _temp) = cursor(4);
        let err = cursor
            .advance(&BatchConfig::new("mem").with_num_rows(-5))
            .unwrap_err();
        assert!(matches!(err, BatchError::Configuration(_)));
        assert_eq!(cursor.phase(), CursorPhase::Empty);
    }

    #[test]
    fn text_prefix_and_delimiter_shape_the_prompt() {
        let (mut cursor, _temp) = cursor(1);
        let config = BatchConfig::new("mem")
            .with_text_input("masterpiece")
            .with_delimiter(", ");
        assert_eq!(
            cursor.advance(&config).unwrap().prompt,
            "masterpiece, row 0"
        );
    }
}
