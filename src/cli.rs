use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgGroup, Parser, ValueEnum, error::ErrorKind};
use tracing::{info, warn};

use crate::config::BatchConfig;
use crate::constants::config::{DEFAULT_DELIMITER, DEFAULT_NUM_ROWS, DEFAULT_PROMPT_FIELD};
use crate::constants::source::{DEFAULT_OUTPUT_DIR, OUTPUT_DIR_ENV};
use crate::cursor::{BatchCursor, CursorOptions};
use crate::events::{ChannelPublisher, RowProcessedEvent};
use crate::metadata::MetadataLayout;
use crate::types::{MagicNumber, NodeId};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LayoutArg {
    Nested,
    Flat,
}

impl From<LayoutArg> for MetadataLayout {
    fn from(value: LayoutArg) -> Self {
        match value {
            LayoutArg::Nested => MetadataLayout::Nested,
            LayoutArg::Flat => MetadataLayout::Flat,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "dataset-batch",
    disable_help_subcommand = true,
    about = "Walk a dataset one row per run",
    long_about = "Run the batch cursor repeatedly, queueing the next run whenever a row is processed, and print one `seed<TAB>prompt` line per row.",
    after_help = "The output directory is resolved in order by explicit arg, the DATASET_BATCH_OUTPUT_DIR environment variable, then ./output.",
    group(ArgGroup::new("mixed").args(["mixed_fields", "mixed_fields_file"]))
)]
struct BatchCli {
    #[arg(
        long,
        value_name = "PATH_OR_HUB_ID",
        help = "Snapshot directory, .jsonl/.csv file, or hub dataset id"
    )]
    dataset: String,
    #[arg(
        long = "prompt-field",
        default_value = DEFAULT_PROMPT_FIELD,
        help = "Column read in single-field mode"
    )]
    prompt_field: String,
    #[arg(
        long = "num-rows",
        default_value_t = DEFAULT_NUM_ROWS,
        allow_negative_numbers = true,
        help = "Rows per batch, -1 for every remaining row"
    )]
    num_rows: i64,
    #[arg(long = "start-row", default_value_t = 0, help = "First row of the batch")]
    start_row: usize,
    #[arg(long, default_value_t = 0, help = "Seed for the shuffled visiting order")]
    seed: u64,
    #[arg(long, help = "Visit rows in a seeded permutation")]
    shuffle: bool,
    #[arg(
        long,
        default_value = DEFAULT_DELIMITER,
        help = "Separator between prompt segments (\\n, \\t, \\r, \\\\ escapes allowed)"
    )]
    delimiter: String,
    #[arg(long = "magic-number", help = "Force the magic number of the first batch")]
    magic_number: Option<MagicNumber>,
    #[arg(long = "text-input", help = "Text prepended to every prompt")]
    text_input: Option<String>,
    #[arg(
        long = "mixed-fields",
        value_name = "JSON",
        help = "Mixed-fields entry list as inline JSON"
    )]
    mixed_fields: Option<String>,
    #[arg(
        long = "mixed-fields-file",
        value_name = "PATH",
        help = "Mixed-fields entry list read from a JSON file"
    )]
    mixed_fields_file: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "nested", help = "Metadata line layout")]
    layout: LayoutArg,
    #[arg(
        long = "output-dir",
        value_name = "DIR",
        help = "Root of the metadata output directory"
    )]
    output_dir: Option<PathBuf>,
    #[arg(
        long = "rng-seed",
        help = "Make per-row seeds and filter draws reproducible"
    )]
    rng_seed: Option<u64>,
    #[arg(long = "node-id", help = "Node id reported in events")]
    node_id: Option<NodeId>,
    #[arg(long = "max-runs", help = "Stop after this many queued runs")]
    max_runs: Option<usize>,
}

impl BatchCli {
    fn batch_config(&self) -> Result<BatchConfig, Box<dyn Error>> {
        let mut config = BatchConfig::new(self.dataset.clone())
            .with_prompt_field(self.prompt_field.clone())
            .with_num_rows(self.num_rows)
            .with_start_row(self.start_row)
            .with_shuffle(self.shuffle, self.seed)
            .with_delimiter(self.delimiter.clone());
        if let Some(magic) = self.magic_number {
            config = config.with_magic_number(magic);
        }
        if let Some(text) = &self.text_input {
            config = config.with_text_input(text.clone());
        }
        if let Some(json) = &self.mixed_fields {
            config = config.with_mixed_fields(json.clone());
        } else if let Some(path) = &self.mixed_fields_file {
            let json = fs::read_to_string(path)
                .map_err(|err| format!("failed reading {}: {err}", path.display()))?;
            config = config.with_mixed_fields(json);
        }
        Ok(config)
    }

    fn cursor_options(&self) -> CursorOptions {
        let mut options = CursorOptions::new(resolve_output_dir(self.output_dir.clone()))
            .with_layout(self.layout.into());
        if let Some(seed) = self.rng_seed {
            options = options.with_rng_seed(seed);
        }
        if let Some(node_id) = self.node_id {
            options = options.with_node_id(node_id);
        }
        options
    }
}

/// Explicit directory, then `DATASET_BATCH_OUTPUT_DIR`, then `./output`.
pub fn resolve_output_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(OUTPUT_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
}

/// Drive a cursor the way a graph host with auto-queueing would.
///
/// Every `dataset_row_processed` event for this cursor queues one more run with
/// the event's magic number fed back as the override. The loop stops on the
/// first run that publishes nothing, or when `--max-runs` is reached.
pub fn run_batch_cli<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let Some(cli) = parse_cli::<BatchCli, _>(
        std::iter::once("dataset-batch".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let mut config = cli.batch_config()?;
    let (publisher, receiver) = ChannelPublisher::new();
    let mut cursor = BatchCursor::new(cli.cursor_options()).with_publisher(Arc::new(publisher));
    cursor.ensure_metadata_dir()?;

    let mut runs = 0usize;
    loop {
        if let Some(max_runs) = cli.max_runs
            && runs >= max_runs
        {
            info!("[dataset_batch:cli] reached --max-runs {}", max_runs);
            break;
        }
        let output = cursor.advance(&config)?;
        runs += 1;

        let next = receiver
            .try_iter()
            .filter(|(name, _)| name == RowProcessedEvent::NAME)
            .filter_map(|(_, payload)| RowProcessedEvent::from_payload(&payload))
            .filter(|event| event.node_id == cursor.node_id())
            .last();
        let Some(event) = next else {
            if runs == 1 {
                warn!(
                    "[dataset_batch:cli] no rows processed from '{}'",
                    config.dataset_path
                );
            }
            break;
        };
        println!("{}\t{}", output.seed, output.prompt);
        config.magic_number = Some(event.magic_number);
    }

    info!(
        "[dataset_batch:cli] finished after {} run(s); metadata in {}",
        runs,
        cursor.metadata_dir().display()
    );
    Ok(())
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
