use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::constants::config::{
    ALL_ROWS, DEFAULT_DELIMITER, DEFAULT_NUM_ROWS, DEFAULT_PROMPT_FIELD, MAX_MAGIC_NUMBER,
    MAX_NUM_ROWS, MAX_START_ROW,
};
use crate::errors::BatchError;
use crate::filter::Filter;
use crate::types::{ColumnName, FilterSource, MagicNumber, SourceLocator};

/// Per-call inputs supplied by the host on every `advance`.
///
/// Only the values present when a selection is computed (first call, and the
/// first call after a batch is exhausted) shape the batch; changes made while a
/// batch is in progress take effect once it is exhausted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Directory, local file, or hub dataset id.
    pub dataset_path: SourceLocator,
    /// Column read in single-field mode.
    pub prompt_field: ColumnName,
    /// Rows per batch; `-1` means every remaining row.
    pub num_rows: i64,
    /// First row of the batch before the magic-number offset.
    pub start_row: usize,
    /// Seed for the shuffled visiting order.
    pub random_seed: u64,
    /// Visit rows in a seeded permutation instead of table order.
    pub shuffle: bool,
    /// Separator between prompt segments, with backslash escapes.
    pub delimiter: String,
    /// Externally forced magic number, applied when the next selection is computed.
    pub magic_number: Option<MagicNumber>,
    /// Text prepended to every prompt.
    pub text_input: Option<String>,
    /// JSON list of `{"field": ..., "filter": ...}` entries enabling mixed-fields mode.
    pub mixed_fields_config_json: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            dataset_path: String::new(),
            prompt_field: DEFAULT_PROMPT_FIELD.to_string(),
            num_rows: DEFAULT_NUM_ROWS,
            start_row: 0,
            random_seed: 0,
            shuffle: false,
            delimiter: DEFAULT_DELIMITER.to_string(),
            magic_number: None,
            text_input: None,
            mixed_fields_config_json: None,
        }
    }
}

impl BatchConfig {
    /// Create a config with host defaults for `dataset_path`.
    pub fn new(dataset_path: impl Into<SourceLocator>) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            ..Self::default()
        }
    }

    /// Override the single-field prompt column.
    pub fn with_prompt_field(mut self, prompt_field: impl Into<ColumnName>) -> Self {
        self.prompt_field = prompt_field.into();
        self
    }

    /// Override the row limit (`-1` for all rows).
    pub fn with_num_rows(mut self, num_rows: i64) -> Self {
        self.num_rows = num_rows;
        self
    }

    /// Override the start row.
    pub fn with_start_row(mut self, start_row: usize) -> Self {
        self.start_row = start_row;
        self
    }

    /// Enable or disable seeded shuffling.
    pub fn with_shuffle(mut self, shuffle: bool, random_seed: u64) -> Self {
        self.shuffle = shuffle;
        self.random_seed = random_seed;
        self
    }

    /// Override the segment delimiter.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Force the magic number used by the next selection.
    pub fn with_magic_number(mut self, magic_number: MagicNumber) -> Self {
        self.magic_number = Some(magic_number);
        self
    }

    /// Prepend `text` to every prompt.
    pub fn with_text_input(mut self, text: impl Into<String>) -> Self {
        self.text_input = Some(text.into());
        self
    }

    /// Enable mixed-fields mode with a JSON entry list.
    pub fn with_mixed_fields(mut self, json: impl Into<String>) -> Self {
        self.mixed_fields_config_json = Some(json.into());
        self
    }

    /// Check host input ranges.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.num_rows < ALL_ROWS || self.num_rows > MAX_NUM_ROWS {
            return Err(BatchError::Configuration(format!(
                "num_rows must be -1 or between 0 and {MAX_NUM_ROWS}, got {}",
                self.num_rows
            )));
        }
        if self.start_row > MAX_START_ROW {
            return Err(BatchError::Configuration(format!(
                "start_row must be at most {MAX_START_ROW}, got {}",
                self.start_row
            )));
        }
        if let Some(magic) = self.magic_number
            && magic > MAX_MAGIC_NUMBER
        {
            return Err(BatchError::Configuration(format!(
                "magic_number must be at most {MAX_MAGIC_NUMBER}, got {magic}"
            )));
        }
        Ok(())
    }

    /// Delimiter with `\n`, `\t`, `\r`, and `\\` escapes resolved.
    pub fn delimiter_text(&self) -> String {
        unescape(&self.delimiter)
    }

    /// Non-empty text prefix, if any.
    pub fn text_prefix(&self) -> Option<&str> {
        self.text_input.as_deref().filter(|text| !text.is_empty())
    }

    /// Raw mixed-fields JSON when mixed-fields mode is enabled.
    pub fn mixed_fields_source(&self) -> Option<&str> {
        self.mixed_fields_config_json
            .as_deref()
            .filter(|json| !json.trim().is_empty())
    }

    /// Parse and compile the mixed-fields entries; `None` selects single-field mode.
    pub fn mixed_fields(&self) -> Result<Option<Vec<MixedFieldPlan>>, BatchError> {
        self.mixed_fields_source()
            .map(parse_mixed_fields)
            .transpose()
    }
}

/// One raw mixed-fields entry as written by users.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct MixedField {
    /// Column to read. Entries without one are skipped.
    #[serde(default)]
    pub field: Option<ColumnName>,
    /// Filter choosing which row to read the column from.
    #[serde(default)]
    pub filter: Option<FilterSource>,
}

/// A mixed-fields entry with its filter compiled.
#[derive(Clone, Debug, PartialEq)]
pub struct MixedFieldPlan {
    /// Column to read.
    pub field: ColumnName,
    /// Compiled filter; `None` reads the row being visited.
    pub filter: Option<Filter>,
}

/// Parse a mixed-fields JSON list and compile each entry's filter.
pub fn parse_mixed_fields(json: &str) -> Result<Vec<MixedFieldPlan>, BatchError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|err| BatchError::MalformedConfig(format!("invalid JSON: {err}")))?;
    let Value::Array(entries) = value else {
        return Err(BatchError::MalformedConfig(
            "mixed_fields_config must be a JSON list of field configurations".to_string(),
        ));
    };

    let mut plans = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.into_iter().enumerate() {
        let entry: MixedField = serde_json::from_value(entry)
            .map_err(|err| BatchError::MalformedConfig(format!("entry {idx}: {err}")))?;
        let Some(field) = entry.field.filter(|field| !field.is_empty()) else {
            warn!(
                "[dataset_batch:config] skipping mixed field entry {} due to missing 'field' name",
                idx
            );
            continue;
        };
        let filter = match entry.filter.as_deref().map(str::trim) {
            Some(source) if !source.is_empty() => Some(Filter::parse(source).map_err(|err| {
                BatchError::MalformedConfig(format!("entry {idx} ('{field}'): {err}"))
            })?),
            _ => None,
        };
        plans.push(MixedFieldPlan { field, filter });
    }
    Ok(plans)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
