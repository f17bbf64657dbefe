//! Prompt text for one visited row.

use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::warn;

use crate::config::MixedFieldPlan;
use crate::errors::BatchError;
use crate::table::{Row, Table, value_to_text};

/// Read `field` from `row`; a missing column is an error in single-field mode.
pub fn single_field_prompt(table: &Table, row: &Row, field: &str) -> Result<String, BatchError> {
    row.get(field)
        .map(value_to_text)
        .ok_or_else(|| BatchError::MissingField {
            field: field.to_string(),
            available: table.columns().to_vec(),
        })
}

/// Join one segment per mixed-fields entry.
///
/// Each entry reads its field from a random row matching its filter, or from
/// `current` when it has no filter or nothing matches. Missing fields read as
/// empty; segments are trimmed and empty ones dropped.
pub fn mixed_fields_prompt<R: Rng + ?Sized>(
    table: &Table,
    current: &Row,
    plans: &[MixedFieldPlan],
    delimiter: &str,
    rng: &mut R,
) -> String {
    let mut segments = Vec::with_capacity(plans.len());
    for plan in plans {
        let source_row = match &plan.filter {
            Some(filter) => {
                let matches: Vec<&Row> = table
                    .rows()
                    .iter()
                    .filter(|row| filter.matches(row))
                    .collect();
                match matches.choose(rng) {
                    Some(row) => *row,
                    None => {
                        warn!(
                            "[dataset_batch:prompt] no rows found matching filter '{}' for field '{}'; using current row",
                            filter.source(),
                            plan.field
                        );
                        current
                    }
                }
            }
            None => current,
        };
        let segment = source_row
            .get(&plan.field)
            .map(value_to_text)
            .unwrap_or_default();
        let segment = segment.trim();
        if !segment.is_empty() {
            segments.push(segment.to_string());
        }
    }
    segments.join(delimiter)
}

/// Prepend the optional prefix with the delimiter, then trim.
pub fn finalize_prompt(prompt: &str, prefix: Option<&str>, delimiter: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{delimiter}{prompt}").trim().to_string(),
        None => prompt.trim().to_string(),
    }
}
