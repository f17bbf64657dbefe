//! Row selection for one batch.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::constants::config::ALL_ROWS;
use crate::types::{MagicNumber, RowIndex};

/// Inputs to one batch selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionPlan {
    /// Table length.
    pub total: usize,
    /// First row requested by the host.
    pub start_row: usize,
    /// Row limit; `-1` means every remaining row.
    pub num_rows: i64,
    /// Visit a seeded permutation of the table instead of a contiguous range.
    pub shuffle: bool,
    /// Seed for the permutation.
    pub random_seed: u64,
    /// Rows already consumed, added to `start_row`.
    pub magic_number: MagicNumber,
}

impl SelectionPlan {
    /// First position of the batch after applying the magic number.
    pub fn effective_start(&self) -> usize {
        let offset = usize::try_from(self.magic_number).unwrap_or(usize::MAX);
        self.start_row.saturating_add(offset)
    }

    /// One past the last position of the batch, clamped to the table.
    pub fn end(&self) -> usize {
        let limit = if self.num_rows == ALL_ROWS {
            self.total
        } else {
            usize::try_from(self.num_rows.max(0)).unwrap_or(usize::MAX)
        };
        self.effective_start()
            .saturating_add(limit)
            .min(self.total)
    }

    /// Ordered row indices to visit. Empty when the start is past the table.
    pub fn select(&self) -> Vec<RowIndex> {
        let start = self.effective_start();
        let end = self.end();
        if start >= end {
            return Vec::new();
        }
        if self.shuffle {
            let permutation = seeded_permutation(self.total, self.random_seed);
            permutation[start..end].to_vec()
        } else {
            (start..end).collect()
        }
    }
}

/// Deterministic permutation of `0..total` for `seed`.
pub fn seeded_permutation(total: usize, seed: u64) -> Vec<RowIndex> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<RowIndex> = (0..total).collect();
    order.shuffle(&mut rng);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn plan(total: usize, start_row: usize, num_rows: i64) -> SelectionPlan {
        SelectionPlan {
            total,
            start_row,
            num_rows,
            shuffle: false,
            random_seed: 0,
            magic_number: 0,
        }
    }

    #[test]
    fn all_rows_selects_full_range() {
        assert_eq!(plan(5, 0, -1).select(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn limit_is_clamped_to_table() {
        assert_eq!(plan(5, 3, 10).select(), vec![3, 4]);
        assert_eq!(plan(5, 1, 2).select(), vec![1, 2]);
    }

    #[test]
    fn magic_number_offsets_the_start() {
        let mut p = plan(10, 2, 3);
        p.magic_number = 4;
        assert_eq!(p.effective_start(), 6);
        assert_eq!(p.select(), vec![6, 7, 8]);
    }

    #[test]
    fn start_past_end_is_empty() {
        let mut p = plan(4, 1, -1);
        p.magic_number = 3;
        assert!(p.select().is_empty());
        assert!(plan(0, 0, -1).select().is_empty());
        assert!(plan(4, 0, 0).select().is_empty());
    }

    #[test]
    fn shuffle_is_deterministic_per_seed_and_slices_the_permutation() {
        let mut p = plan(50, 10, 20);
        p.shuffle = true;
        p.random_seed = 7;
        let first = p.select();
        assert_eq!(first, p.select());
        assert_eq!(first, seeded_permutation(50, 7)[10..30].to_vec());

        let unique: HashSet<_> = first.iter().collect();
        assert_eq!(unique.len(), 20);
        assert!(first.iter().all(|idx| *idx < 50));
    }

    #[test]
    fn different_seeds_give_different_orders() {
        assert_ne!(seeded_permutation(64, 1), seeded_permutation(64, 2));
    }
}
