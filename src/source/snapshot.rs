use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::ShardFormat;
use crate::errors::LoadError;
use crate::table::Table;

/// Load a snapshot directory: every recognized shard under `dir`, concatenated in path order.
pub fn read_snapshot(dir: &Path) -> Result<Table, LoadError> {
    let started = Instant::now();
    let shards = discover_shards(dir)?;
    if shards.is_empty() {
        return Err(LoadError::EmptySnapshot(dir.to_path_buf()));
    }

    let tables = shards
        .par_iter()
        .map(|(path, format)| {
            debug!("[dataset_batch:source] reading shard {}", path.display());
            format.read(path)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let table = Table::concat(tables);
    info!(
        "[dataset_batch:source] snapshot read in {:.2}s (rows={}, shards={})",
        started.elapsed().as_secs_f64(),
        table.len(),
        shards.len()
    );
    Ok(table)
}

/// List shard files under `dir`, sorted by path.
pub fn discover_shards(dir: &Path) -> Result<Vec<(PathBuf, ShardFormat)>, LoadError> {
    let mut shards = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|err| LoadError::Io(err.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(format) = ShardFormat::from_path(entry.path()) {
            shards.push((entry.path().to_path_buf(), format));
        }
    }
    shards.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(shards)
}
