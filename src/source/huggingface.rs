use std::path::Path;

use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use tracing::{info, warn};

use super::ShardFormat;
use crate::constants::source::TRAIN_SPLIT;
use crate::errors::LoadError;
use crate::table::Table;

/// Load a hub dataset: the `train` split when the repository defines one, otherwise every data file.
pub fn load_hub_dataset(dataset: &str) -> Result<Table, LoadError> {
    let api = ApiBuilder::new()
        .with_progress(false)
        .with_retries(5)
        .build()
        .map_err(|err| LoadError::Remote(format!("failed building hf-hub client: {err}")))?;
    let repo_api = api.repo(Repo::new(dataset.to_string(), RepoType::Dataset));

    info!(
        "[dataset_batch:hf] reading remote file list for dataset {}",
        dataset
    );
    let repo_info = repo_api
        .info()
        .map_err(|err| LoadError::Remote(format!("failed reading repository info: {err}")))?;
    let siblings = repo_info
        .siblings
        .into_iter()
        .map(|entry| entry.rfilename)
        .collect::<Vec<_>>();

    let files = resolve_split_files(&siblings);
    if files.is_empty() {
        return Err(LoadError::NotFound(dataset.to_string()));
    }

    let mut tables = Vec::with_capacity(files.len());
    for remote_path in files {
        let Some(format) = ShardFormat::from_path(Path::new(&remote_path)) else {
            continue;
        };
        info!("[dataset_batch:hf] fetching {}", remote_path);
        let local = repo_api.get(&remote_path).map_err(|err| {
            LoadError::Remote(format!("failed downloading '{remote_path}': {err}"))
        })?;
        tables.push(format.read(&local)?);
    }
    Ok(Table::concat(tables))
}

/// Pick the data files of the train split, falling back to all data files when no split exists.
pub fn resolve_split_files(siblings: &[String]) -> Vec<String> {
    let mut data_files: Vec<String> = siblings
        .iter()
        .filter(|name| ShardFormat::from_path(Path::new(name.as_str())).is_some())
        .cloned()
        .collect();
    data_files.sort();

    let train: Vec<String> = data_files
        .iter()
        .filter(|name| belongs_to_split(name, TRAIN_SPLIT))
        .cloned()
        .collect();
    if !train.is_empty() {
        return train;
    }
    warn!(
        "[dataset_batch:hf] no '{}' split found; loading unsplit data files",
        TRAIN_SPLIT
    );
    data_files
}

fn belongs_to_split(remote_path: &str, split: &str) -> bool {
    let split_dir = format!("{split}/");
    let split_token = format!("-{split}-");
    let split_prefix = split.to_string();
    remote_path.starts_with(&split_dir)
        || remote_path.contains(&format!("/{split_dir}"))
        || remote_path.contains(&split_token)
        || Path::new(remote_path)
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(&split_prefix))
}
