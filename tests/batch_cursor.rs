use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dataset_batch::metadata::read_metadata_file;
use dataset_batch::{
    BatchConfig, BatchCursor, BatchError, BatchOutput, ChannelPublisher, CursorOptions,
    CursorPhase, MetadataLayout, RowProcessedEvent,
};
use serde_json::Value;
use tempfile::TempDir;

fn write_jsonl(dir: &Path, name: &str, rows: usize) -> PathBuf {
    let path = dir.join(name);
    let body: String = (0..rows)
        .map(|idx| format!("{{\"text\":\"caption {idx}\",\"id\":{idx}}}\n"))
        .collect();
    fs::write(&path, body).expect("failed writing jsonl fixture");
    path
}

fn cursor_in(temp: &TempDir, rng_seed: u64) -> BatchCursor {
    BatchCursor::new(CursorOptions::new(temp.path().join("out")).with_rng_seed(rng_seed))
}

fn metadata_lines(cursor: &BatchCursor) -> Vec<Value> {
    let mut files: Vec<PathBuf> = fs::read_dir(cursor.metadata_dir())
        .expect("metadata dir missing")
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
        .iter()
        .flat_map(|path| read_metadata_file(path).unwrap())
        .collect()
}

fn visited(cursor: &BatchCursor) -> Vec<usize> {
    cursor
        .history()
        .iter()
        .map(|record| record.fields.row_index)
        .collect()
}

#[test]
fn full_pass_visits_every_row_once_then_returns_empty() {
    let temp = tempfile::tempdir().unwrap();
    let data = write_jsonl(temp.path(), "rows.jsonl", 5);
    let mut cursor = cursor_in(&temp, 1);
    let config = BatchConfig::new(data.to_str().unwrap()).with_num_rows(5);

    for idx in 0..5 {
        let output = cursor.advance(&config).unwrap();
        assert_eq!(output.prompt, format!("caption {idx}"));
    }
    assert_eq!(visited(&cursor), vec![0, 1, 2, 3, 4]);
    assert_eq!(cursor.advance(&config).unwrap(), BatchOutput::empty());
    assert_eq!(cursor.magic_number(), 0);
}

#[test]
fn shuffle_order_is_reproducible_across_cursors() {
    let temp = tempfile::tempdir().unwrap();
    let data = write_jsonl(temp.path(), "rows.jsonl", 30);
    let config = BatchConfig::new(data.to_str().unwrap())
        .with_num_rows(12)
        .with_shuffle(true, 1234);

    let mut first = cursor_in(&temp, 1);
    let mut second = cursor_in(&temp, 2);
    for _ in 0..12 {
        first.advance(&config).unwrap();
        second.advance(&config).unwrap();
    }
    assert_eq!(visited(&first), visited(&second));
    assert_ne!(visited(&first), (0..12).collect::<Vec<_>>());
}

#[test]
fn magic_number_counts_rows_and_offsets_the_next_batch() {
    let temp = tempfile::tempdir().unwrap();
    let data = write_jsonl(temp.path(), "rows.jsonl", 7);
    let mut cursor = cursor_in(&temp, 1);
    let config = BatchConfig::new(data.to_str().unwrap()).with_num_rows(3);

    for k in 1..=3 {
        cursor.advance(&config).unwrap();
        assert_eq!(cursor.magic_number(), k);
    }
    assert_eq!(cursor.phase(), CursorPhase::Exhausted);

    for _ in 0..4 {
        cursor.advance(&config).unwrap();
    }
    assert_eq!(visited(&cursor), vec![0, 1, 2, 3, 4, 5, 6]);
    assert!(cursor.advance(&config).unwrap().is_empty());
    assert_eq!(cursor.magic_number(), 0);
}

#[test]
fn every_prompt_has_a_matching_metadata_line() {
    let temp = tempfile::tempdir().unwrap();
    let data = write_jsonl(temp.path(), "rows.jsonl", 4);
    let mut cursor = cursor_in(&temp, 9);
    let config = BatchConfig::new(data.to_str().unwrap()).with_start_row(1);

    let outputs: Vec<BatchOutput> = (0..3).map(|_| cursor.advance(&config).unwrap()).collect();
    let lines = metadata_lines(&cursor);
    assert_eq!(lines.len(), 3);
    for (idx, (output, line)) in outputs.iter().zip(&lines).enumerate() {
        assert_eq!(line["fixed"]["row_index"], Value::from(idx + 1));
        assert_eq!(line["fixed"]["seed"], Value::from(output.seed));
        assert_eq!(line["fixed"]["prompt"], Value::from(output.prompt.clone()));
        assert_eq!(line["row"]["id"], Value::from(idx + 1));
        let name = line["fixed"]["output_filename"].as_str().unwrap();
        assert!(name.starts_with(&format!("row_{}_{}_", idx + 1, output.seed)));
    }
}

#[test]
fn flat_layout_writes_row_columns_at_top_level() {
    let temp = tempfile::tempdir().unwrap();
    let data = write_jsonl(temp.path(), "rows.jsonl", 1);
    let mut cursor = BatchCursor::new(
        CursorOptions::new(temp.path().join("out")).with_layout(MetadataLayout::Flat),
    );
    cursor
        .advance(&BatchConfig::new(data.to_str().unwrap()))
        .unwrap();
    let lines = metadata_lines(&cursor);
    assert_eq!(lines[0]["text"], Value::from("caption 0"));
    assert_eq!(lines[0]["row_index"], Value::from(0));
    assert_eq!(lines[0]["mixed_fields_config"], Value::Null);
}

#[test]
fn missing_prompt_field_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let data = write_jsonl(temp.path(), "rows.jsonl", 2);
    let mut cursor = cursor_in(&temp, 1);
    let err = cursor
        .advance(&BatchConfig::new(data.to_str().unwrap()).with_prompt_field("caption"))
        .unwrap_err();
    match err {
        BatchError::MissingField { field, available } => {
            assert_eq!(field, "caption");
            assert_eq!(available, vec!["text".to_string(), "id".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn unsupported_extension_returns_empty_output() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("rows.parquet");
    fs::write(&path, b"PAR1").unwrap();
    let mut cursor = cursor_in(&temp, 1);

    let output = cursor
        .advance(&BatchConfig::new(path.to_str().unwrap()))
        .unwrap();
    assert_eq!(output.into_tuple(), (String::new(), 0));
    assert_eq!(cursor.phase(), CursorPhase::Empty);
    assert!(cursor.history().is_empty());
}

#[test]
fn missing_locator_returns_empty_output() {
    let temp = tempfile::tempdir().unwrap();
    let mut cursor = cursor_in(&temp, 1);
    let locator = temp.path().join("nope.jsonl");
    let output = cursor
        .advance(&BatchConfig::new(locator.to_str().unwrap()))
        .unwrap();
    assert!(output.is_empty());
}

#[test]
fn exhausted_cursor_accepts_a_new_config() {
    let temp = tempfile::tempdir().unwrap();
    let data = write_jsonl(temp.path(), "rows.jsonl", 10);
    let locator = data.to_str().unwrap();
    let mut cursor = cursor_in(&temp, 1);

    let first = BatchConfig::new(locator).with_num_rows(2);
    cursor.advance(&first).unwrap();
    cursor.advance(&first).unwrap();
    assert_eq!(cursor.phase(), CursorPhase::Exhausted);

    let second = BatchConfig::new(locator).with_num_rows(1).with_start_row(5);
    let output = cursor.advance(&second).unwrap();
    // start_row 5 plus the two rows already consumed
    assert_eq!(output.prompt, "caption 7");
}

#[test]
fn events_drive_the_next_run() {
    let temp = tempfile::tempdir().unwrap();
    let data = write_jsonl(temp.path(), "rows.jsonl", 3);
    let (publisher, receiver) = ChannelPublisher::new();
    let mut cursor = cursor_in(&temp, 4).with_publisher(Arc::new(publisher));
    let mut config = BatchConfig::new(data.to_str().unwrap());

    let mut runs = 0;
    loop {
        cursor.advance(&config).unwrap();
        runs += 1;
        let Some((_, payload)) = receiver.try_iter().last() else {
            break;
        };
        let event = RowProcessedEvent::from_payload(&payload).unwrap();
        assert_eq!(event.node_id, cursor.node_id());
        config.magic_number = Some(event.magic_number);
    }
    assert_eq!(runs, 4);
    assert_eq!(visited(&cursor), vec![0, 1, 2]);
}

#[test]
fn csv_and_snapshot_directories_load() {
    let temp = tempfile::tempdir().unwrap();
    let snapshot = temp.path().join("snapshot");
    fs::create_dir_all(snapshot.join("data")).unwrap();
    fs::write(
        snapshot.join("data").join("train-00000.csv"),
        "text,score\nfirst,1\nsecond,2.5\n",
    )
    .unwrap();
    write_jsonl(&snapshot.join("data"), "train-00001.jsonl", 1);

    let mut cursor = cursor_in(&temp, 1);
    let config = BatchConfig::new(snapshot.to_str().unwrap());
    let prompts: Vec<String> = (0..3)
        .map(|_| cursor.advance(&config).unwrap().prompt)
        .collect();
    assert_eq!(prompts, vec!["first", "second", "caption 0"]);
    assert!(cursor.advance(&config).unwrap().is_empty());
}

#[test]
fn rows_missing_the_prompt_field_read_as_empty() {
    let temp = tempfile::tempdir().unwrap();
    let data = temp.path().join("mixed_keys.jsonl");
    fs::write(
        &data,
        "{\"text\":\"a\"}\n{\"caption\":\"b\"}\n{\"text\":\"c\"}\n",
    )
    .unwrap();
    let mut cursor = cursor_in(&temp, 1);
    let config = BatchConfig::new(data.to_str().unwrap());

    let prompts: Vec<String> = (0..3)
        .map(|_| cursor.advance(&config).unwrap().prompt)
        .collect();
    assert_eq!(prompts, vec!["a", "", "c"]);
    assert_eq!(visited(&cursor), vec![0, 1, 2]);
    assert_eq!(cursor.history()[1].row["text"], Value::Null);
    assert!(cursor.advance(&config).unwrap().is_empty());
}
