use std::fs;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use relay_core::ExtractionRecord;
use relay_engine::{
    keys, FileSink, MemorySink, ResultAggregator, SharedStore, StateStore, StoreExt,
};
use tempfile::TempDir;

fn record(site_index: usize, name: &str, values: &[&str]) -> ExtractionRecord {
    ExtractionRecord {
        site_index,
        site_name: name.to_string(),
        page_url: format!("https://{name}/"),
        values: values.iter().map(|value| value.to_string()).collect(),
        timestamp: "2026-03-01T10:00:00.000Z".to_string(),
    }
}

#[test]
fn rows_are_appended_and_mirrored() {
    let store = Arc::new(SharedStore::in_memory());
    let sink = Arc::new(MemorySink::default());
    let aggregator = ResultAggregator::new(store.clone(), sink.clone(), "\t");

    aggregator.append_record(&record(0, "alpha", &["A", "1"]));
    assert_eq!(aggregator.current_buffer(), "A\t1");
    assert_eq!(sink.latest().as_deref(), Some("A\t1"));

    aggregator.append_record(&record(2, "gamma", &["Not found"]));
    assert_eq!(aggregator.current_buffer(), "A\t1\tNot found");
    assert_eq!(sink.latest().as_deref(), Some("A\t1\tNot found"));
    assert_eq!(sink.publish_count(), 2);

    let records = aggregator.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].site_name, "gamma");
    assert_eq!(
        store.get_as::<Vec<ExtractionRecord>>(keys::EXTRACTION_RECORDS),
        Some(records)
    );
}

#[test]
fn custom_row_delimiter_separates_sites() {
    let store = Arc::new(SharedStore::in_memory());
    let aggregator = ResultAggregator::new(store, Arc::new(MemorySink::default()), "\n");

    aggregator.append_record(&record(0, "alpha", &["A", "1"]));
    aggregator.append_record(&record(1, "beta", &["B", "2"]));
    assert_eq!(aggregator.current_buffer(), "A\t1\nB\t2");
}

#[test]
fn record_without_values_still_takes_a_row() {
    let store = Arc::new(SharedStore::in_memory());
    let aggregator = ResultAggregator::new(store, Arc::new(MemorySink::default()), "\n");

    aggregator.append_record(&record(0, "alpha", &[]));
    aggregator.append_record(&record(1, "beta", &["B"]));
    assert_eq!(aggregator.current_buffer(), "\nB");
}

#[test]
fn clear_resets_buffer_records_and_sink() {
    let store = Arc::new(SharedStore::in_memory());
    let sink = Arc::new(MemorySink::default());
    let aggregator = ResultAggregator::new(store.clone(), sink.clone(), "\t");
    aggregator.append_record(&record(0, "alpha", &["A"]));

    aggregator.clear();
    assert_eq!(aggregator.current_buffer(), "");
    assert!(aggregator.records().is_empty());
    assert_eq!(sink.latest().as_deref(), Some(""));
    assert!(store.get(keys::RESULT_BUFFER).is_some());
}

#[test]
fn file_sink_holds_the_whole_buffer() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("out").join("results.txt");
    let store = Arc::new(SharedStore::in_memory());
    let aggregator = ResultAggregator::new(store, Arc::new(FileSink::new(&path)), "\t");

    aggregator.append_record(&record(0, "alpha", &["A"]));
    aggregator.append_record(&record(1, "beta", &["B"]));
    assert_eq!(fs::read_to_string(&path).unwrap(), "A\tB");
}
