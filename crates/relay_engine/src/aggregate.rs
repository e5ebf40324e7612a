use std::sync::Arc;

use relay_core::ExtractionRecord;
use relay_logging::{relay_error, relay_info, relay_warn};

use crate::store::{keys, StateStore, StoreExt};
use crate::ResultSink;

/// Accumulates per-site records and the copy-ready text buffer.
///
/// Appends never fail: store and sink errors are logged and the run goes on.
pub struct ResultAggregator {
    store: Arc<dyn StateStore>,
    sink: Arc<dyn ResultSink>,
    row_delimiter: String,
}

impl ResultAggregator {
    pub fn new(
        store: Arc<dyn StateStore>,
        sink: Arc<dyn ResultSink>,
        row_delimiter: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sink,
            row_delimiter: row_delimiter.into(),
        }
    }

    /// Adds `record` to the record list and its tab-joined values to the
    /// buffer, then mirrors the whole buffer to the sink.
    pub fn append_record(&self, record: &ExtractionRecord) {
        let mut records = self.records();
        records.push(record.clone());
        if let Err(err) = self.store.set_as(keys::EXTRACTION_RECORDS, &records) {
            relay_error!("Failed to store extraction record for {}: {err}", record.site_name);
        }

        let row = record.joined_values();
        let buffer = if records.len() == 1 {
            row
        } else {
            format!("{}{}{row}", self.current_buffer(), self.row_delimiter)
        };
        if let Err(err) = self.store.set_as(keys::RESULT_BUFFER, &buffer) {
            relay_error!("Failed to store result buffer: {err}");
        }

        match self.sink.publish(&buffer) {
            Ok(()) => relay_info!("Copied results of {} ({} record(s))", record.site_name, records.len()),
            Err(err) => relay_warn!("Could not mirror results: {err}"),
        }
    }

    pub fn current_buffer(&self) -> String {
        self.store.get_as(keys::RESULT_BUFFER).unwrap_or_default()
    }

    pub fn records(&self) -> Vec<ExtractionRecord> {
        self.store
            .get_as(keys::EXTRACTION_RECORDS)
            .unwrap_or_default()
    }

    /// Empties the records, the buffer and the sink.
    pub fn clear(&self) {
        if let Err(err) = self.store.set_as(keys::EXTRACTION_RECORDS, &Vec::<ExtractionRecord>::new()) {
            relay_error!("Failed to clear extraction records: {err}");
        }
        if let Err(err) = self.store.set_as(keys::RESULT_BUFFER, "") {
            relay_error!("Failed to clear result buffer: {err}");
        }
        if let Err(err) = self.sink.publish("") {
            relay_warn!("Could not clear mirrored results: {err}");
        }
    }
}
