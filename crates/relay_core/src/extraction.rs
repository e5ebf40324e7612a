use std::fmt;

use serde::{Deserialize, Serialize};

pub const NOT_FOUND: &str = "Not found";
pub const EMPTY_TEXT: &str = "Empty text";
pub const BLANK_SELECTOR: &str = "Empty selector";
pub const SELECTOR_ERROR: &str = "Selector error";

/// Outcome of resolving one output selector on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorValue {
    /// Trimmed, non-empty text content of the first matching element.
    Text(String),
    /// The element exists but its trimmed text is empty.
    EmptyText,
    /// The selector string itself is blank.
    BlankSelector,
    /// The selector could not be parsed.
    SelectorError,
    /// No element matched before polling stopped.
    NotFound,
}

impl SelectorValue {
    pub fn is_match(&self) -> bool {
        matches!(self, SelectorValue::Text(_) | SelectorValue::EmptyText)
    }

    pub fn into_output(self) -> String {
        match self {
            SelectorValue::Text(text) => text,
            other => other.to_string(),
        }
    }
}

impl fmt::Display for SelectorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorValue::Text(text) => f.write_str(text),
            SelectorValue::EmptyText => f.write_str(EMPTY_TEXT),
            SelectorValue::BlankSelector => f.write_str(BLANK_SELECTOR),
            SelectorValue::SelectorError => f.write_str(SELECTOR_ERROR),
            SelectorValue::NotFound => f.write_str(NOT_FOUND),
        }
    }
}

/// Values collected from one site, appended once per finished page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRecord {
    pub site_index: usize,
    pub site_name: String,
    pub page_url: String,
    pub values: Vec<String>,
    pub timestamp: String,
}

impl ExtractionRecord {
    /// Values joined the way they are pasted into a spreadsheet row.
    pub fn joined_values(&self) -> String {
        self.values.join("\t")
    }
}

/// Payload written to the completion channel when a page agent is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteCompleteNotice {
    #[serde(default)]
    pub run_id: u64,
    pub index: usize,
    pub site_name: String,
    pub url: String,
    pub timestamp: String,
    pub values: Vec<String>,
}

impl SiteCompleteNotice {
    pub fn for_record(run_id: u64, record: &ExtractionRecord) -> Self {
        Self {
            run_id,
            index: record.site_index,
            site_name: record.site_name.clone(),
            url: record.page_url.clone(),
            timestamp: record.timestamp.clone(),
            values: record.values.clone(),
        }
    }
}
