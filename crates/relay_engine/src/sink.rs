use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::persist::{write_atomically, PersistError};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to publish results: {0}")]
    Persist(#[from] PersistError),
}

/// External mirror of the accumulated result buffer. Every publish replaces
/// what was there before.
pub trait ResultSink: Send + Sync {
    fn publish(&self, text: &str) -> Result<(), SinkError>;
}

/// Mirrors the buffer into a text file.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ResultSink for FileSink {
    fn publish(&self, text: &str) -> Result<(), SinkError> {
        write_atomically(&self.path, text)?;
        Ok(())
    }
}

/// Keeps the last published buffer in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    published: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn latest(&self) -> Option<String> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn publish_count(&self) -> usize {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ResultSink for MemorySink {
    fn publish(&self, text: &str) -> Result<(), SinkError> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
        Ok(())
    }
}
