//! Key/value state shared by the driver and every page agent.
//!
//! Values are JSON documents. Writes are visible to the next read in any
//! context, and each key can be watched: subscribers receive one
//! [`Change`] per write that actually changes the stored value.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use relay_logging::{relay_debug, relay_warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::persist::{write_atomically, PersistError};

/// Well-known keys of the shared store.
pub mod keys {
    pub const SITES: &str = "sites";
    pub const URL_RULES: &str = "urlReplacements";
    pub const RESULT_RULES: &str = "resultReplacements";
    pub const RUN_STATUS: &str = "runStatus";
    /// Snapshot of the site list taken when the current run started.
    pub const RUN_SITES: &str = "runSites";
    /// Registry index of the site the driver opened last.
    pub const OPENING_INDEX: &str = "openingIndex";
    pub const RESULT_BUFFER: &str = "resultBuffer";
    pub const EXTRACTION_RECORDS: &str = "extractionRecords";
    pub const SITE_COMPLETE: &str = "siteCompleteNotification";

    /// Number of redirect hops already taken for the site at `site_index`.
    pub fn redirect_depth(site_index: usize) -> String {
        format!("redirectDepth_{site_index}")
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize value for {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read store file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("store file {path} is not a JSON object: {message}")]
    Corrupt { path: String, message: String },
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// One observed write. `value` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub key: String,
    pub value: Option<Value>,
}

pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// Starts watching `key`. Only writes made after this call are delivered.
    fn subscribe(&self, key: &str) -> Subscription;
}

/// Typed access on top of [`StateStore`].
pub trait StoreExt: StateStore {
    /// Reads and deserializes `key`. A value of the wrong shape is logged
    /// and treated as absent.
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(err) => {
                relay_warn!("Ignoring malformed value under {key}: {err}");
                None
            }
        }
    }

    fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.set(key, value)
    }
}

impl<S: StateStore + ?Sized> StoreExt for S {}

/// Receiving end of a key watch. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    key: String,
    rx: mpsc::UnboundedReceiver<Change>,
    hub: Weak<SubscriberHub>,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Waits for the next change. Returns `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<Change> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Change> {
        self.rx.try_recv().ok()
    }

    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(&self.key, self.id);
        }
    }
}

/// Fan-out of changes to the subscriptions of each key.
#[derive(Default)]
struct SubscriberHub {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<String, Vec<(u64, mpsc::UnboundedSender<Change>)>>>,
}

impl SubscriberHub {
    fn subscribe(self: &Arc<Self>, key: &str) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers)
            .entry(key.to_string())
            .or_default()
            .push((id, tx));
        Subscription {
            id,
            key: key.to_string(),
            rx,
            hub: Arc::downgrade(self),
        }
    }

    fn notify(&self, change: Change) {
        let mut subscribers = lock(&self.subscribers);
        let Some(entries) = subscribers.get_mut(&change.key) else {
            return;
        };
        entries.retain(|(_, tx)| tx.send(change.clone()).is_ok());
        if entries.is_empty() {
            subscribers.remove(&change.key);
        }
    }

    fn subscriber_count(&self, key: &str) -> usize {
        lock(&self.subscribers).get(key).map_or(0, Vec::len)
    }

    fn unsubscribe(&self, key: &str, id: u64) {
        let mut subscribers = lock(&self.subscribers);
        if let Some(entries) = subscribers.get_mut(key) {
            entries.retain(|(entry_id, _)| *entry_id != id);
            if entries.is_empty() {
                subscribers.remove(key);
            }
        }
    }
}

/// The store implementation used by the relay: a JSON object kept in memory
/// and, when opened from a path, rewritten atomically after every change.
pub struct SharedStore {
    path: Option<PathBuf>,
    values: Mutex<BTreeMap<String, Value>>,
    hub: Arc<SubscriberHub>,
}

impl SharedStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(BTreeMap::new()),
            hub: Arc::new(SubscriberHub::default()),
        }
    }

    /// Opens the store persisted at `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = read_values(&path)?;
        relay_debug!("Opened state store at {} with {} keys", path.display(), values.len());
        Ok(Self {
            path: Some(path),
            values: Mutex::new(values),
            hub: Arc::new(SubscriberHub::default()),
        })
    }

    /// Re-reads `key` from the backing file and applies it when another
    /// process changed it. Returns whether the in-memory value changed.
    pub fn refresh(&self, key: &str) -> Result<bool, StoreError> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let value = {
            let mut values = lock(&self.values);
            let value = read_values(path)?.remove(key);
            if values.get(key) == value.as_ref() {
                return Ok(false);
            }
            match &value {
                Some(value) => values.insert(key.to_string(), value.clone()),
                None => values.remove(key),
            };
            value
        };
        relay_debug!("Picked up external change of {key}");
        self.hub.notify(Change {
            key: key.to_string(),
            value,
        });
        Ok(true)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.values).keys().cloned().collect()
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.hub.subscriber_count(key)
    }

    /// Applies a write in memory, then persists it. A persist failure is
    /// reported to the caller but the change stays visible in-process.
    fn write(&self, key: &str, value: Option<Value>) -> Result<(), StoreError> {
        let persisted = {
            let mut values = lock(&self.values);
            if values.get(key) == value.as_ref() {
                return Ok(());
            }
            match &value {
                Some(value) => values.insert(key.to_string(), value.clone()),
                None => values.remove(key),
            };
            self.persist(&values)
        };
        self.hub.notify(Change {
            key: key.to_string(),
            value,
        });
        persisted
    }

    fn persist(&self, values: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(values).map_err(|source| StoreError::Serialize {
            key: "*".to_string(),
            source,
        })?;
        write_atomically(path, &text)?;
        Ok(())
    }
}

impl StateStore for SharedStore {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.write(key, Some(value))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.write(key, None)
    }

    fn subscribe(&self, key: &str) -> Subscription {
        self.hub.subscribe(key)
    }
}

fn read_values(path: &Path) -> Result<BTreeMap<String, Value>, StoreError> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(text) => serde_json::from_str(&text).map_err(|err| StoreError::Corrupt {
            path: path.display().to_string(),
            message: err.to_string(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(source) => Err(StoreError::Read {
            path: path.display().to_string(),
            source,
        }),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
