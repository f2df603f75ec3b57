//! Persistence store interface and in-process implementation

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Typed attribute, as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// String attribute
    S(String),
    /// Number attribute, carried in its decimal string form
    N(String),
}

impl AttributeValue {
    pub fn string(s: impl Into<String>) -> Self {
        AttributeValue::S(s.into())
    }

    pub fn number(n: impl ToString) -> Self {
        AttributeValue::N(n.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            AttributeValue::N(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::N(n) => n.parse().ok(),
            AttributeValue::S(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::N(n) => n.parse().ok(),
            AttributeValue::S(_) => None,
        }
    }
}

/// One store row: attribute name to typed value
pub type Item = BTreeMap<String, AttributeValue>;

/// Store errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Store request timed out")]
    Timeout,

    #[error("Store throttled the request")]
    Throttled,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable key-value store addressed as "put one item into a table"
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Upsert one item; an existing item with the same key is replaced
    async fn put_item(&self, table: &str, item: Item) -> Result<(), StoreError>;
}

/// In-process store keyed by (`device_id`, `timestamp`)
pub struct MemoryStore {
    tables: DashMap<String, DashMap<(String, i64), Item>>,
    injected_failures: Mutex<Vec<StoreError>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            injected_failures: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Make the next `put_item` fail with `error`
    pub fn fail_next(&self, error: StoreError) {
        self.injected_failures.lock().push(error);
    }

    /// Fetch an item by its composite key
    pub fn get(&self, table: &str, device_id: &str, timestamp: i64) -> Option<Item> {
        self.tables
            .get(table)
            .and_then(|t| t.get(&(device_id.to_string(), timestamp)).map(|i| i.clone()))
    }

    /// Number of items across all tables
    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful writes, overwrites included
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn key_of(item: &Item) -> (String, i64) {
        let device_id = item
            .get("device_id")
            .and_then(AttributeValue::as_str)
            .unwrap_or_default()
            .to_string();
        let timestamp = item
            .get("timestamp")
            .and_then(AttributeValue::as_i64)
            .unwrap_or_default();
        (device_id, timestamp)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn put_item(&self, table: &str, item: Item) -> Result<(), StoreError> {
        if let Some(error) = self.injected_failures.lock().pop() {
            return Err(error);
        }

        let key = Self::key_of(&item);
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(key, item);
        self.writes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }
}
