//! Telemetry record and defensive field extraction

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::transport::{AttributeValue, Item};

pub const DEFAULT_DEVICE_ID: &str = "unknown";
pub const DEFAULT_VALUE: f64 = 0.0;

/// One persisted device reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub device_id: String,
    /// Server-assigned write time, ms since epoch
    pub timestamp: i64,
    pub value: f64,
}

impl TelemetryRecord {
    /// Build a record from untrusted input, stamping it with `timestamp`.
    ///
    /// `device_id` must be a non-empty string and `value` a finite JSON
    /// number; anything else takes the default. A reading of `0` is kept.
    pub fn from_input(input: &Map<String, JsonValue>, timestamp: i64) -> Self {
        let device_id = input
            .get("device_id")
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_DEVICE_ID)
            .to_string();

        let value = input
            .get("value")
            .and_then(JsonValue::as_f64)
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_VALUE);

        Self {
            device_id,
            timestamp,
            value,
        }
    }

    /// Store representation with typed attributes
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert(
            "device_id".to_string(),
            AttributeValue::string(&self.device_id),
        );
        item.insert(
            "timestamp".to_string(),
            AttributeValue::number(self.timestamp),
        );
        item.insert("value".to_string(), AttributeValue::number(self.value));
        item
    }

    /// Decode a stored item; `None` if any attribute is missing or mistyped
    pub fn from_item(item: &Item) -> Option<Self> {
        Some(Self {
            device_id: item.get("device_id")?.as_str()?.to_string(),
            timestamp: item.get("timestamp")?.as_i64()?,
            value: item.get("value")?.as_f64()?,
        })
    }
}
