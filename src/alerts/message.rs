//! Alert message wire format

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::clock::Clock;

pub const DEFAULT_ALERT: &str = "No alert";
pub const DEFAULT_DEVICE_ID: &str = "unknown-device";

/// Alert severity; unknown labels are carried through unchanged
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AlertLevel {
    Critical,
    Info,
    #[default]
    Undefined,
    Other(String),
}

impl AlertLevel {
    pub fn as_str(&self) -> &str {
        match self {
            AlertLevel::Critical => "CRITICAL",
            AlertLevel::Info => "INFO",
            AlertLevel::Undefined => "UNDEFINED",
            AlertLevel::Other(s) => s,
        }
    }
}

impl From<String> for AlertLevel {
    fn from(s: String) -> Self {
        match s.as_str() {
            "CRITICAL" => AlertLevel::Critical,
            "INFO" => AlertLevel::Info,
            "UNDEFINED" => AlertLevel::Undefined,
            _ => AlertLevel::Other(s),
        }
    }
}

impl From<&str> for AlertLevel {
    fn from(s: &str) -> Self {
        AlertLevel::from(s.to_string())
    }
}

impl From<AlertLevel> for String {
    fn from(level: AlertLevel) -> Self {
        match level {
            AlertLevel::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized alert, serialized verbatim onto the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub alert: String,
    pub level: AlertLevel,
    pub device_id: String,
    /// ISO-8601 time of the alert
    pub timestamp: String,
}

impl AlertMessage {
    /// Fill every missing field independently. A field counts as missing
    /// when it is absent, null, an empty string or not a string at all.
    pub fn normalize(input: &Map<String, JsonValue>, clock: &dyn Clock) -> Self {
        Self {
            alert: text_field(input, "alert")
                .unwrap_or(DEFAULT_ALERT)
                .to_string(),
            level: text_field(input, "level")
                .map(AlertLevel::from)
                .unwrap_or_default(),
            device_id: text_field(input, "device_id")
                .unwrap_or(DEFAULT_DEVICE_ID)
                .to_string(),
            timestamp: text_field(input, "timestamp")
                .map(str::to_string)
                .unwrap_or_else(|| clock.now_rfc3339()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn text_field<'a>(input: &'a Map<String, JsonValue>, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
}
