//! Trigger boundary types
//!
//! Request/response components are invoked with a [`TriggerEvent`] and always
//! answer with a [`TriggerResponse`]. The relay is invoked with a
//! [`QueueEvent`] and answers with a [`BatchOutcome`].
//!
//! ## Event payloads
//!
//! A payload carrying a string `body` is treated as a front-door request and
//! the body is parsed as JSON:
//! ```json
//! {"body": "{\"device_id\": \"dev1\", \"value\": 42}"}
//! ```
//!
//! An object `body` is used as-is, and a payload without `body` is itself the
//! input:
//! ```json
//! {"device_id": "dev1", "value": 42}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Event delivered by an invoking layer
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerEvent {
    /// Already structured payload
    Structured(JsonValue),
    /// Serialized payload that still has to be parsed
    Raw(String),
}

impl TriggerEvent {
    /// Wrap a raw request body received by a front door
    pub fn from_body(body: impl Into<String>) -> Self {
        TriggerEvent::Raw(body.into())
    }

    /// Resolve the structured input carried by this event.
    ///
    /// Non-object inputs resolve to an empty object so every field falls
    /// back to its default.
    pub fn into_input(self) -> Result<Map<String, JsonValue>, serde_json::Error> {
        let value = match self {
            TriggerEvent::Raw(body) => serde_json::from_str(&body)?,
            TriggerEvent::Structured(JsonValue::Object(mut envelope)) => {
                match envelope.remove("body") {
                    Some(JsonValue::String(body)) => serde_json::from_str(&body)?,
                    Some(JsonValue::Object(body)) => JsonValue::Object(body),
                    Some(other) => {
                        envelope.insert("body".to_string(), other);
                        JsonValue::Object(envelope)
                    }
                    None => JsonValue::Object(envelope),
                }
            }
            TriggerEvent::Structured(other) => other,
        };

        Ok(match value {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        })
    }
}

impl From<JsonValue> for TriggerEvent {
    fn from(value: JsonValue) -> Self {
        TriggerEvent::Structured(value)
    }
}

/// Response returned to request/response triggers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub status_code: u16,
    /// Serialized [`ResponseBody`]
    pub body: String,
}

impl TriggerResponse {
    pub fn ok(body: ResponseBody) -> Self {
        Self::with_status(200, body)
    }

    pub fn internal_error(body: ResponseBody) -> Self {
        Self::with_status(500, body)
    }

    fn with_status(status_code: u16, body: ResponseBody) -> Self {
        let body = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"message":"response serialization failed"}"#.to_string()
        });
        Self { status_code, body }
    }

    /// Parse the body back into its structured form
    pub fn parsed_body(&self) -> Option<ResponseBody> {
        serde_json::from_str(&self.body).ok()
    }
}

/// JSON body of a [`TriggerResponse`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseBody {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A record delivered by the durable queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    pub message_id: String,
    /// Handle used to acknowledge this particular delivery
    #[serde(default)]
    pub receipt_handle: String,
    /// Opaque payload, never inspected by the relay
    pub body: String,
}

/// Batch of queue records handed to the relay
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueuedMessage>,
}

/// Per-record result of a relay invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Records that were forwarded and may be removed from the queue
    #[serde(skip)]
    pub acknowledged: Vec<QueuedMessage>,
    /// Records left on the queue for redelivery
    #[serde(rename = "batchItemFailures")]
    pub failures: Vec<BatchItemFailure>,
}

impl BatchOutcome {
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn is_acknowledged(&self, message_id: &str) -> bool {
        self.acknowledged.iter().any(|m| m.message_id == message_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
    #[serde(skip)]
    pub receipt_handle: String,
    #[serde(skip)]
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_body_is_parsed() {
        let event = TriggerEvent::from(json!({"body": r#"{"device_id":"dev1"}"#}));
        let input = event.into_input().unwrap();
        assert_eq!(input.get("device_id"), Some(&json!("dev1")));
    }

    #[test]
    fn test_object_body_used_directly() {
        let event = TriggerEvent::from(json!({"body": {"value": 3}}));
        let input = event.into_input().unwrap();
        assert_eq!(input.get("value"), Some(&json!(3)));
    }

    #[test]
    fn test_payload_without_body_is_the_input() {
        let event = TriggerEvent::from(json!({"level": "INFO"}));
        let input = event.into_input().unwrap();
        assert_eq!(input.get("level"), Some(&json!("INFO")));
    }

    #[test]
    fn test_malformed_body_is_an_error() {
        assert!(TriggerEvent::from_body("{not json").into_input().is_err());
        assert!(TriggerEvent::from(json!({"body": "{oops"}))
            .into_input()
            .is_err());
    }

    #[test]
    fn test_non_object_input_is_empty() {
        let input = TriggerEvent::from_body("[1, 2, 3]").into_input().unwrap();
        assert!(input.is_empty());
    }

    #[test]
    fn test_response_shape() {
        let response = TriggerResponse::ok(ResponseBody::message("saved"));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["body"], r#"{"message":"saved"}"#);
    }

    #[test]
    fn test_queue_event_and_outcome_wire_format() {
        let event: QueueEvent = serde_json::from_value(json!({
            "Records": [
                {"messageId": "m1", "receiptHandle": "r1", "body": "{}"}
            ]
        }))
        .unwrap();
        assert_eq!(event.records.len(), 1);
        assert_eq!(event.records[0].receipt_handle, "r1");

        let outcome = BatchOutcome {
            acknowledged: vec![],
            failures: vec![BatchItemFailure {
                item_identifier: "m1".to_string(),
                receipt_handle: "r1".to_string(),
                error: "boom".to_string(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"batchItemFailures": [{"itemIdentifier": "m1"}]})
        );
    }
}
