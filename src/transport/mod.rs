//! Transports the pipeline talks through
//!
//! Each external collaborator is a trait:
//! - [`TelemetryStore`]: durable key-value store for telemetry rows
//! - [`AlertQueue`] / [`QueueReceiver`]: durable at-least-once queue
//! - [`NotificationTopic`]: publish-subscribe fan-out to subscribers
//!
//! In-process implementations back local runs and tests. A Kafka topic is
//! available with the `kafka` feature.

use std::sync::OnceLock;
use std::time::Duration;

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod queue;
pub mod store;
pub mod topic;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaConfig, KafkaTopic};
pub use queue::{
    AlertQueue, MemoryQueue, QueueDepth, QueueError, QueueReceiver, MAX_VISIBILITY_TIMEOUT,
};
pub use store::{AttributeValue, Item, MemoryStore, StoreError, TelemetryStore};
pub use topic::{MemoryTopic, Notification, NotificationTopic, PublishReceipt, TopicError, WebhookTopic};

static HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Process-wide HTTP client, built on first use and never torn down
pub fn shared_http_client() -> &'static reqwest::Client {
    HTTP_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client")
    })
}
