//! Kafka-backed notification topic
//!
//! Republishes relayed alerts to a Kafka topic so downstream consumer groups
//! act as subscribers.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `KAFKA_BROKERS`: Comma-separated list of brokers (default: localhost:9092)
//! - `KAFKA_CLIENT_ID`: Producer client id (default: iot-relay)
//! - `KAFKA_MESSAGE_TIMEOUT_MS`: Delivery timeout (default: 5000)

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};

use super::topic::{NotificationTopic, PublishReceipt, TopicError};

/// Kafka producer configuration
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Kafka broker addresses
    pub brokers: String,
    /// Producer client id
    pub client_id: String,
    /// Delivery timeout in ms
    pub message_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            client_id: "iot-relay".to_string(),
            message_timeout_ms: 5000,
        }
    }
}

impl KafkaConfig {
    /// Create config from environment variables; `None` when no brokers are set
    pub fn from_env() -> Option<Self> {
        let brokers = std::env::var("KAFKA_BROKERS").ok()?;
        if brokers.trim().is_empty() {
            return None;
        }

        Some(Self {
            brokers,
            client_id: std::env::var("KAFKA_CLIENT_ID")
                .unwrap_or_else(|_| "iot-relay".to_string()),
            message_timeout_ms: std::env::var("KAFKA_MESSAGE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
        })
    }
}

/// Topic that produces every notification to Kafka
pub struct KafkaTopic {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaTopic {
    pub fn new(config: &KafkaConfig) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            // Broker-side ack from all in-sync replicas before we report success
            .set("acks", "all")
            .create()?;

        tracing::info!(brokers = %config.brokers, "Kafka topic producer created");

        Ok(Self {
            producer,
            timeout: Duration::from_millis(config.message_timeout_ms),
        })
    }
}

#[async_trait]
impl NotificationTopic for KafkaTopic {
    async fn publish(&self, topic: &str, body: &str) -> Result<PublishReceipt, TopicError> {
        let record: FutureRecord<'_, (), str> = FutureRecord::to(topic).payload(body);

        let (partition, offset) = self
            .producer
            .send(record, self.timeout)
            .await
            .map_err(|(e, _)| TopicError::Unavailable(e.to_string()))?;

        Ok(PublishReceipt {
            message_id: format!("{}:{}:{}", topic, partition, offset),
            delivered_to: 1,
        })
    }
}
