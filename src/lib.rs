//! iot-relay: IoT telemetry ingestion and alert relay
//!
//! Three independently invoked stages, composed only through durable
//! transports:
//!
//! - **Ingestion**: device readings are defaulted, stamped with the server
//!   time and written to the telemetry store
//! - **Alert normalization**: raw alerts get per-field defaults and are
//!   placed on the durable queue
//! - **Relay**: queued alerts are republished, unmodified, to the
//!   notification topic with per-record acknowledgment
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use iot_relay::config::IngestConfig;
//! use iot_relay::event::TriggerEvent;
//! use iot_relay::ingest::IngestionService;
//! use iot_relay::transport::MemoryStore;
//!
//! # async fn run() {
//! let store = Arc::new(MemoryStore::new());
//! let service = IngestionService::new(
//!     IngestConfig { table_name: "telemetry".to_string() },
//!     store,
//! );
//!
//! let response = service
//!     .handle(TriggerEvent::from_body(r#"{"device_id": "dev1", "value": 42}"#))
//!     .await;
//! assert_eq!(response.status_code, 200);
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod clock;
pub mod config;
pub mod event;
pub mod ingest;
pub mod relay;
pub mod transport;

// Re-export commonly used types
pub use alerts::{AlertLevel, AlertMessage, AlertNormalizer, EnqueueError};
pub use event::{BatchOutcome, QueueEvent, QueuedMessage, TriggerEvent, TriggerResponse};
pub use ingest::{IngestError, IngestionService, TelemetryRecord};
pub use relay::{RelayService, RelayWorker};
