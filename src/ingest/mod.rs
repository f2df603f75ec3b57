//! Telemetry ingestion
//!
//! Device readings arrive through a trigger event, get defensive defaults and
//! a server-assigned timestamp, and are written as one store item.

pub mod record;
pub mod service;

pub use record::TelemetryRecord;
pub use service::{IngestError, IngestionService};
