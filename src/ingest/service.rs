use std::sync::Arc;

use tracing::{debug, error, instrument};

use super::record::TelemetryRecord;
use crate::clock::{Clock, MonotonicClock};
use crate::config::IngestConfig;
use crate::event::{ResponseBody, TriggerEvent, TriggerResponse};
use crate::transport::{StoreError, TelemetryStore};

pub const SAVED_MESSAGE: &str = "Telemetry saved";
pub const SAVE_FAILED_MESSAGE: &str = "Internal error while saving telemetry";
pub const MALFORMED_MESSAGE: &str = "Malformed telemetry payload";

/// Successful ingestion
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub record: TelemetryRecord,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Malformed input: {0}")]
    MalformedInput(#[from] serde_json::Error),

    #[error("Store write failed: {0}")]
    StoreWrite(#[from] StoreError),
}

impl IngestError {
    /// Response for the caller. Store details stay in the logs.
    pub fn to_response(&self) -> TriggerResponse {
        match self {
            IngestError::MalformedInput(e) => TriggerResponse::internal_error(
                ResponseBody::message(MALFORMED_MESSAGE).with_error(e.to_string()),
            ),
            IngestError::StoreWrite(_) => TriggerResponse::internal_error(
                ResponseBody::message(SAVE_FAILED_MESSAGE).with_error(SAVE_FAILED_MESSAGE),
            ),
        }
    }
}

/// Validates, defaults and persists device readings.
///
/// Flow:
/// 1. Resolve the structured input from the trigger event
/// 2. Extract fields with defaults, stamp the server time
/// 3. Put one item into the telemetry table
pub struct IngestionService {
    store: Arc<dyn TelemetryStore>,
    clock: Arc<dyn Clock>,
    table_name: String,
}

impl IngestionService {
    pub fn new(config: IngestConfig, store: Arc<dyn TelemetryStore>) -> Self {
        Self::with_clock(config, store, Arc::new(MonotonicClock::system()))
    }

    pub fn with_clock(
        config: IngestConfig,
        store: Arc<dyn TelemetryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            table_name: config.table_name,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Persist one reading. Store failures are returned, never retried.
    #[instrument(skip_all, fields(table = %self.table_name))]
    pub async fn ingest(&self, event: TriggerEvent) -> Result<Ack, IngestError> {
        let input = event.into_input()?;
        let record = TelemetryRecord::from_input(&input, self.clock.now_millis());

        debug!(
            device_id = %record.device_id,
            timestamp = record.timestamp,
            value = record.value,
            "writing telemetry record"
        );

        self.store
            .put_item(&self.table_name, record.to_item())
            .await?;

        Ok(Ack { record })
    }

    /// Trigger entry point: always answers with a well-formed response
    pub async fn handle(&self, event: TriggerEvent) -> TriggerResponse {
        match self.ingest(event).await {
            Ok(_) => TriggerResponse::ok(ResponseBody::message(SAVED_MESSAGE)),
            Err(e) => {
                error!(table = %self.table_name, error = %e, "Failed to save telemetry");
                e.to_response()
            }
        }
    }
}
