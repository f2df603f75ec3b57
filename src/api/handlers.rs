use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::alerts::AlertNormalizer;
use crate::event::{BatchOutcome, QueueEvent, TriggerEvent, TriggerResponse};
use crate::ingest::IngestionService;
use crate::relay::{RelayService, RelayStats, RelayWorker};
use crate::transport::{MemoryQueue, MemoryStore, MemoryTopic};

/// Application state shared across handlers.
///
/// A component whose configuration is missing is `None`; its route answers
/// 503 while the others keep working.
pub struct AppState {
    pub ingestion: Option<Arc<IngestionService>>,
    pub normalizer: Option<Arc<AlertNormalizer>>,
    pub relay: Option<Arc<RelayService>>,
    pub worker: Option<Arc<RelayWorker>>,
    pub local: LocalTransports,
}

/// In-process transports, kept for stats
#[derive(Default)]
pub struct LocalTransports {
    pub store: Option<Arc<MemoryStore>>,
    pub queue: Option<Arc<MemoryQueue>>,
    pub topic: Option<Arc<MemoryTopic>>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub ingestion: bool,
    pub alerts: bool,
    pub relay: bool,
    pub table: Option<String>,
    pub queue: Option<String>,
    pub topic: Option<String>,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        ingestion: state.ingestion.is_some(),
        alerts: state.normalizer.is_some(),
        relay: state.relay.is_some(),
        table: state.ingestion.as_ref().map(|s| s.table_name().to_string()),
        queue: state.normalizer.as_ref().map(|n| n.queue_url().to_string()),
        topic: state.relay.as_ref().map(|r| r.topic_name().to_string()),
    })
}

// ============================================================================
// Triggers
// ============================================================================

impl IntoResponse for TriggerResponse {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, "application/json")], self.body).into_response()
    }
}

pub async fn ingest_telemetry(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<TriggerResponse, ApiError> {
    let ingestion = state
        .ingestion
        .as_ref()
        .ok_or(ApiError::Unavailable("ingestion"))?;

    Ok(ingestion.handle(TriggerEvent::from_body(body)).await)
}

pub async fn submit_alert(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<TriggerResponse, ApiError> {
    let normalizer = state
        .normalizer
        .as_ref()
        .ok_or(ApiError::Unavailable("alerts"))?;

    Ok(normalizer.handle(TriggerEvent::from_body(body)).await)
}

pub async fn relay_batch(
    State(state): State<Arc<AppState>>,
    Json(event): Json<QueueEvent>,
) -> Result<Json<BatchOutcome>, ApiError> {
    let relay = state.relay.as_ref().ok_or(ApiError::Unavailable("relay"))?;

    Ok(Json(relay.relay_batch(event.records).await))
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Serialize, Default)]
pub struct StatsResponse {
    pub stored_items: Option<usize>,
    pub queue_visible: Option<usize>,
    pub queue_in_flight: Option<usize>,
    pub published: Option<usize>,
    pub relay: Option<RelayStats>,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let depth = state.local.queue.as_ref().map(|q| q.total_depth());

    Json(StatsResponse {
        stored_items: state.local.store.as_ref().map(|s| s.len()),
        queue_visible: depth.map(|d| d.visible),
        queue_in_flight: depth.map(|d| d.in_flight),
        published: state.local.topic.as_ref().map(|t| t.published_count()),
        relay: state.worker.as_ref().map(|w| w.stats()),
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    /// Component not configured
    Unavailable(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Unavailable(component) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{} is not configured", component),
            ),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
