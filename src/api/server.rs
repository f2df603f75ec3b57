use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_check, ingest_telemetry, relay_batch, stats, submit_alert, AppState, LocalTransports,
};
use crate::alerts::AlertNormalizer;
use crate::config::{AlertConfig, IngestConfig, RelayConfig, ServerConfig, WorkerConfig};
use crate::ingest::IngestionService;
use crate::relay::{RelayService, RelayWorker};
use crate::transport::{MemoryQueue, MemoryStore, MemoryTopic, NotificationTopic, WebhookTopic};

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Triggers
        .route("/telemetry", post(ingest_telemetry))
        .route("/alerts", post(submit_alert))
        .route("/relay", post(relay_batch))
        // Stats
        .route("/stats", get(stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(feature = "kafka")]
fn kafka_topic() -> Option<Arc<dyn NotificationTopic>> {
    let config = crate::transport::KafkaConfig::from_env()?;
    match crate::transport::KafkaTopic::new(&config) {
        Ok(topic) => Some(Arc::new(topic)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create Kafka producer, falling back");
            None
        }
    }
}

#[cfg(not(feature = "kafka"))]
fn kafka_topic() -> Option<Arc<dyn NotificationTopic>> {
    None
}

/// Pick the topic transport: Kafka when enabled and configured, webhooks
/// when subscribers are listed, otherwise in-process.
fn build_topic(config: &ServerConfig) -> (Arc<dyn NotificationTopic>, Option<Arc<MemoryTopic>>) {
    if let Some(topic) = kafka_topic() {
        tracing::info!("Using Kafka topic");
        return (topic, None);
    }

    if !config.subscribers.is_empty() {
        tracing::info!(subscribers = config.subscribers.len(), "Using webhook topic");
        let topic: Arc<dyn NotificationTopic> =
            Arc::new(WebhookTopic::new(config.subscribers.clone()));
        return (topic, None);
    }

    tracing::info!("Using in-process topic");
    let local = Arc::new(MemoryTopic::new());
    let topic: Arc<dyn NotificationTopic> = local.clone();
    (topic, Some(local))
}

/// Wire every component whose configuration is present
pub fn build_state(config: &ServerConfig) -> AppState {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let (topic, local_topic) = build_topic(config);

    let ingestion = match IngestConfig::from_env() {
        Ok(c) => Some(Arc::new(IngestionService::new(c, store.clone()))),
        Err(e) => {
            tracing::error!(error = %e, "Ingestion disabled");
            None
        }
    };

    let normalizer = match AlertConfig::from_env() {
        Ok(c) => Some(Arc::new(AlertNormalizer::new(c, queue.clone()))),
        Err(e) => {
            tracing::error!(error = %e, "Alert normalizer disabled");
            None
        }
    };

    let relay = match RelayConfig::from_env() {
        Ok(c) => Some(Arc::new(RelayService::new(c, topic))),
        Err(e) => {
            tracing::error!(error = %e, "Relay disabled");
            None
        }
    };

    let worker = relay.as_ref().and_then(|relay| match WorkerConfig::from_env() {
        Ok(c) => Some(Arc::new(RelayWorker::new(c, queue.clone(), Arc::clone(relay)))),
        Err(e) => {
            tracing::error!(error = %e, "Relay worker disabled");
            None
        }
    });

    AppState {
        ingestion,
        normalizer,
        relay,
        worker,
        local: LocalTransports {
            store: Some(store),
            queue: Some(queue),
            topic: local_topic,
        },
    }
}

/// Run the HTTP trigger harness and the relay worker
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(build_state(&config));

    let worker_handle = state.worker.as_ref().map(|w| Arc::clone(w).start());

    let app = build_router(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting relay server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&state)))
        .await?;

    if let Some(handle) = worker_handle {
        handle.abort();
    }

    tracing::info!("Relay server stopped");
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    tracing::info!("Shutdown signal received, stopping relay worker...");
    if let Some(worker) = &state.worker {
        worker.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::event::BatchOutcome;
    use crate::ingest::TelemetryRecord;
    use crate::transport::{QueueReceiver, StoreError, TopicError};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::util::ServiceExt;

    const TABLE: &str = "telemetry";
    const QUEUE: &str = "memory://alerts";
    const TOPIC: &str = "alert-notifications";
    const NOW: i64 = 1_700_000_000_000;

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
        queue: Arc<MemoryQueue>,
        topic: Arc<MemoryTopic>,
    }

    fn create_test_app() -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let topic = Arc::new(MemoryTopic::new());
        let clock = Arc::new(FixedClock::new(NOW));

        let state = Arc::new(AppState {
            ingestion: Some(Arc::new(IngestionService::with_clock(
                IngestConfig {
                    table_name: TABLE.to_string(),
                },
                store.clone(),
                clock.clone(),
            ))),
            normalizer: Some(Arc::new(AlertNormalizer::with_clock(
                AlertConfig {
                    queue_url: QUEUE.to_string(),
                },
                queue.clone(),
                clock,
            ))),
            relay: Some(Arc::new(RelayService::new(
                RelayConfig::new(TOPIC),
                topic.clone(),
            ))),
            worker: None,
            local: LocalTransports {
                store: Some(store.clone()),
                queue: Some(queue.clone()),
                topic: Some(topic.clone()),
            },
        });

        TestApp {
            router: build_router(state),
            store,
            queue,
            topic,
        }
    }

    fn post(uri: &str, body: impl Into<String>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.into()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ingestion"], true);
        assert_eq!(body["table"], TABLE);
        assert_eq!(body["queue"], QUEUE);
        assert_eq!(body["topic"], TOPIC);
    }

    #[tokio::test]
    async fn test_ingest_reading() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(post("/telemetry", r#"{"device_id": "dev1", "value": 42}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let stored = app.store.get(TABLE, "dev1", NOW).unwrap();
        assert_eq!(
            TelemetryRecord::from_item(&stored),
            Some(TelemetryRecord {
                device_id: "dev1".to_string(),
                timestamp: NOW,
                value: 42.0,
            })
        );
    }

    #[tokio::test]
    async fn test_ingest_empty_object() {
        let app = create_test_app();

        let response = app.router.oneshot(post("/telemetry", "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let stored = TelemetryRecord::from_item(&app.store.get(TABLE, "unknown", NOW).unwrap());
        assert_eq!(stored.unwrap().value, 0.0);
    }

    #[tokio::test]
    async fn test_store_permission_error_has_no_downstream_effects() {
        let app = create_test_app();
        app.store
            .fail_next(StoreError::PermissionDenied("telemetry".to_string()));

        let response = app
            .router
            .oneshot(post("/telemetry", r#"{"device_id": "dev1"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(!body["error"].as_str().unwrap().is_empty());

        assert!(app.store.is_empty());
        assert_eq!(app.queue.total_depth().visible, 0);
        assert_eq!(app.topic.published_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_telemetry_is_500() {
        let app = create_test_app();

        let response = app.router.oneshot(post("/telemetry", "{broken")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_alert_flows_through_queue_to_topic() {
        let app = create_test_app();
        let mut subscriber = app.topic.subscribe();

        let response = app
            .router
            .clone()
            .oneshot(post("/alerts", r#"{"alert": "Overheat", "device_id": "dev9"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["data"],
            serde_json::json!({
                "alert": "Overheat",
                "level": "UNDEFINED",
                "device_id": "dev9",
                "timestamp": "2023-11-14T22:13:20.000Z"
            })
        );

        let records = app
            .queue
            .receive_batch(QUEUE, 10, Duration::from_secs(30))
            .await
            .unwrap();
        let enqueued_body = records[0].body.clone();
        let event = serde_json::json!({ "Records": records });

        let response = app
            .router
            .oneshot(post("/relay", event.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let outcome: BatchOutcome = serde_json::from_value(body_json(response).await).unwrap();
        assert!(outcome.failures.is_empty());
        assert_eq!(subscriber.recv().await.unwrap().body, enqueued_body);
    }

    #[tokio::test]
    async fn test_relay_reports_failed_items() {
        let app = create_test_app();
        app.topic
            .fail_next(TopicError::Unavailable("throttled".to_string()));

        let event = serde_json::json!({
            "Records": [{"messageId": "m1", "receiptHandle": "r1", "body": "{}"}]
        });
        let response = app
            .router
            .oneshot(post("/relay", event.to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"batchItemFailures": [{"itemIdentifier": "m1"}]})
        );
    }

    #[tokio::test]
    async fn test_unconfigured_component_is_503() {
        let state = Arc::new(AppState {
            ingestion: None,
            normalizer: None,
            relay: None,
            worker: None,
            local: LocalTransports::default(),
        });
        let router = build_router(state);

        let response = router
            .clone()
            .oneshot(post("/alerts", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["relay"], false);
        assert!(body["topic"].is_null());
    }
}
