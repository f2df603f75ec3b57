//! iot-relay server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - RELAY_HOST: Bind address (default: 0.0.0.0)
//! - RELAY_PORT: Port number (default: 8080)
//! - RELAY_TABLE_NAME: Telemetry table; ingestion is disabled without it
//! - RELAY_QUEUE_URL: Alert queue; normalizer and relay worker are disabled without it
//! - RELAY_TOPIC: Notification topic; relay is disabled without it
//! - RELAY_SUBSCRIBERS: Comma-separated webhook URLs subscribed to the topic
//! - RUST_LOG: Log level (default: info)
//!
//! See `config` for the relay tuning variables.

use iot_relay::api::run_server;
use iot_relay::config::ServerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iot_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    tracing::info!("iot-relay configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    if config.subscribers.is_empty() {
        tracing::info!("  Subscribers: none (in-process topic)");
    } else {
        tracing::info!("  Subscribers: {}", config.subscribers.len());
        for url in &config.subscribers {
            tracing::info!("    - {}", url);
        }
    }

    println!(
        r#"
 iot-relay: telemetry ingestion and alert relay
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
