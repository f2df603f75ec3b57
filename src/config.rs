//! Environment configuration
//!
//! Each component needs exactly one transport address. A missing address is
//! fatal for that component only; the others still start.
//!
//! Environment variables:
//! - `RELAY_TABLE_NAME`: telemetry table (ingestion)
//! - `RELAY_QUEUE_URL`: alert queue address (normalizer, relay worker)
//! - `RELAY_TOPIC`: notification topic (relay)
//! - `RELAY_SUBSCRIBERS`: comma-separated webhook URLs subscribed to the topic
//! - `RELAY_MAX_IN_FLIGHT`: concurrent publishes per batch (default: 16)
//! - `RELAY_BATCH_SIZE`: records received per poll (default: 10)
//! - `RELAY_VISIBILITY_TIMEOUT_SECS`: redelivery delay for failed records (default: 30, 1..=43200)
//! - `RELAY_POLL_INTERVAL_MS`: queue poll interval (default: 1000, must be non-zero)
//! - `RELAY_HOST` / `RELAY_PORT`: HTTP bind address (default: 0.0.0.0:8080)

use std::time::Duration;

use crate::transport::MAX_VISIBILITY_TIMEOUT;

pub const TABLE_NAME_VAR: &str = "RELAY_TABLE_NAME";
pub const QUEUE_URL_VAR: &str = "RELAY_QUEUE_URL";
pub const TOPIC_VAR: &str = "RELAY_TOPIC";

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::Missing(var)),
    }
}

fn parsed_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Ingestion configuration
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub table_name: String,
}

impl IngestConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            table_name: required(TABLE_NAME_VAR)?,
        })
    }
}

/// Alert normalizer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    pub queue_url: String,
}

impl AlertConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            queue_url: required(QUEUE_URL_VAR)?,
        })
    }
}

/// Relay configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub topic: String,
    /// Upper bound on concurrent publishes within one batch
    pub max_in_flight: usize,
}

impl RelayConfig {
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            max_in_flight: Self::DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let topic = required(TOPIC_VAR)?;
        let max_in_flight = parsed_or("RELAY_MAX_IN_FLIGHT", Self::DEFAULT_MAX_IN_FLIGHT);
        if max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                var: "RELAY_MAX_IN_FLIGHT",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            topic,
            max_in_flight,
        })
    }
}

/// Relay worker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub queue_url: String,
    /// Most records received per poll
    pub batch_size: usize,
    /// How long a received record stays hidden before redelivery
    pub visibility_timeout: Duration,
    pub poll_interval: Duration,
}

impl WorkerConfig {
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            batch_size: 10,
            visibility_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(1000),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::new(required(QUEUE_URL_VAR)?);
        Self {
            batch_size: parsed_or("RELAY_BATCH_SIZE", defaults.batch_size).max(1),
            visibility_timeout: Duration::from_secs(parsed_or(
                "RELAY_VISIBILITY_TIMEOUT_SECS",
                defaults.visibility_timeout.as_secs(),
            )),
            poll_interval: Duration::from_millis(parsed_or(
                "RELAY_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )),
            ..defaults
        }
        .validate()
    }

    /// Reject timings the worker cannot run with.
    ///
    /// A zero visibility timeout redelivers a failed batch immediately and
    /// the drain loop never idles.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "RELAY_POLL_INTERVAL_MS",
                value: "0".to_string(),
            });
        }

        if self.visibility_timeout.is_zero() || self.visibility_timeout > MAX_VISIBILITY_TIMEOUT {
            return Err(ConfigError::Invalid {
                var: "RELAY_VISIBILITY_TIMEOUT_SECS",
                value: self.visibility_timeout.as_secs().to_string(),
            });
        }

        Ok(self)
    }
}

/// HTTP harness configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Webhook subscribers; empty means an in-process topic
    pub subscribers: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            subscribers: vec![],
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("RELAY_HOST").unwrap_or(defaults.host),
            port: parsed_or("RELAY_PORT", defaults.port),
            subscribers: std::env::var("RELAY_SUBSCRIBERS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests touching the environment use variable names unique to each test
    // so they can run in parallel.

    #[test]
    fn test_required_missing_and_blank() {
        assert_eq!(
            required("RELAY_TEST_NEVER_SET"),
            Err(ConfigError::Missing("RELAY_TEST_NEVER_SET"))
        );

        std::env::set_var("RELAY_TEST_BLANK", "   ");
        assert_eq!(
            required("RELAY_TEST_BLANK"),
            Err(ConfigError::Missing("RELAY_TEST_BLANK"))
        );
    }

    #[test]
    fn test_required_trims() {
        std::env::set_var("RELAY_TEST_PRESENT", " telemetry ");
        assert_eq!(required("RELAY_TEST_PRESENT").unwrap(), "telemetry");
    }

    #[test]
    fn test_parsed_or_falls_back() {
        std::env::set_var("RELAY_TEST_NUMBER", "not-a-number");
        assert_eq!(parsed_or("RELAY_TEST_NUMBER", 7usize), 7);

        std::env::set_var("RELAY_TEST_NUMBER_OK", "12");
        assert_eq!(parsed_or("RELAY_TEST_NUMBER_OK", 7usize), 12);
    }

    #[test]
    fn test_worker_defaults() {
        let config = WorkerConfig::new("memory://alerts");
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.visibility_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_worker_defaults_are_valid() {
        let config = WorkerConfig::new("memory://alerts");
        assert_eq!(config.clone().validate(), Ok(config));
    }

    #[test]
    fn test_worker_rejects_zero_poll_interval() {
        let config = WorkerConfig {
            poll_interval: Duration::ZERO,
            ..WorkerConfig::new("memory://alerts")
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Invalid {
                var: "RELAY_POLL_INTERVAL_MS",
                value: "0".to_string(),
            })
        );
    }

    #[test]
    fn test_worker_rejects_zero_visibility_timeout() {
        let config = WorkerConfig {
            visibility_timeout: Duration::ZERO,
            ..WorkerConfig::new("memory://alerts")
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Invalid {
                var: "RELAY_VISIBILITY_TIMEOUT_SECS",
                value: "0".to_string(),
            })
        );
    }

    #[test]
    fn test_worker_rejects_huge_visibility_timeout() {
        let config = WorkerConfig {
            visibility_timeout: Duration::from_secs(u64::MAX),
            ..WorkerConfig::new("memory://alerts")
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                var: "RELAY_VISIBILITY_TIMEOUT_SECS",
                ..
            })
        ));

        let at_limit = WorkerConfig {
            visibility_timeout: MAX_VISIBILITY_TIMEOUT,
            ..WorkerConfig::new("memory://alerts")
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_relay_defaults() {
        let config = RelayConfig::new("alerts");
        assert_eq!(config.max_in_flight, 16);
    }
}
