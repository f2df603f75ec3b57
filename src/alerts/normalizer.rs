use std::sync::Arc;

use tracing::{error, info, instrument};

use super::message::AlertMessage;
use crate::clock::{Clock, SystemClock};
use crate::config::AlertConfig;
use crate::event::{ResponseBody, TriggerEvent, TriggerResponse};
use crate::transport::{AlertQueue, QueueError};

pub const ENQUEUED_MESSAGE: &str = "Alert processed and enqueued";
pub const ENQUEUE_FAILED_MESSAGE: &str = "Failed to enqueue alert";

/// Successful enqueue
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub message: AlertMessage,
    /// Identifier assigned by the queue transport
    pub message_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("Malformed input: {0}")]
    MalformedInput(#[from] serde_json::Error),

    #[error("Queue send failed: {0}")]
    QueueSend(#[from] QueueError),
}

impl EnqueueError {
    /// Response for the caller; the transport error is surfaced as-is
    pub fn to_response(&self) -> TriggerResponse {
        let error = match self {
            EnqueueError::MalformedInput(e) => e.to_string(),
            EnqueueError::QueueSend(e) => e.to_string(),
        };
        TriggerResponse::internal_error(ResponseBody::message(ENQUEUE_FAILED_MESSAGE).with_error(error))
    }
}

/// Fills alert defaults and places the alert on the durable queue.
///
/// One send attempt per invocation; redelivery of failed invocations is up
/// to whatever triggered the normalizer.
pub struct AlertNormalizer {
    queue: Arc<dyn AlertQueue>,
    clock: Arc<dyn Clock>,
    queue_url: String,
}

impl AlertNormalizer {
    pub fn new(config: AlertConfig, queue: Arc<dyn AlertQueue>) -> Self {
        Self::with_clock(config, queue, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AlertConfig, queue: Arc<dyn AlertQueue>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue,
            clock,
            queue_url: config.queue_url,
        }
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    #[instrument(skip_all, fields(queue = %self.queue_url))]
    pub async fn normalize_and_enqueue(&self, event: TriggerEvent) -> Result<Ack, EnqueueError> {
        let input = event.into_input()?;
        let message = AlertMessage::normalize(&input, self.clock.as_ref());

        let message_id = self
            .queue
            .send_message(&self.queue_url, message.to_json()?)
            .await?;

        info!(
            message_id = %message_id,
            device_id = %message.device_id,
            level = %message.level,
            "Alert enqueued"
        );

        Ok(Ack {
            message,
            message_id,
        })
    }

    /// Trigger entry point: always answers with a well-formed response
    pub async fn handle(&self, event: TriggerEvent) -> TriggerResponse {
        match self.normalize_and_enqueue(event).await {
            Ok(ack) => {
                let data = serde_json::to_value(&ack.message).unwrap_or_default();
                TriggerResponse::ok(
                    ResponseBody::message(ENQUEUED_MESSAGE)
                        .with_data(data)
                        .with_message_id(ack.message_id),
                )
            }
            Err(e) => {
                error!(queue = %self.queue_url, error = %e, "Failed to enqueue alert");
                e.to_response()
            }
        }
    }
}
