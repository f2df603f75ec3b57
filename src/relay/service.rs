use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{error, info, instrument};

use crate::config::RelayConfig;
use crate::event::{BatchItemFailure, BatchOutcome, QueuedMessage};
use crate::transport::{NotificationTopic, TopicError};

enum RecordOutcome {
    Acknowledged(QueuedMessage),
    Failed(QueuedMessage, TopicError),
}

/// Forwards queued alerts to the notification topic.
///
/// Bodies are republished byte-for-byte. Each record is attempted on its own:
/// a failed publish leaves only that record unacknowledged so the queue
/// redelivers it, while the rest of the batch is acknowledged.
pub struct RelayService {
    topic: Arc<dyn NotificationTopic>,
    topic_name: String,
    max_in_flight: usize,
}

impl RelayService {
    pub fn new(config: RelayConfig, topic: Arc<dyn NotificationTopic>) -> Self {
        Self {
            topic,
            topic_name: config.topic,
            max_in_flight: config.max_in_flight.max(1),
        }
    }

    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    /// Publish every record of the batch and report per-record outcomes.
    ///
    /// Never fails as a whole; outcomes come back in input order.
    #[instrument(skip_all, fields(topic = %self.topic_name, batch_size = batch.len()))]
    pub async fn relay_batch(&self, batch: Vec<QueuedMessage>) -> BatchOutcome {
        let mut outcomes: Vec<(usize, RecordOutcome)> = stream::iter(batch.into_iter().enumerate())
            .map(|(index, record)| async move { (index, self.relay_one(record).await) })
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut result = BatchOutcome::default();
        for (_, outcome) in outcomes {
            match outcome {
                RecordOutcome::Acknowledged(record) => result.acknowledged.push(record),
                RecordOutcome::Failed(record, e) => result.failures.push(BatchItemFailure {
                    item_identifier: record.message_id,
                    receipt_handle: record.receipt_handle,
                    error: e.to_string(),
                }),
            }
        }

        result
    }

    async fn relay_one(&self, record: QueuedMessage) -> RecordOutcome {
        match self.topic.publish(&self.topic_name, &record.body).await {
            Ok(receipt) => {
                info!(
                    message_id = %record.message_id,
                    notification_id = %receipt.message_id,
                    subscribers = receipt.delivered_to,
                    "Message relayed to topic"
                );
                RecordOutcome::Acknowledged(record)
            }
            Err(e) => {
                error!(
                    message_id = %record.message_id,
                    error = %e,
                    "Failed to relay message, leaving it for redelivery"
                );
                RecordOutcome::Failed(record, e)
            }
        }
    }
}
