//! Durable queue interface and in-process implementation
//!
//! Delivery is at-least-once: a received message stays on the queue but is
//! hidden for its visibility timeout. Acknowledging the delivery deletes it;
//! otherwise it becomes visible again and is redelivered.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::event::QueuedMessage;

/// Largest accepted message body
pub const MAX_MESSAGE_BYTES: usize = 256 * 1024;

/// Longest time a received message stays hidden (12 hours)
pub const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

/// Queue errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueueError {
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown or expired receipt handle: {0}")]
    UnknownReceipt(String),

    #[error("Message rejected: {0}")]
    Rejected(String),
}

/// Producer side of the durable queue
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertQueue: Send + Sync {
    /// Send one message, returning the transport's message id
    async fn send_message(&self, queue_url: &str, body: String) -> Result<String, QueueError>;
}

/// Consumer side of the durable queue
#[async_trait]
pub trait QueueReceiver: Send + Sync {
    /// Receive up to `max_messages` visible messages, hiding each for `visibility_timeout`
    async fn receive_batch(
        &self,
        queue_url: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage>, QueueError>;

    /// Delete the delivery identified by `receipt_handle`
    async fn acknowledge(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError>;
}

#[derive(Debug)]
struct StoredMessage {
    message_id: String,
    body: String,
    receive_count: u32,
    invisible_until: Option<Instant>,
    receipt_handle: Option<String>,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.invisible_until.map_or(true, |until| now >= until)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<StoredMessage>,
}

/// Queue depth snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub visible: usize,
    pub in_flight: usize,
}

/// In-process durable queue
pub struct MemoryQueue {
    queues: DashMap<String, Arc<Mutex<QueueState>>>,
    injected_failures: Mutex<Vec<QueueError>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
            injected_failures: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `send_message` fail with `error`
    pub fn fail_next_send(&self, error: QueueError) {
        self.injected_failures.lock().push(error);
    }

    fn queue(&self, queue_url: &str) -> Arc<Mutex<QueueState>> {
        Arc::clone(&self.queues.entry(queue_url.to_string()).or_default())
    }

    pub fn depth(&self, queue_url: &str) -> QueueDepth {
        let Some(queue) = self.queues.get(queue_url).map(|q| Arc::clone(&q)) else {
            return QueueDepth::default();
        };
        let state = queue.lock();
        let now = Instant::now();
        let visible = state.messages.iter().filter(|m| m.is_visible(now)).count();
        QueueDepth {
            visible,
            in_flight: state.messages.len() - visible,
        }
    }

    /// Depth summed over every queue
    pub fn total_depth(&self) -> QueueDepth {
        let urls: Vec<String> = self.queues.iter().map(|e| e.key().clone()).collect();
        urls.iter().fold(QueueDepth::default(), |acc, url| {
            let depth = self.depth(url);
            QueueDepth {
                visible: acc.visible + depth.visible,
                in_flight: acc.in_flight + depth.in_flight,
            }
        })
    }

    /// Number of times a message has been received
    pub fn receive_count(&self, queue_url: &str, message_id: &str) -> Option<u32> {
        let queue = self.queues.get(queue_url).map(|q| Arc::clone(&q))?;
        let state = queue.lock();
        state
            .messages
            .iter()
            .find(|m| m.message_id == message_id)
            .map(|m| m.receive_count)
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertQueue for MemoryQueue {
    async fn send_message(&self, queue_url: &str, body: String) -> Result<String, QueueError> {
        if let Some(error) = self.injected_failures.lock().pop() {
            return Err(error);
        }

        if body.len() > MAX_MESSAGE_BYTES {
            return Err(QueueError::Rejected(format!(
                "body of {} bytes exceeds the {} byte limit",
                body.len(),
                MAX_MESSAGE_BYTES
            )));
        }

        let message_id = uuid::Uuid::new_v4().to_string();
        self.queue(queue_url).lock().messages.push_back(StoredMessage {
            message_id: message_id.clone(),
            body,
            receive_count: 0,
            invisible_until: None,
            receipt_handle: None,
        });

        Ok(message_id)
    }
}

#[async_trait]
impl QueueReceiver for MemoryQueue {
    async fn receive_batch(
        &self,
        queue_url: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage>, QueueError> {
        let queue = self.queue(queue_url);
        let mut state = queue.lock();
        let now = Instant::now();
        let invisible_until = now + visibility_timeout.min(MAX_VISIBILITY_TIMEOUT);

        let mut batch = Vec::new();
        for message in state.messages.iter_mut() {
            if batch.len() >= max_messages {
                break;
            }
            if !message.is_visible(now) {
                continue;
            }

            let receipt_handle = uuid::Uuid::new_v4().to_string();
            message.receive_count += 1;
            message.invisible_until = Some(invisible_until);
            message.receipt_handle = Some(receipt_handle.clone());

            batch.push(QueuedMessage {
                message_id: message.message_id.clone(),
                receipt_handle,
                body: message.body.clone(),
            });
        }

        Ok(batch)
    }

    async fn acknowledge(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        let queue = self
            .queues
            .get(queue_url)
            .map(|q| Arc::clone(&q))
            .ok_or_else(|| QueueError::UnknownReceipt(receipt_handle.to_string()))?;
        let mut state = queue.lock();

        let position = state
            .messages
            .iter()
            .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
            .ok_or_else(|| QueueError::UnknownReceipt(receipt_handle.to_string()))?;
        state.messages.remove(position);

        Ok(())
    }
}
