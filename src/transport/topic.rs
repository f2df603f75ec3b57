//! Publish-subscribe topic interface and implementations

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::shared_http_client;

/// Topic errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TopicError {
    #[error("Topic unavailable: {0}")]
    Unavailable(String),

    #[error("Subscriber {url} rejected delivery: {reason}")]
    Subscriber { url: String, reason: String },

    #[error("Multiple delivery failures: {}", join_errors(.0))]
    Multiple(Vec<TopicError>),
}

fn join_errors(errors: &[TopicError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Receipt for a published notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: String,
    /// Subscribers the notification was handed to
    pub delivered_to: usize,
}

/// Publish-subscribe transport
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationTopic: Send + Sync {
    /// Broadcast `body` unmodified to every current subscriber of `topic`
    async fn publish(&self, topic: &str, body: &str) -> Result<PublishReceipt, TopicError>;
}

/// A notification as seen by an in-process subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub topic: String,
    pub message_id: String,
    pub body: String,
}

/// In-process topic backed by a broadcast channel
pub struct MemoryTopic {
    sender: broadcast::Sender<Notification>,
    recent: Mutex<VecDeque<Notification>>,
    recent_capacity: usize,
    published: AtomicUsize,
    injected_failures: Mutex<Vec<TopicError>>,
}

impl MemoryTopic {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// `capacity` bounds both the channel buffer and the recent-delivery log
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            recent_capacity: capacity,
            published: AtomicUsize::new(0),
            injected_failures: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Make the next `publish` fail with `error`
    pub fn fail_next(&self, error: TopicError) {
        self.injected_failures.lock().push(error);
    }

    /// Most recent notifications, oldest first
    pub fn recent(&self) -> Vec<Notification> {
        self.recent.lock().iter().cloned().collect()
    }

    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for MemoryTopic {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationTopic for MemoryTopic {
    async fn publish(&self, topic: &str, body: &str) -> Result<PublishReceipt, TopicError> {
        if let Some(error) = self.injected_failures.lock().pop() {
            return Err(error);
        }

        let notification = Notification {
            topic: topic.to_string(),
            message_id: uuid::Uuid::new_v4().to_string(),
            body: body.to_string(),
        };

        // No subscribers is not an error for a topic
        let delivered_to = self.sender.send(notification.clone()).unwrap_or(0);

        {
            let mut recent = self.recent.lock();
            if recent.len() == self.recent_capacity {
                recent.pop_front();
            }
            if self.recent_capacity > 0 {
                recent.push_back(notification.clone());
            }
        }
        self.published.fetch_add(1, Ordering::Relaxed);

        Ok(PublishReceipt {
            message_id: notification.message_id,
            delivered_to,
        })
    }
}

/// Topic whose subscribers are HTTP endpoints.
///
/// The body is POSTed verbatim to every subscriber. Publishing fails when
/// any subscriber fails, so the queue redelivers and every subscriber sees
/// the notification at least once.
#[derive(Debug, Clone)]
pub struct WebhookTopic {
    client: reqwest::Client,
    subscribers: Arc<Vec<String>>,
}

impl WebhookTopic {
    pub fn new(subscribers: Vec<String>) -> Self {
        Self {
            client: shared_http_client().clone(),
            subscribers: Arc::new(subscribers),
        }
    }

    pub fn subscribers(&self) -> &[String] {
        &self.subscribers
    }

    async fn deliver(&self, url: &str, topic: &str, message_id: &str, body: &str) -> Result<(), TopicError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("x-relay-topic", topic)
            .header("x-relay-message-id", message_id)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| TopicError::Subscriber {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(TopicError::Subscriber {
                url: url.to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        tracing::debug!(url = %url, message_id = %message_id, "Webhook delivery sent");
        Ok(())
    }
}

#[async_trait]
impl NotificationTopic for WebhookTopic {
    async fn publish(&self, topic: &str, body: &str) -> Result<PublishReceipt, TopicError> {
        let message_id = uuid::Uuid::new_v4().to_string();

        let results = futures::future::join_all(
            self.subscribers
                .iter()
                .map(|url| self.deliver(url, topic, &message_id, body)),
        )
        .await;

        let mut errors: Vec<TopicError> = results.into_iter().filter_map(Result::err).collect();
        match errors.len() {
            0 => Ok(PublishReceipt {
                message_id,
                delivered_to: self.subscribers.len(),
            }),
            1 => Err(errors.remove(0)),
            _ => Err(TopicError::Multiple(errors)),
        }
    }
}
