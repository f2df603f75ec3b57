use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use super::service::RelayService;
use crate::config::WorkerConfig;
use crate::transport::QueueReceiver;

/// Shortest poll interval the worker will tick at
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Counters kept by the relay worker
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RelayStats {
    pub batches: u64,
    pub relayed: u64,
    pub failed: u64,
    pub receive_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    batches: AtomicU64,
    relayed: AtomicU64,
    failed: AtomicU64,
    receive_errors: AtomicU64,
}

/// Background worker that drains the alert queue into the relay.
///
/// Acts as the invoking layer for [`RelayService`]: only acknowledged
/// records are deleted from the queue, failures stay hidden until their
/// visibility timeout elapses and are then redelivered.
pub struct RelayWorker {
    receiver: Arc<dyn QueueReceiver>,
    relay: Arc<RelayService>,
    config: WorkerConfig,
    running: Arc<AtomicBool>,
    counters: Counters,
}

impl RelayWorker {
    pub fn new(config: WorkerConfig, receiver: Arc<dyn QueueReceiver>, relay: Arc<RelayService>) -> Self {
        Self {
            receiver,
            relay,
            config,
            running: Arc::new(AtomicBool::new(false)),
            counters: Counters::default(),
        }
    }

    /// Start the background worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!(
                queue = %self.config.queue_url,
                interval = ?self.config.poll_interval,
                "Relay worker started"
            );

            let mut interval = time::interval(self.config.poll_interval.max(MIN_POLL_INTERVAL));

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;

                // Keep draining while the queue hands out full batches
                while self.running.load(Ordering::SeqCst) {
                    match self.poll_once().await {
                        Ok(received) if received >= self.config.batch_size => {
                            tokio::task::yield_now().await;
                        }
                        _ => break,
                    }
                }
            }

            tracing::info!("Relay worker stopped");
        })
    }

    /// Stop the worker
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if worker is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            batches: self.counters.batches.load(Ordering::Relaxed),
            relayed: self.counters.relayed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            receive_errors: self.counters.receive_errors.load(Ordering::Relaxed),
        }
    }

    /// Receive one batch, relay it and acknowledge the forwarded records.
    ///
    /// Returns the number of records received.
    pub async fn poll_once(&self) -> Result<usize, crate::transport::QueueError> {
        let queue_url = &self.config.queue_url;

        let batch = match self
            .receiver
            .receive_batch(queue_url, self.config.batch_size, self.config.visibility_timeout)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(queue = %queue_url, error = %e, "Failed to receive from queue");
                self.counters.receive_errors.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        if batch.is_empty() {
            return Ok(0);
        }

        let received = batch.len();
        let outcome = self.relay.relay_batch(batch).await;

        for record in &outcome.acknowledged {
            if let Err(e) = self.receiver.acknowledge(queue_url, &record.receipt_handle).await {
                // The message will come back and be relayed again
                tracing::warn!(
                    message_id = %record.message_id,
                    error = %e,
                    "Failed to acknowledge relayed message"
                );
            }
        }

        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        self.counters
            .relayed
            .fetch_add(outcome.acknowledged.len() as u64, Ordering::Relaxed);
        self.counters
            .failed
            .fetch_add(outcome.failures.len() as u64, Ordering::Relaxed);

        tracing::debug!(
            received,
            relayed = outcome.acknowledged.len(),
            failed = outcome.failures.len(),
            "Relay batch processed"
        );

        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::transport::{AlertQueue, MemoryQueue, MemoryTopic, QueueDepth, TopicError};
    use tokio_test::assert_ok;

    const QUEUE: &str = "memory://alerts";

    fn worker_config(visibility_timeout: Duration) -> WorkerConfig {
        WorkerConfig {
            queue_url: QUEUE.to_string(),
            batch_size: 10,
            visibility_timeout,
            poll_interval: Duration::from_millis(10),
        }
    }

    fn setup(visibility_timeout: Duration) -> (Arc<MemoryQueue>, Arc<MemoryTopic>, RelayWorker) {
        setup_with(worker_config(visibility_timeout))
    }

    fn setup_with(config: WorkerConfig) -> (Arc<MemoryQueue>, Arc<MemoryTopic>, RelayWorker) {
        let queue = Arc::new(MemoryQueue::new());
        let topic = Arc::new(MemoryTopic::new());
        let relay = Arc::new(RelayService::new(
            RelayConfig {
                topic: "alerts".to_string(),
                max_in_flight: 4,
            },
            topic.clone(),
        ));
        let worker = RelayWorker::new(config, queue.clone(), relay);
        (queue, topic, worker)
    }

    #[tokio::test]
    async fn test_poll_relays_and_acknowledges() {
        let (queue, topic, worker) = setup(Duration::from_secs(30));
        queue.send_message(QUEUE, "a".to_string()).await.unwrap();
        queue.send_message(QUEUE, "b".to_string()).await.unwrap();

        assert_eq!(worker.poll_once().await.unwrap(), 2);

        assert_eq!(topic.published_count(), 2);
        assert_eq!(queue.depth(QUEUE), QueueDepth::default());
        assert_eq!(worker.stats().relayed, 2);
    }

    #[tokio::test]
    async fn test_failed_publish_is_redelivered() {
        let (queue, topic, worker) = setup(Duration::ZERO);
        let id = queue.send_message(QUEUE, "flaky".to_string()).await.unwrap();

        topic.fail_next(TopicError::Unavailable("throttled".to_string()));
        worker.poll_once().await.unwrap();

        assert_eq!(topic.published_count(), 0);
        assert_eq!(queue.depth(QUEUE).visible, 1);
        assert_eq!(worker.stats().failed, 1);

        worker.poll_once().await.unwrap();
        assert_eq!(topic.published_count(), 1);
        assert_eq!(queue.depth(QUEUE), QueueDepth::default());
        assert_eq!(queue.receive_count(QUEUE, &id), None);
    }

    #[tokio::test]
    async fn test_failed_record_stays_hidden_until_timeout() {
        let (queue, topic, worker) = setup(Duration::from_secs(60));
        queue.send_message(QUEUE, "x".to_string()).await.unwrap();

        topic.fail_next(TopicError::Unavailable("down".to_string()));
        worker.poll_once().await.unwrap();

        assert_eq!(queue.depth(QUEUE), QueueDepth { visible: 0, in_flight: 1 });
        assert_eq!(worker.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_background_worker_drains_queue() {
        let (queue, topic, worker) = setup(Duration::from_secs(30));
        let worker = Arc::new(worker);
        let handle = Arc::clone(&worker).start();

        for i in 0..25 {
            queue.send_message(QUEUE, format!("m{}", i)).await.unwrap();
        }

        for _ in 0..100 {
            if topic.published_count() == 25 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        worker.stop();
        handle.await.unwrap();

        assert_eq!(topic.published_count(), 25);
        assert!(!worker.is_running());
        assert_eq!(queue.total_depth(), QueueDepth::default());
    }

    #[tokio::test]
    async fn test_background_worker_survives_extreme_timings() {
        let (queue, topic, worker) = setup_with(WorkerConfig {
            poll_interval: Duration::ZERO,
            visibility_timeout: Duration::from_secs(u64::MAX),
            ..worker_config(Duration::from_secs(30))
        });
        let worker = Arc::new(worker);
        let handle = Arc::clone(&worker).start();

        queue.send_message(QUEUE, "edge".to_string()).await.unwrap();

        for _ in 0..100 {
            if topic.published_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        worker.stop();
        assert_ok!(handle.await);
        assert_eq!(topic.published_count(), 1);
        assert_eq!(queue.total_depth(), QueueDepth::default());
    }

    #[tokio::test]
    async fn test_drain_loop_yields_while_batches_stay_full() {
        // Every record fails and comes straight back, so each poll is full
        let (queue, topic, worker) = setup_with(WorkerConfig {
            batch_size: 1,
            ..worker_config(Duration::ZERO)
        });
        queue.send_message(QUEUE, "stuck".to_string()).await.unwrap();
        for _ in 0..1000 {
            topic.fail_next(TopicError::Unavailable("down".to_string()));
        }

        let worker = Arc::new(worker);
        let handle = Arc::clone(&worker).start();

        // Only reachable if the drain loop hands the thread back
        tokio::time::sleep(Duration::from_millis(20)).await;
        worker.stop();
        assert_ok!(handle.await);
        assert!(worker.stats().failed > 0);
    }
}
