//! Bounded hand-off between the poll task and the drain loop

use crate::metrics::SessionMetrics;
use crate::update::Update;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::warn;

/// Result of offering an update to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// No space freed up within the enqueue timeout, or the consumer is gone
    Dropped,
}

/// Result of waiting for the next update
#[derive(Debug)]
pub enum Next {
    Update(Update),
    /// Nothing arrived within the dequeue timeout
    Idle,
    /// The producer is gone and every queued update has been taken
    Closed,
}

/// Fixed-capacity FIFO of updates with wait-then-drop insertion
pub struct UpdateQueue;

impl UpdateQueue {
    pub fn bounded(
        capacity: usize,
        enqueue_timeout: Duration,
        metrics: Arc<SessionMetrics>,
    ) -> (UpdateProducer, UpdateConsumer) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            UpdateProducer {
                sender,
                enqueue_timeout,
                metrics: metrics.clone(),
            },
            UpdateConsumer { receiver, metrics },
        )
    }
}

pub struct UpdateProducer {
    sender: mpsc::Sender<Update>,
    enqueue_timeout: Duration,
    metrics: Arc<SessionMetrics>,
}

impl UpdateProducer {
    /// Insert, waiting at most the enqueue timeout for space
    pub async fn enqueue(&self, update: Update) -> EnqueueOutcome {
        match self.sender.send_timeout(update, self.enqueue_timeout).await {
            Ok(()) => {
                self.metrics.record_enqueued();
                EnqueueOutcome::Enqueued
            }
            Err(SendTimeoutError::Timeout(update)) => {
                self.metrics.record_dropped();
                warn!(
                    update_id = update.update_id,
                    "[IngestionSession] queue full for {:?}, dropping update",
                    self.enqueue_timeout
                );
                EnqueueOutcome::Dropped
            }
            Err(SendTimeoutError::Closed(update)) => {
                self.metrics.record_dropped();
                warn!(
                    update_id = update.update_id,
                    "[IngestionSession] queue closed, dropping update"
                );
                EnqueueOutcome::Dropped
            }
        }
    }
}

pub struct UpdateConsumer {
    receiver: mpsc::Receiver<Update>,
    metrics: Arc<SessionMetrics>,
}

impl UpdateConsumer {
    /// Wait up to `timeout` for the next update in FIFO order
    pub async fn next(&mut self, timeout: Duration) -> Next {
        match tokio::time::timeout(timeout, self.receiver.recv()).await {
            Ok(Some(update)) => {
                self.metrics.record_dequeued();
                Next::Update(update)
            }
            Ok(None) => Next::Closed,
            Err(_) => Next::Idle,
        }
    }
}
