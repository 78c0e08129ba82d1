//! Metrics collection for the IngestionSession

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Counters for polling, queueing and delivery
///
/// Every update is mirrored to the `metrics` facade.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    polls_total: AtomicU64,
    poll_failures_total: AtomicU64,
    received_total: AtomicU64,
    skipped_total: AtomicU64,
    dropped_total: AtomicU64,
    delivered_total: AtomicU64,
    callback_failures_total: AtomicU64,
    queue_size: AtomicI64,
    backoff_ms: AtomicU64,
}

/// Point-in-time view of the session counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub polls_total: u64,
    pub poll_failures_total: u64,
    /// Updates returned by the source, duplicates included
    pub received_total: u64,
    /// Updates ignored because their id was not above the last seen id
    pub skipped_total: u64,
    pub dropped_total: u64,
    /// Updates handed to the callback, whatever the outcome
    pub delivered_total: u64,
    pub callback_failures_total: u64,
    pub queue_size: u64,
    pub backoff_ms: u64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_poll(&self, received: usize) {
        self.polls_total.fetch_add(1, Ordering::Relaxed);
        self.received_total.fetch_add(received as u64, Ordering::Relaxed);
        metrics::increment_counter!("update_polls_total");
        metrics::counter!("updates_received_total", received as u64);
    }

    pub fn record_poll_failure(&self) {
        self.polls_total.fetch_add(1, Ordering::Relaxed);
        self.poll_failures_total.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("update_polls_total");
        metrics::increment_counter!("update_poll_failures_total");
    }

    pub fn record_skipped(&self) {
        self.skipped_total.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("updates_skipped_total");
    }

    pub fn record_dropped(&self) {
        self.dropped_total.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("updates_dropped_total");
    }

    pub fn record_delivered(&self) {
        self.delivered_total.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("updates_delivered_total");
    }

    pub fn record_callback_failure(&self) {
        self.callback_failures_total.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("update_callback_failures_total");
    }

    pub fn record_enqueued(&self) {
        let size = self.queue_size.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("updates_queue_size", size.max(0) as f64);
    }

    pub fn record_dequeued(&self) {
        let size = self.queue_size.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::gauge!("updates_queue_size", size.max(0) as f64);
    }

    pub fn set_backoff(&self, delay: Duration) {
        let ms = delay.as_millis() as u64;
        self.backoff_ms.store(ms, Ordering::Relaxed);
        metrics::gauge!("update_backoff_ms", ms as f64);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    /// Updates currently waiting in the queue
    ///
    /// Enqueue and dequeue are counted by different tasks, so the raw value can dip
    /// below zero for an instant.
    pub fn queue_size(&self) -> usize {
        self.queue_size.load(Ordering::Relaxed).max(0) as usize
    }

    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            polls_total: self.polls_total.load(Ordering::Relaxed),
            poll_failures_total: self.poll_failures_total.load(Ordering::Relaxed),
            received_total: self.received_total.load(Ordering::Relaxed),
            skipped_total: self.skipped_total.load(Ordering::Relaxed),
            dropped_total: self.dropped_total.load(Ordering::Relaxed),
            delivered_total: self.delivered_total.load(Ordering::Relaxed),
            callback_failures_total: self.callback_failures_total.load(Ordering::Relaxed),
            queue_size: self.queue_size() as u64,
            backoff_ms: self.backoff_ms.load(Ordering::Relaxed),
        }
    }
}
