//! Metrics collection for the EventBus

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for publish and dispatch activity
///
/// Mirrored to the `metrics` facade for whichever recorder the process installs.
#[derive(Debug, Default)]
pub struct BusMetrics {
    published_total: AtomicU64,
    rejected_total: AtomicU64,
    dispatched_total: AtomicU64,
    handler_failures_total: AtomicU64,
    backlog: AtomicU64,
}

/// Point-in-time view of the bus counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    pub published_total: u64,
    pub rejected_total: u64,
    pub dispatched_total: u64,
    pub handler_failures_total: u64,
    pub backlog: u64,
    pub subscriptions: u64,
}

impl BusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_published(&self) {
        self.published_total.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("event_bus_published_total");
    }

    pub fn record_rejected(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("event_bus_rejected_total");
    }

    pub fn record_dispatched(&self) {
        self.dispatched_total.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("event_bus_dispatched_total");
    }

    pub fn record_handler_failure(&self) {
        self.handler_failures_total.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("event_bus_handler_failures_total");
    }

    pub fn set_backlog(&self, backlog: usize) {
        self.backlog.store(backlog as u64, Ordering::Relaxed);
        metrics::gauge!("event_bus_backlog", backlog as f64);
    }

    pub fn snapshot(&self, subscriptions: usize) -> BusStats {
        BusStats {
            published_total: self.published_total.load(Ordering::Relaxed),
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
            dispatched_total: self.dispatched_total.load(Ordering::Relaxed),
            handler_failures_total: self.handler_failures_total.load(Ordering::Relaxed),
            backlog: self.backlog.load(Ordering::Relaxed),
            subscriptions: subscriptions as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_snapshot() {
        let metrics = BusMetrics::new();
        metrics.record_published();
        metrics.record_published();
        metrics.record_rejected();
        metrics.record_dispatched();
        metrics.record_handler_failure();
        metrics.set_backlog(1);

        let stats = metrics.snapshot(3);
        assert_eq!(stats.published_total, 2);
        assert_eq!(stats.rejected_total, 1);
        assert_eq!(stats.dispatched_total, 1);
        assert_eq!(stats.handler_failures_total, 1);
        assert_eq!(stats.backlog, 1);
        assert_eq!(stats.subscriptions, 3);
    }
}
