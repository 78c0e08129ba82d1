//! Metrics collection for the RateLimiter

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for admission decisions
///
/// Every update is mirrored to the `metrics` facade so an installed recorder
/// (e.g. a Prometheus exporter) sees the same numbers.
#[derive(Debug, Default)]
pub struct RateLimiterMetrics {
    admitted_total: AtomicU64,
    rejected_total: AtomicU64,
    evicted_total: AtomicU64,
    keys: AtomicU64,
}

/// Point-in-time view of the limiter counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub admitted_total: u64,
    pub rejected_total: u64,
    pub evicted_total: u64,
    pub keys: u64,
}

impl RateLimiterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admitted(&self) {
        self.admitted_total.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("rate_limiter_admitted_total");
    }

    pub fn record_rejected(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("rate_limiter_rejected_total");
    }

    pub fn record_evicted(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.evicted_total.fetch_add(count, Ordering::Relaxed);
        metrics::counter!("rate_limiter_evicted_total", count);
    }

    pub fn set_keys(&self, keys: usize) {
        self.keys.store(keys as u64, Ordering::Relaxed);
        metrics::gauge!("rate_limiter_keys", keys as f64);
    }

    pub fn snapshot(&self) -> RateLimiterStats {
        RateLimiterStats {
            admitted_total: self.admitted_total.load(Ordering::Relaxed),
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
            evicted_total: self.evicted_total.load(Ordering::Relaxed),
            keys: self.keys.load(Ordering::Relaxed),
        }
    }
}
