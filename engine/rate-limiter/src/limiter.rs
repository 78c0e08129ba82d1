//! Fixed-window admission control

use crate::clock::{Clock, SystemClock};
use crate::config::RateLimiterConfig;
use crate::metrics::{RateLimiterMetrics, RateLimiterStats};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Admission control keyed by an opaque string
///
/// Returns `true` when the caller may proceed. A `false` return is the only failure
/// signal; implementations never error on the hot path.
pub trait RateLimiter: Send + Sync {
    fn try_acquire(&self, key: &str, permits: u32, window_seconds: u64) -> bool;
}

/// Per-key window state
#[derive(Debug, Clone, Copy)]
struct RateBucket {
    window_start: Duration,
    window: Duration,
    count: u32,
}

impl RateBucket {
    fn new(now: Duration, window: Duration) -> Self {
        Self {
            window_start: now,
            window,
            count: 0,
        }
    }

    fn is_expired(&self, now: Duration) -> bool {
        now.saturating_sub(self.window_start) >= self.window
    }

    /// Check-and-increment; the caller holds the bucket exclusively.
    fn admit(&mut self, now: Duration, permits: u32, window: Duration) -> bool {
        self.window = window;
        if self.is_expired(now) {
            self.window_start = now;
            self.count = 0;
        }
        if self.count < permits {
            self.count += 1;
            true
        } else {
            false
        }
    }
}

/// In-memory fixed-window limiter
///
/// Each key owns one bucket `{window_start, count}`. The bucket is created on first use and
/// reset the first time it is touched after its window elapsed. Check-and-increment runs
/// under the key's shard lock, so concurrent callers on one key are admitted exactly
/// `permits` times per window, and unrelated keys only contend when they hash to the same
/// shard.
///
/// The number of buckets is bounded by `max_keys`: when a new key arrives at the bound,
/// expired buckets are swept first and, failing that, the bucket with the oldest window is
/// evicted. Concurrent first-time inserts may overshoot the bound by the number of
/// concurrent inserters.
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    buckets: DashMap<String, RateBucket>,
    clock: Arc<dyn Clock>,
    config: RateLimiterConfig,
    metrics: RateLimiterMetrics,
}

impl FixedWindowRateLimiter {
    /// Create a limiter driven by the system clock
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create a limiter driven by a custom time source
    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
            config,
            metrics: RateLimiterMetrics::new(),
        }
    }

    /// Try to take one permit for `key` within a window of the given length
    pub fn try_acquire_window(&self, key: &str, permits: u32, window: Duration) -> bool {
        if permits == 0 {
            self.metrics.record_rejected();
            return false;
        }

        let now = self.clock.now();

        // Fast path: existing bucket, no allocation
        let admitted = if let Some(mut bucket) = self.buckets.get_mut(key) {
            bucket.admit(now, permits, window)
        } else {
            if self.buckets.len() >= self.config.max_keys {
                self.make_room(now);
            }
            let admitted = match self.buckets.entry(key.to_owned()) {
                Entry::Occupied(mut occupied) => occupied.get_mut().admit(now, permits, window),
                Entry::Vacant(vacant) => {
                    let mut bucket = RateBucket::new(now, window);
                    let admitted = bucket.admit(now, permits, window);
                    vacant.insert(bucket);
                    admitted
                }
            };
            self.metrics.set_keys(self.buckets.len());
            admitted
        };

        if admitted {
            self.metrics.record_admitted();
        } else {
            self.metrics.record_rejected();
            tracing::trace!(
                key,
                permits,
                window_ms = window.as_millis() as u64,
                "rate limit hit"
            );
        }
        admitted
    }

    /// Remove every bucket whose window has elapsed
    ///
    /// Returns the number of buckets removed.
    pub fn sweep_expired(&self) -> usize {
        let removed = self.sweep_expired_at(self.clock.now());
        self.metrics.set_keys(self.buckets.len());
        removed
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    pub fn stats(&self) -> RateLimiterStats {
        self.metrics.snapshot()
    }

    /// Run `sweep_expired` every `sweep_interval` until `shutdown` is cancelled
    pub fn spawn_sweeper(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let period = self.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.sweep_expired();
                        if removed > 0 {
                            let remaining = self.len();
                            tracing::debug!(removed, remaining, "swept expired rate buckets");
                        }
                    }
                }
            }
            tracing::debug!("rate limiter sweeper stopped");
        })
    }

    fn sweep_expired_at(&self, now: Duration) -> usize {
        let mut removed = 0usize;
        self.buckets.retain(|_, bucket| {
            let keep = !bucket.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.metrics.record_evicted(removed as u64);
        removed
    }

    /// Free at least one slot for a new key. Must not be called while holding a bucket guard.
    fn make_room(&self, now: Duration) {
        if self.sweep_expired_at(now) > 0 && self.buckets.len() < self.config.max_keys {
            return;
        }

        let oldest = self
            .buckets
            .iter()
            .min_by_key(|entry| entry.value().window_start)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            if self.buckets.remove(&key).is_some() {
                self.metrics.record_evicted(1);
                tracing::debug!(key = %key, "evicted oldest rate bucket");
            }
        }
    }
}

impl Default for FixedWindowRateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn try_acquire(&self, key: &str, permits: u32, window_seconds: u64) -> bool {
        self.try_acquire_window(key, permits, Duration::from_secs(window_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    fn manual_limiter(max_keys: usize) -> (FixedWindowRateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = FixedWindowRateLimiter::with_clock(
            RateLimiterConfig::with_max_keys(max_keys),
            clock.clone(),
        );
        (limiter, clock)
    }

    #[test]
    fn test_allows_up_to_permits_then_rejects() {
        let limiter = FixedWindowRateLimiter::default();
        let key = "cmd:foo:global";

        assert!(limiter.try_acquire(key, 3, 60));
        assert!(limiter.try_acquire(key, 3, 60));
        assert!(limiter.try_acquire(key, 3, 60));
        assert!(!limiter.try_acquire(key, 3, 60));

        let stats = limiter.stats();
        assert_eq!(stats.admitted_total, 3);
        assert_eq!(stats.rejected_total, 1);
    }

    #[test]
    fn test_counter_resets_after_window() {
        let (limiter, clock) = manual_limiter(16);
        let key = "cmd:bar:global";

        assert!(limiter.try_acquire(key, 1, 1));
        assert!(!limiter.try_acquire(key, 1, 1));

        clock.advance(Duration::from_millis(1100));
        assert!(limiter.try_acquire(key, 1, 1));
        assert!(!limiter.try_acquire(key, 1, 1));
    }

    #[test]
    fn test_window_boundary_is_inclusive_of_elapsed() {
        let (limiter, clock) = manual_limiter(16);

        assert!(limiter.try_acquire("k", 1, 1));
        clock.advance(Duration::from_millis(999));
        assert!(!limiter.try_acquire("k", 1, 1));
        clock.advance(Duration::from_millis(1));
        assert!(limiter.try_acquire("k", 1, 1));
    }

    #[test]
    fn test_different_keys_do_not_affect_each_other() {
        let limiter = FixedWindowRateLimiter::default();
        let a = "cmd:ping:user:1";
        let b = "cmd:ping:user:2";

        assert!(limiter.try_acquire(a, 1, 60));
        assert!(limiter.try_acquire(b, 1, 60));

        assert!(!limiter.try_acquire(a, 1, 60));
        assert!(!limiter.try_acquire(b, 1, 60));
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_zero_permits_never_admits() {
        let limiter = FixedWindowRateLimiter::default();
        assert!(!limiter.try_acquire("k", 0, 60));
        assert!(!limiter.try_acquire("k", 0, 60));
        // No bucket is created for a call that can never succeed
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_concurrent_requests_honor_limit() {
        let limiter = FixedWindowRateLimiter::default();
        let key = "cmd:baz:user:9";
        let permits = 50u32;
        let threads = 200usize;

        let barrier = Barrier::new(threads);
        let admitted = AtomicUsize::new(0);
        let rejected = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|| {
                    barrier.wait();
                    if limiter.try_acquire(key, permits, 60) {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    } else {
                        rejected.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::Relaxed), permits as usize);
        assert_eq!(rejected.load(Ordering::Relaxed), threads - permits as usize);
    }

    #[test]
    fn test_concurrent_keys_each_get_their_own_permits() {
        let limiter = FixedWindowRateLimiter::default();
        let keys = ["chat:1", "chat:2", "chat:3", "chat:4"];
        let per_key: Vec<AtomicUsize> = keys.iter().map(|_| AtomicUsize::new(0)).collect();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        for (i, key) in keys.iter().enumerate() {
                            if limiter.try_acquire(key, 10, 60) {
                                per_key[i].fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                });
            }
        });

        for count in &per_key {
            assert_eq!(count.load(Ordering::Relaxed), 10);
        }
    }

    #[test]
    fn test_max_keys_evicts_oldest_window() {
        let (limiter, clock) = manual_limiter(3);

        assert!(limiter.try_acquire("a", 1, 60));
        clock.advance(Duration::from_secs(1));
        assert!(limiter.try_acquire("b", 1, 60));
        clock.advance(Duration::from_secs(1));
        assert!(limiter.try_acquire("c", 1, 60));
        assert_eq!(limiter.len(), 3);

        clock.advance(Duration::from_secs(1));
        assert!(limiter.try_acquire("d", 1, 60));
        assert_eq!(limiter.len(), 3);
        assert_eq!(limiter.stats().evicted_total, 1);

        // "a" was the oldest window and starts over
        assert!(limiter.try_acquire("a", 1, 60));
        // "d" keeps its state
        assert!(!limiter.try_acquire("d", 1, 60));
    }

    #[test]
    fn test_max_keys_prefers_expired_buckets() {
        let (limiter, clock) = manual_limiter(2);

        assert!(limiter.try_acquire("short", 1, 1));
        assert!(limiter.try_acquire("long", 1, 600));

        clock.advance(Duration::from_secs(2));
        assert!(limiter.try_acquire("new", 1, 600));

        assert_eq!(limiter.len(), 2);
        // "long" survived because "short" had expired
        assert!(!limiter.try_acquire("long", 1, 600));
    }

    #[test]
    fn test_sweep_expired() {
        let (limiter, clock) = manual_limiter(100);

        for i in 0..10 {
            assert!(limiter.try_acquire(&format!("short:{i}"), 1, 1));
        }
        assert!(limiter.try_acquire("long", 1, 60));

        clock.advance(Duration::from_secs(2));
        assert_eq!(limiter.sweep_expired(), 10);
        assert_eq!(limiter.len(), 1);
        assert_eq!(limiter.stats().keys, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_stops_on_cancel() {
        let clock = Arc::new(ManualClock::new());
        let config = RateLimiterConfig {
            max_keys: 100,
            sweep_interval_ms: 1_000,
        };
        let limiter = Arc::new(FixedWindowRateLimiter::with_clock(config, clock.clone()));

        assert!(limiter.try_acquire("k", 1, 1));
        clock.advance(Duration::from_secs(5));

        let token = CancellationToken::new();
        let handle = limiter.clone().spawn_sweeper(token.clone());

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(limiter.is_empty());

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_survives_zero_interval() {
        let clock = Arc::new(ManualClock::new());
        let config = RateLimiterConfig {
            max_keys: 100,
            sweep_interval_ms: 0,
        };
        let limiter = Arc::new(FixedWindowRateLimiter::with_clock(config, clock.clone()));

        assert!(limiter.try_acquire("k", 1, 1));
        clock.advance(Duration::from_secs(5));

        let token = CancellationToken::new();
        let handle = limiter.clone().spawn_sweeper(token.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(limiter.is_empty());
        assert!(!handle.is_finished());

        token.cancel();
        handle.await.unwrap();
    }

    proptest! {
        #[test]
        fn prop_sequential_admissions_match_permits(permits in 0u32..64, calls in 0usize..128) {
            let limiter = FixedWindowRateLimiter::default();
            let admitted = (0..calls).filter(|_| limiter.try_acquire("k", permits, 60)).count();
            prop_assert_eq!(admitted, calls.min(permits as usize));
        }
    }
}
