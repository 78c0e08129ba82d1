//! Configuration for the EventBus

use crate::{DEFAULT_CAPACITY, DEFAULT_WORKER_THREADS};
use crate::{DEFAULT_DISPATCH_POLL_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an EventBus instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Maximum number of events buffered between publishers and the dispatch thread
    pub capacity: usize,

    /// Number of threads in the pool serving `publish_async`
    pub worker_threads: usize,

    /// How long the dispatch thread waits for an event before re-checking liveness
    pub dispatch_poll_ms: u64,

    /// Bounded wait for the worker pool and the dispatch thread on shutdown
    pub shutdown_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            worker_threads: DEFAULT_WORKER_THREADS,
            dispatch_poll_ms: DEFAULT_DISPATCH_POLL_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl BusConfig {
    /// Get dispatch poll interval as Duration
    pub fn dispatch_poll(&self) -> Duration {
        Duration::from_millis(self.dispatch_poll_ms)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("capacity must be greater than zero".to_string());
        }
        if self.worker_threads == 0 {
            return Err("worker_threads must be greater than zero".to_string());
        }
        if self.dispatch_poll_ms == 0 {
            return Err("dispatch_poll_ms must be greater than zero".to_string());
        }
        Ok(())
    }
}
