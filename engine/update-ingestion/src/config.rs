//! Configuration for an ingestion session and its update endpoint

use crate::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_MS, DEFAULT_DEQUEUE_TIMEOUT_MS,
    DEFAULT_ENQUEUE_TIMEOUT_MS, DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue, timing and backoff settings for an IngestionSession
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of updates waiting for the callback
    pub queue_capacity: usize,

    /// How long the poll task waits for queue space before dropping an update
    pub enqueue_timeout_ms: u64,

    /// How long the drain loop waits for an update before re-checking for shutdown
    pub dequeue_timeout_ms: u64,

    /// Retry delay after failed polls
    pub backoff: BackoffConfig,

    /// Bounded wait for both tasks on stop
    pub shutdown_timeout_ms: u64,
}

/// Exponential backoff between failed polls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Backoff unit; the delay after the first failure is twice this
    pub base_ms: u64,

    /// Upper bound for the delay
    pub max_ms: u64,
}

/// Remote long-poll endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub base_url: String,

    /// Long-poll timeout passed to the server
    pub poll_timeout_secs: u64,

    /// Maximum number of updates per response
    pub limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            enqueue_timeout_ms: DEFAULT_ENQUEUE_TIMEOUT_MS,
            dequeue_timeout_ms: DEFAULT_DEQUEUE_TIMEOUT_MS,
            backoff: BackoffConfig::default(),
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_BACKOFF_BASE_MS,
            max_ms: DEFAULT_BACKOFF_MAX_MS,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 50,
            limit: 100,
        }
    }
}

impl SessionConfig {
    /// Get enqueue timeout as Duration
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    /// Get dequeue timeout as Duration
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than zero".to_string());
        }
        if self.dequeue_timeout_ms == 0 {
            return Err("dequeue_timeout_ms must be greater than zero".to_string());
        }
        self.backoff.validate()
    }
}

impl BackoffConfig {
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_ms == 0 {
            return Err("backoff.base_ms must be greater than zero".to_string());
        }
        if self.max_ms < self.base_ms {
            return Err("backoff.max_ms must not be below backoff.base_ms".to_string());
        }
        Ok(())
    }
}

impl EndpointConfig {
    /// HTTP timeout for one long-poll request, a little above the server-side timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs + 5)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("endpoint.base_url must not be empty".to_string());
        }
        if self.limit == 0 {
            return Err("endpoint.limit must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.queue_capacity, 1000);
        assert_eq!(config.enqueue_timeout(), Duration::from_millis(100));
        assert_eq!(config.dequeue_timeout(), Duration::from_secs(1));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.backoff.base(), Duration::from_secs(1));
        assert_eq!(config.backoff.max(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_config_default() {
        let endpoint = EndpointConfig::default();
        assert_eq!(endpoint.base_url, "https://api.telegram.org");
        assert_eq!(endpoint.request_timeout(), Duration::from_secs(55));
        assert!(endpoint.validate().is_ok());
    }

    #[test]
    fn test_session_config_validation() {
        let config = SessionConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SessionConfig {
            backoff: BackoffConfig {
                base_ms: 2000,
                max_ms: 1000,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let json = r#"{"queue_capacity": 2, "backoff": {"max_ms": 5000}}"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.queue_capacity, 2);
        assert_eq!(config.enqueue_timeout_ms, 100);
        assert_eq!(config.backoff.base_ms, 1000);
        assert_eq!(config.backoff.max_ms, 5000);
    }
}
