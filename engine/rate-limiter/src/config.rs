//! Configuration for the RateLimiter

use crate::{DEFAULT_MAX_KEYS, DEFAULT_SWEEP_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the in-memory fixed-window limiter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Maximum number of buckets kept in memory before eviction kicks in
    pub max_keys: usize,

    /// Interval between background sweeps of expired buckets in milliseconds
    pub sweep_interval_ms: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_keys: DEFAULT_MAX_KEYS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl RateLimiterConfig {
    /// Config with a custom key bound and the default sweep interval
    pub fn with_max_keys(max_keys: usize) -> Self {
        Self {
            max_keys,
            ..Default::default()
        }
    }

    /// Get sweep interval as Duration, never shorter than 1ms
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_keys == 0 {
            return Err("max_keys must be greater than zero".to_string());
        }
        if self.sweep_interval_ms == 0 {
            return Err("sweep_interval_ms must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.max_keys, 10_000);
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RateLimiterConfig = serde_json::from_str(r#"{"max_keys": 16}"#).unwrap();
        assert_eq!(config.max_keys, 16);
        assert_eq!(config.sweep_interval_ms, DEFAULT_SWEEP_INTERVAL_MS);
    }

    #[test]
    fn test_config_validation() {
        let config = RateLimiterConfig {
            max_keys: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RateLimiterConfig {
            sweep_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.sweep_interval(), Duration::from_millis(1));
    }
}
