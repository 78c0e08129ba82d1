//! # RateLimiter
//!
//! Per-key admission control over fixed time windows.
//!
//! Call sites that perform gated or side-effecting operations (sending messages, running
//! commands) ask the limiter before acting. The limiter only ever answers `true` or `false`;
//! the caller decides what a denial means (reject, queue, notify).
//!
//! - **FixedWindowRateLimiter**: in-memory implementation backed by a sharded map
//! - **Clock**: pluggable time source so window expiry can be tested deterministically
//! - **RateLimiterConfig**: bounded key cardinality and background sweep cadence

pub mod clock;
pub mod config;
pub mod limiter;
pub mod metrics;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RateLimiterConfig;
pub use limiter::{FixedWindowRateLimiter, RateLimiter};
pub use metrics::{RateLimiterMetrics, RateLimiterStats};

/// Default maximum number of tracked keys
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// Default interval between background sweeps of expired buckets
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;
