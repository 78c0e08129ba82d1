//! # UpdateIngestion
//!
//! Long-poll update ingestion for a bot runtime.
//!
//! An [`IngestionSession`] runs two independent tasks:
//!
//! - **poll cycle**: one long-poll request at a time against an [`UpdateSource`],
//!   de-duplicating by update id and retrying failures with exponential backoff;
//! - **drain loop**: delivers queued updates one at a time, in order, to an
//!   [`UpdateHandler`].
//!
//! The two are connected by a bounded queue. When the consumer falls behind, an update
//! waits a short bounded time for space and is then dropped and counted.

pub mod backoff;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod queue;
pub mod session;
pub mod source;
pub mod update;


pub use backoff::Backoff;
pub use config::{BackoffConfig, EndpointConfig, SessionConfig};
pub use error::{PollError, SessionError, SessionResult};
pub use handler::UpdateHandler;
pub use metrics::{SessionMetrics, SessionStats};
pub use queue::{EnqueueOutcome, UpdateQueue};
pub use session::IngestionSession;
pub use source::{HttpUpdateSource, UpdateSource};
pub use update::Update;

/// Default bounded queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default wait for queue space before an update is dropped
pub const DEFAULT_ENQUEUE_TIMEOUT_MS: u64 = 100;

/// Default drain loop poll interval
pub const DEFAULT_DEQUEUE_TIMEOUT_MS: u64 = 1000;

/// Default backoff unit
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;

/// Default backoff cap
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default bounded wait for stop
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;
