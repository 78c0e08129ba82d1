//! # EventBus
//!
//! In-process publish/subscribe used as the integration seam between the update pipeline
//! and everything that reacts to it (command handling, security interceptors, audit,
//! observability).
//!
//! Producers publish typed events into a bounded buffer and get an immediate
//! `CapacityExceeded` error when it is full. A single dedicated dispatch thread drains the
//! buffer and invokes every handler interested in the event:
//!
//! - handlers subscribed to the event's exact type,
//! - handlers subscribed to one of the event type's declared categories,
//! - handlers subscribed to all events.
//!
//! A failing or panicking handler is logged and isolated from its siblings.

pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pool;
mod registry;


pub use bus::{EventBus, PublishHandle};
pub use config::BusConfig;
pub use error::{BusError, BusResult};
pub use event::{Category, Event, EventEnvelope, HandlerResult};
pub use metrics::{BusMetrics, BusStats};
pub use pool::WorkerPool;
pub use registry::SubscriptionHandle;

/// Default bounded buffer capacity
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default number of threads serving `publish_async`
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Default dispatch poll interval in milliseconds
pub const DEFAULT_DISPATCH_POLL_MS: u64 = 200;

/// Default bounded wait for shutdown in milliseconds
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;
