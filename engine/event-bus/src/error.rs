//! Error types for the EventBus

use thiserror::Error;

/// Result type for EventBus operations
pub type BusResult<T> = Result<T, BusError>;

/// Errors that can occur in the EventBus
#[derive(Error, Debug)]
pub enum BusError {
    /// The bounded buffer is full; the event was not accepted
    #[error("Back-pressure: event buffer full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    /// The bus was shut down; publish and subscribe are no longer allowed
    #[error("EventBus already shut down")]
    ShutDown,

    /// The async publish pool no longer accepts work
    #[error("Worker pool closed")]
    WorkerPoolClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl BusError {
    /// Precondition violations are programmer errors, as opposed to transient backpressure
    pub fn is_precondition(&self) -> bool {
        matches!(self, BusError::ShutDown | BusError::InvalidConfig(_))
    }
}
