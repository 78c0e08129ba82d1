//! Bot Runtime Service Library
//!
//! Wires the update ingestion session, the event bus and the per-chat rate limiter
//! into one service, with configuration loading, logging and graceful shutdown.

use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod events;
pub mod exporter;
pub mod logging;
pub mod service;
pub mod signals;

pub use config::{load_token, render_config, ServiceConfig};
pub use events::{UpdateAdmitted, UpdateReceived, UpdateThrottled};
pub use exporter::install_metrics_exporter;
pub use logging::initialize_logging;
pub use service::{BotService, ServiceStats, TrafficStats};
pub use signals::{graceful_shutdown, setup_signal_handlers, ShutdownSignal};

/// Load configuration from an optional file and environment variables
pub fn load_configuration(path: Option<&Path>) -> Result<ServiceConfig> {
    config::load_config(path).context("Failed to load service configuration")
}
