//! Prometheus scrape endpoint

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::config::MetricsConfig;

/// Install the global recorder and serve `/metrics` on the configured port
///
/// Must be called from within a tokio runtime.
pub fn install_metrics_exporter(config: &MetricsConfig) -> Result<()> {
    let address = SocketAddr::from(([0, 0, 0, 0], config.port));
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics exporter listening on {}", address);
    Ok(())
}
