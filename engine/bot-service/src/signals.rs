//! Signal handling for graceful shutdown

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::service::BotService;

/// Signal that triggered shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

/// Setup signal handlers for graceful shutdown
///
/// The receiver yields the first signal observed.
pub fn setup_signal_handlers() -> Result<mpsc::Receiver<ShutdownSignal>> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel(2);

    // Handle Ctrl+C (SIGINT)
    let interrupt_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C signal: {}", e);
            return;
        }

        info!("Ctrl+C signal received");
        let _ = interrupt_tx.send(ShutdownSignal::Interrupt).await;
    });

    // Handle SIGTERM (Unix only)
    #[cfg(unix)]
    {
        use signal_hook::consts::SIGTERM;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;
        use std::time::Duration;

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, shutdown_flag.clone())
            .context("Failed to register SIGTERM handler")?;

        tokio::spawn(async move {
            // Poll for signal
            loop {
                if shutdown_flag.load(Ordering::Relaxed) {
                    info!("SIGTERM signal received");
                    let _ = shutdown_tx.send(ShutdownSignal::Terminate).await;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });
    }

    Ok(shutdown_rx)
}

/// Graceful shutdown handler
pub async fn graceful_shutdown(service: &mut BotService) -> Result<()> {
    info!("Starting graceful shutdown...");
    service.shutdown().await.context("Service shutdown failed")
}
