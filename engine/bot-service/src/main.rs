//! Bot Runtime Service
//!
//! Long-polls the bot API for updates, publishes them on the event bus and applies
//! per-chat admission limits until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use bot_service::{
    config::validate_config, graceful_shutdown, initialize_logging, install_metrics_exporter,
    load_configuration, load_token, render_config, setup_signal_handlers, BotService,
};

/// Environment variable consulted when `--config` is absent
const CONFIG_ENV: &str = "BOT_CONFIG";

#[derive(Parser, Debug)]
#[command(name = "bot-service", version, about = "Bot update ingestion service")]
struct Cli {
    /// Path to a TOML configuration file (falls back to BOT_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config_path = cli
        .config
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let mut config = load_configuration(config_path.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
        validate_config(&config)?;
    }

    if cli.print_config {
        println!("{}", render_config(&config)?);
        return Ok(());
    }

    // Initialize logging first
    initialize_logging(&config.logging)?;

    info!("Starting Bot Service v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Configuration loaded from {}", path.display());
    }

    if config.metrics.enabled {
        install_metrics_exporter(&config.metrics)?;
    }

    let token = load_token()?;
    let mut service = BotService::new(config, token)
        .context("Failed to create service")?;

    // Setup signal handlers for graceful shutdown
    let mut shutdown_signal = setup_signal_handlers()?;
    info!("Signal handlers configured");

    service.start()?;
    info!("Bot Service is running. Press Ctrl+C to shutdown gracefully.");

    match shutdown_signal.recv().await {
        Some(signal) => info!(
            "Shutdown signal received ({:?}). Initiating graceful shutdown...",
            signal
        ),
        None => info!("Signal handlers exited. Initiating graceful shutdown..."),
    }
    graceful_shutdown(&mut service).await?;

    info!("Bot Service shutdown complete");
    Ok(())
}
