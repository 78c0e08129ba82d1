//! Service configuration management

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use event_bus::BusConfig;
use rate_limiter::RateLimiterConfig;
use update_ingestion::{EndpointConfig, SessionConfig};

/// Prefix for environment overrides, e.g. `BOT__SESSION__QUEUE_CAPACITY=500`
pub const ENV_PREFIX: &str = "BOT";

/// Variable holding the bot token
pub const TOKEN_ENV: &str = "BOT_TOKEN";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// IngestionSession configuration
    pub session: SessionConfig,

    /// Update endpoint configuration
    pub endpoint: EndpointConfig,

    /// EventBus configuration
    pub bus: BusConfig,

    /// RateLimiter configuration
    pub rate_limiter: RateLimiterConfig,

    /// Admission limit applied per chat
    pub command_limit: CommandLimit,

    /// Service-level configuration
    pub service: ServiceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Fixed-window limit applied to inbound updates of each chat
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandLimit {
    pub permits: u32,
    pub window_seconds: u64,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve a Prometheus scrape endpoint
    pub enabled: bool,

    /// Metrics export port
    pub port: u16,
}

impl Default for CommandLimit {
    fn default() -> Self {
        Self {
            permits: 30,
            window_seconds: 60,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9000,
        }
    }
}

/// Load configuration from an optional TOML file and `BOT__` environment overrides
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    load_config_with_env(path, None)
}

/// Same as [`load_config`], reading overrides from `env` instead of the process environment
pub fn load_config_with_env(
    path: Option<&Path>,
    env: Option<HashMap<String, String>>,
) -> Result<ServiceConfig> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        tracing::debug!("Loading configuration from file: {:?}", path);
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(env),
    );

    let config: ServiceConfig = builder
        .build()
        .context("Failed to read configuration sources")?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    validate_config(&config)?;
    Ok(config)
}

/// Read the bot token from the environment
pub fn load_token() -> Result<String> {
    let token = std::env::var(TOKEN_ENV)
        .with_context(|| format!("{} must be set", TOKEN_ENV))?;
    if token.trim().is_empty() {
        return Err(anyhow::anyhow!("{} is empty", TOKEN_ENV));
    }
    Ok(token)
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    // Validate log level
    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow::anyhow!("Invalid log level: {}", config.logging.level)),
    }

    // Validate log format
    match config.logging.format.as_str() {
        "json" | "pretty" => {}
        _ => return Err(anyhow::anyhow!("Invalid log format: {}", config.logging.format)),
    }

    config
        .session
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid session configuration: {}", e))?;
    config
        .endpoint
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid endpoint configuration: {}", e))?;
    config
        .bus
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid bus configuration: {}", e))?;
    config
        .rate_limiter
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid rate limiter configuration: {}", e))?;

    if config.command_limit.window_seconds == 0 {
        return Err(anyhow::anyhow!("command_limit.window_seconds must be greater than zero"));
    }
    if config.metrics.enabled && config.metrics.port == 0 {
        return Err(anyhow::anyhow!("Invalid metrics port: {}", config.metrics.port));
    }

    Ok(())
}

/// Render the effective configuration as TOML
pub fn render_config(config: &ServiceConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to render configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env() -> Option<HashMap<String, String>> {
        Some(HashMap::new())
    }

    #[test]
    fn test_defaults() {
        let config = load_config_with_env(None, no_env()).unwrap();
        assert_eq!(config.session.queue_capacity, 1000);
        assert_eq!(config.bus.capacity, 1000);
        assert_eq!(config.rate_limiter.max_keys, 10_000);
        assert_eq!(config.command_limit.permits, 30);
        assert_eq!(config.logging.level, "info");
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_file_then_env_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[session]
queue_capacity = 50

[command_limit]
permits = 3
window_seconds = 10

[logging]
format = "json"
"#
        )
        .unwrap();

        let env = HashMap::from([
            ("BOT__SESSION__QUEUE_CAPACITY".to_string(), "75".to_string()),
            ("BOT__LOGGING__LEVEL".to_string(), "debug".to_string()),
        ]);

        let config = load_config_with_env(Some(file.path()), Some(env)).unwrap();
        assert_eq!(config.session.queue_capacity, 75);
        assert_eq!(config.session.enqueue_timeout_ms, 100);
        assert_eq!(config.command_limit.permits, 3);
        assert_eq!(config.command_limit.window_seconds, 10);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_zero_sweep_interval_is_rejected() {
        let key = "BOT__RATE_LIMITER__SWEEP_INTERVAL_MS".to_string();
        let env = HashMap::from([(key, "0".to_string())]);
        let result = load_config_with_env(None, Some(env));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = load_config_with_env(Some(Path::new("/nonexistent/bot.toml")), no_env());
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = ServiceConfig::default();
        assert!(validate_config(&config).is_ok());

        config.logging.level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = ServiceConfig::default();
        config.bus.capacity = 0;
        assert!(validate_config(&config).is_err());

        let mut config = ServiceConfig::default();
        config.command_limit.window_seconds = 0;
        assert!(validate_config(&config).is_err());

        let mut config = ServiceConfig::default();
        config.rate_limiter.sweep_interval_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_render_round_trips_through_loader() {
        let mut config = ServiceConfig::default();
        config.command_limit.permits = 7;
        let rendered = render_config(&config).unwrap();

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(rendered.as_bytes()).unwrap();

        let loaded = load_config_with_env(Some(file.path()), no_env()).unwrap();
        assert_eq!(loaded.command_limit.permits, 7);
    }
}
