//! Service state management and component wiring
//!
//! Updates flow from the ingestion session onto the event bus as `UpdateReceived`.
//! An admission subscriber checks the per-chat limit and publishes either
//! `UpdateAdmitted` or `UpdateThrottled`; category subscribers count and log traffic.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CommandLimit, ServiceConfig};
use crate::events::{UpdateAdmitted, UpdateReceived, UpdateThrottled, ADMISSION, INBOUND};
use event_bus::{BusStats, EventBus, HandlerResult};
use rate_limiter::{FixedWindowRateLimiter, RateLimiter, RateLimiterStats};
use update_ingestion::{IngestionSession, SessionStats, Update, UpdateSource};

/// Traffic counters maintained by the category subscribers
#[derive(Debug, Default)]
struct TrafficCounters {
    inbound: AtomicU64,
    admitted: AtomicU64,
    throttled: AtomicU64,
    unrouted: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficStats {
    pub inbound: u64,
    pub admitted: u64,
    pub throttled: u64,
    /// Updates without a chat, which bypass admission
    pub unrouted: u64,
}

/// Snapshot of every component's counters
#[derive(Debug, Clone, Copy)]
pub struct ServiceStats {
    pub session: SessionStats,
    pub bus: BusStats,
    pub limiter: RateLimiterStats,
    pub traffic: TrafficStats,
}

/// The running bot: ingestion session, event bus and rate limiter
pub struct BotService {
    config: ServiceConfig,
    bus: Arc<EventBus>,
    limiter: Arc<FixedWindowRateLimiter>,
    session: IngestionSession,
    traffic: Arc<TrafficCounters>,
    sweeper_shutdown: CancellationToken,
    sweeper: Option<JoinHandle<()>>,
}

impl BotService {
    /// Service polling the configured endpoint with `token`
    pub fn new(config: ServiceConfig, token: String) -> Result<Self> {
        let service = Self::build(config)?;
        service
            .session
            .set_endpoint(service.config.endpoint.clone())
            .context("Failed to configure endpoint")?;
        service
            .session
            .set_token(token)
            .context("Failed to configure token")?;
        Ok(service)
    }

    /// Service reading updates from a custom source
    pub fn with_source(config: ServiceConfig, source: Arc<dyn UpdateSource>) -> Result<Self> {
        let service = Self::build(config)?;
        service
            .session
            .set_source(source)
            .context("Failed to configure update source")?;
        Ok(service)
    }

    fn build(config: ServiceConfig) -> Result<Self> {
        info!("Initializing service components...");

        let bus = EventBus::new(config.bus.clone())
            .context("Failed to create EventBus")?;
        let bus = Arc::new(bus);
        let limiter = Arc::new(FixedWindowRateLimiter::new(config.rate_limiter.clone()));
        let traffic = Arc::new(TrafficCounters::default());

        register_subscribers(&bus, &limiter, &config.command_limit, &traffic)
            .context("Failed to register subscribers")?;

        let session = IngestionSession::new(config.session.clone());
        let publisher = bus.clone();
        session
            .set_callback(move |update: Update| -> anyhow::Result<()> {
                publisher.publish(UpdateReceived { update })?;
                Ok(())
            })
            .context("Failed to configure update callback")?;

        info!("Service components initialized successfully");
        Ok(Self {
            config,
            bus,
            limiter,
            session,
            traffic,
            sweeper_shutdown: CancellationToken::new(),
            sweeper: None,
        })
    }

    /// Start polling and the rate limiter sweeper; must run inside a tokio runtime
    pub fn start(&mut self) -> Result<()> {
        self.session
            .start()
            .context("Failed to start IngestionSession")?;

        let limiter = self.limiter.clone();
        self.sweeper = Some(limiter.spawn_sweeper(self.sweeper_shutdown.clone()));
        info!("Service started");
        Ok(())
    }

    /// Stop every component, each with a bounded wait
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Stopping service components...");
        let shutdown_timeout = Duration::from_secs(self.config.service.shutdown_timeout_secs);

        // Stop ingestion first so nothing new reaches the bus
        match timeout(shutdown_timeout, self.session.stop()).await {
            Ok(Ok(())) => info!("IngestionSession stopped gracefully"),
            Ok(Err(e)) => warn!("IngestionSession was not running: {}", e),
            Err(_) => warn!("IngestionSession did not stop within timeout, forcing shutdown"),
        }

        let bus = self.bus.clone();
        let bus_shutdown = tokio::task::spawn_blocking(move || bus.shutdown());
        match timeout(shutdown_timeout, bus_shutdown).await {
            Ok(Ok(())) => info!("EventBus stopped gracefully"),
            Ok(Err(e)) => error!("EventBus shutdown task failed: {}", e),
            Err(_) => warn!("EventBus did not stop within timeout"),
        }

        self.sweeper_shutdown.cancel();
        if let Some(sweeper) = self.sweeper.take() {
            match timeout(shutdown_timeout, sweeper).await {
                Ok(Ok(())) => debug!("RateLimiter sweeper stopped"),
                Ok(Err(e)) => error!("RateLimiter sweeper task failed: {}", e),
                Err(_) => warn!("RateLimiter sweeper did not stop within timeout"),
            }
        }

        let stats = self.stats();
        info!(
            delivered = stats.session.delivered_total,
            dropped = stats.session.dropped_total,
            admitted = stats.traffic.admitted,
            throttled = stats.traffic.throttled,
            "Graceful shutdown complete"
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running() && self.bus.is_alive()
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            session: self.session.stats(),
            bus: self.bus.stats(),
            limiter: self.limiter.stats(),
            traffic: TrafficStats {
                inbound: self.traffic.inbound.load(Ordering::Relaxed),
                admitted: self.traffic.admitted.load(Ordering::Relaxed),
                throttled: self.traffic.throttled.load(Ordering::Relaxed),
                unrouted: self.traffic.unrouted.load(Ordering::Relaxed),
            },
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn limiter(&self) -> &Arc<FixedWindowRateLimiter> {
        &self.limiter
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

fn register_subscribers(
    bus: &Arc<EventBus>,
    limiter: &Arc<FixedWindowRateLimiter>,
    limit: &CommandLimit,
    traffic: &Arc<TrafficCounters>,
) -> Result<()> {
    // Per-chat admission. A weak handle avoids the bus owning itself through its registry.
    let weak_bus = Arc::downgrade(bus);
    let admission_limiter = limiter.clone();
    let limit = limit.clone();
    let counters = traffic.clone();
    bus.subscribe(move |event: &UpdateReceived| -> HandlerResult {
        let Some(chat_id) = event.update.chat_id() else {
            counters.unrouted.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };
        let Some(bus) = weak_bus.upgrade() else {
            return Ok(());
        };

        let key = format!("chat:{chat_id}");
        if admission_limiter.try_acquire(&key, limit.permits, limit.window_seconds) {
            bus.publish(UpdateAdmitted {
                update: event.update.clone(),
                chat_id,
            })?;
        } else {
            bus.publish(UpdateThrottled {
                update_id: event.update.update_id,
                chat_id,
            })?;
        }
        Ok(())
    })?;

    let counters = traffic.clone();
    bus.subscribe_category(INBOUND, move |envelope| {
        counters.inbound.fetch_add(1, Ordering::Relaxed);
        if let Some(received) = envelope.downcast_ref::<UpdateReceived>() {
            debug!(
                update_id = received.update.update_id,
                kind = received.update.kind().unwrap_or("unknown"),
                "Inbound update"
            );
        }
        Ok(())
    })?;

    let counters = traffic.clone();
    bus.subscribe_category(ADMISSION, move |envelope| {
        if let Some(admitted) = envelope.downcast_ref::<UpdateAdmitted>() {
            counters.admitted.fetch_add(1, Ordering::Relaxed);
            if let Some(command) = admitted.command() {
                info!(chat_id = admitted.chat_id, command, "Command received");
            }
        } else if let Some(throttled) = envelope.downcast_ref::<UpdateThrottled>() {
            counters.throttled.fetch_add(1, Ordering::Relaxed);
            warn!(
                chat_id = throttled.chat_id,
                update_id = throttled.update_id,
                "Chat throttled"
            );
        }
        Ok(())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use update_ingestion::PollError;

    struct OneShotSource {
        batch: Mutex<Option<Vec<Update>>>,
    }

    #[async_trait]
    impl UpdateSource for OneShotSource {
        async fn poll(&self, _offset: i64) -> Result<Vec<Update>, PollError> {
            let batch = self.batch.lock().unwrap().take();
            match batch {
                Some(updates) => Ok(updates),
                None => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    fn message(update_id: i64, chat_id: i64, text: &str) -> Update {
        Update::new(
            update_id,
            json!({"message": {"chat": {"id": chat_id}, "from": {"id": 7}, "text": text}}),
        )
    }

    fn test_config(permits: u32) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.command_limit.permits = permits;
        config.session.dequeue_timeout_ms = 20;
        config.bus.dispatch_poll_ms = 10;
        config.service.shutdown_timeout_secs = 2;
        config
    }

    async fn wait_until(condition: impl Fn() -> bool) -> bool {
        for _ in 0..1000 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_updates_flow_through_admission() {
        let mut batch: Vec<Update> = (1..=5).map(|id| message(id, 1, "/start")).collect();
        batch.push(message(6, 2, "hello"));
        batch.push(Update::new(7, json!({"poll": {"id": "p1"}})));
        let source = Arc::new(OneShotSource {
            batch: Mutex::new(Some(batch)),
        });

        let mut service = BotService::with_source(test_config(2), source).unwrap();
        service.start().unwrap();
        assert!(service.is_running());

        assert!(
            wait_until(|| {
                let traffic = service.stats().traffic;
                traffic.admitted + traffic.throttled + traffic.unrouted == 7
            })
            .await
        );

        service.shutdown().await.unwrap();
        assert!(!service.is_running());

        let stats = service.stats();
        assert_eq!(stats.traffic.inbound, 7);
        assert_eq!(stats.traffic.admitted, 3);
        assert_eq!(stats.traffic.throttled, 2);
        assert_eq!(stats.traffic.unrouted, 1);
        assert_eq!(stats.session.delivered_total, 7);
        assert_eq!(stats.limiter.admitted_total, 3);
        assert_eq!(stats.limiter.rejected_total, 2);
        assert!(!service.bus().is_alive());
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let source = Arc::new(OneShotSource {
            batch: Mutex::new(None),
        });
        let mut service = BotService::with_source(test_config(1), source).unwrap();
        service.shutdown().await.unwrap();
        assert!(!service.bus().is_alive());
    }
}
