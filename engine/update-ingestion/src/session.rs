//! IngestionSession: poll cycle, bounded queue and drain loop
//!
//! The poll task owns the update cursor and issues one long-poll at a time. New
//! updates go through a bounded queue to the drain task, which hands them to the
//! callback one by one on the blocking pool.

use crate::backoff::Backoff;
use crate::config::{EndpointConfig, SessionConfig};
use crate::error::{SessionError, SessionResult};
use crate::handler::UpdateHandler;
use crate::metrics::{SessionMetrics, SessionStats};
use crate::queue::{Next, UpdateConsumer, UpdateProducer, UpdateQueue};
use crate::source::{HttpUpdateSource, UpdateSource};
use crate::update::Update;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Values that may each be set exactly once before start
#[derive(Default)]
struct Slots {
    endpoint: Option<EndpointConfig>,
    token: Option<String>,
    callback: Option<Arc<dyn UpdateHandler>>,
    source: Option<Arc<dyn UpdateSource>>,
}

enum Lifecycle {
    Configuring,
    Running(Tasks),
    Stopped,
}

struct Tasks {
    cancel: CancellationToken,
    poll: JoinHandle<()>,
    drain: JoinHandle<()>,
}

/// Observed by both tasks and by the session's getters
#[derive(Default)]
struct Shared {
    running: AtomicBool,
    last_update_id: AtomicI64,
    metrics: Arc<SessionMetrics>,
}

/// Long-poll ingestion session
///
/// Configured once, started once, stopped once. A stopped session cannot be restarted.
pub struct IngestionSession {
    config: SessionConfig,
    runtime: Option<Handle>,
    slots: Mutex<Slots>,
    lifecycle: Mutex<Lifecycle>,
    shared: Arc<Shared>,
}

impl IngestionSession {
    /// Create a session that runs on the runtime current at `start()`
    pub fn new(config: SessionConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a session whose tasks are spawned on `runtime`
    pub fn with_runtime(config: SessionConfig, runtime: Handle) -> Self {
        Self::build(config, Some(runtime))
    }

    fn build(config: SessionConfig, runtime: Option<Handle>) -> Self {
        Self {
            config,
            runtime,
            slots: Mutex::new(Slots::default()),
            lifecycle: Mutex::new(Lifecycle::Configuring),
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn set_endpoint(&self, endpoint: EndpointConfig) -> SessionResult<()> {
        set_once(&mut self.slots.lock().endpoint, endpoint, "endpoint")
    }

    pub fn set_token(&self, token: impl Into<String>) -> SessionResult<()> {
        set_once(&mut self.slots.lock().token, token.into(), "token")
    }

    pub fn set_callback<H>(&self, handler: H) -> SessionResult<()>
    where
        H: UpdateHandler + 'static,
    {
        let handler: Arc<dyn UpdateHandler> = Arc::new(handler);
        set_once(&mut self.slots.lock().callback, handler, "callback")
    }

    /// Use a custom source instead of the HTTP endpoint
    pub fn set_source(&self, source: Arc<dyn UpdateSource>) -> SessionResult<()> {
        set_once(&mut self.slots.lock().source, source, "source")
    }

    /// Launch the poll task and the drain task
    pub fn start(&self) -> SessionResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        if !matches!(*lifecycle, Lifecycle::Configuring) {
            return Err(SessionError::AlreadyStarted);
        }

        self.config.validate().map_err(SessionError::InvalidConfig)?;

        let (callback, source) = {
            let slots = self.slots.lock();
            let callback = slots
                .callback
                .clone()
                .ok_or(SessionError::MissingConfiguration("callback"))?;
            let source = match &slots.source {
                Some(source) => source.clone(),
                None => {
                    let endpoint = slots
                        .endpoint
                        .clone()
                        .ok_or(SessionError::MissingConfiguration("endpoint"))?;
                    let token = slots
                        .token
                        .clone()
                        .ok_or(SessionError::MissingConfiguration("token"))?;
                    endpoint.validate().map_err(SessionError::InvalidConfig)?;
                    Arc::new(HttpUpdateSource::new(endpoint, token)?) as Arc<dyn UpdateSource>
                }
            };
            (callback, source)
        };

        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => Handle::try_current().map_err(|_| SessionError::NoRuntime)?,
        };

        let (producer, consumer) = UpdateQueue::bounded(
            self.config.queue_capacity,
            self.config.enqueue_timeout(),
            self.shared.metrics.clone(),
        );
        let cancel = CancellationToken::new();

        self.shared.running.store(true, Ordering::Release);

        let poll = runtime.spawn(poll_loop(
            source,
            producer,
            self.shared.clone(),
            Backoff::new(&self.config.backoff),
            cancel.clone(),
        ));
        let drain = runtime.spawn(drain_loop(
            consumer,
            callback,
            self.shared.clone(),
            self.config.dequeue_timeout(),
        ));

        *lifecycle = Lifecycle::Running(Tasks {
            cancel,
            poll,
            drain,
        });
        info!(
            "[IngestionSession] started (queue capacity: {})",
            self.config.queue_capacity
        );
        Ok(())
    }

    /// Stop polling, let the drain loop deliver what is queued, then wait for both tasks
    ///
    /// Tasks still running after the shutdown timeout are aborted.
    pub async fn stop(&self) -> SessionResult<()> {
        let tasks = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(tasks) => tasks,
                other => {
                    *lifecycle = other;
                    return Err(SessionError::NotRunning);
                }
            }
        };

        info!("[IngestionSession] stopping");
        self.shared.running.store(false, Ordering::Release);
        tasks.cancel.cancel();

        let deadline = Instant::now() + self.config.shutdown_timeout();
        join_or_abort("poll", tasks.poll, deadline).await;
        join_or_abort("drain", tasks.drain, deadline).await;

        let stats = self.stats();
        info!(
            delivered = stats.delivered_total,
            dropped = stats.dropped_total,
            "[IngestionSession] stopped"
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.metrics.snapshot()
    }

    /// Highest update id seen so far, 0 before the first update
    pub fn last_update_id(&self) -> i64 {
        self.shared.last_update_id.load(Ordering::Acquire)
    }

    pub fn dropped_updates(&self) -> u64 {
        self.shared.metrics.dropped()
    }

    pub fn queue_depth(&self) -> usize {
        self.shared.metrics.queue_size()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl Drop for IngestionSession {
    fn drop(&mut self) {
        if let Lifecycle::Running(tasks) = self.lifecycle.get_mut() {
            self.shared.running.store(false, Ordering::Release);
            tasks.cancel.cancel();
        }
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &'static str) -> SessionResult<()> {
    if slot.is_some() {
        return Err(SessionError::AlreadyConfigured(field));
    }
    *slot = Some(value);
    Ok(())
}

async fn join_or_abort(name: &str, mut task: JoinHandle<()>, deadline: Instant) {
    match tokio::time::timeout_at(deadline, &mut task).await {
        Ok(Ok(())) => debug!("[IngestionSession] {} task finished", name),
        Ok(Err(e)) => error!("[IngestionSession] {} task failed: {}", name, e),
        Err(_) => {
            warn!(
                "[IngestionSession] {} task did not finish before the shutdown timeout, aborting",
                name
            );
            task.abort();
        }
    }
}

/// One request in flight at a time; the cursor lives here and is mirrored for observers
async fn poll_loop(
    source: Arc<dyn UpdateSource>,
    producer: UpdateProducer,
    shared: Arc<Shared>,
    mut backoff: Backoff,
    cancel: CancellationToken,
) {
    let metrics = shared.metrics.clone();
    let mut last_seen = shared.last_update_id.load(Ordering::Acquire);

    while !cancel.is_cancelled() {
        let offset = last_seen + 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = source.poll(offset) => result,
        };

        match result {
            Ok(updates) => {
                metrics.record_poll(updates.len());
                backoff.reset();
                metrics.set_backoff(Duration::ZERO);

                for update in updates {
                    // Updates not yet handed off stay unconfirmed once stop begins
                    if cancel.is_cancelled() {
                        break;
                    }
                    if update.update_id <= last_seen {
                        metrics.record_skipped();
                        continue;
                    }
                    last_seen = update.update_id;
                    shared.last_update_id.store(last_seen, Ordering::Release);
                    producer.enqueue(update).await;
                }
            }
            Err(err) => {
                metrics.record_poll_failure();
                let delay = backoff.on_failure();
                metrics.set_backoff(delay);
                warn!(
                    offset,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "[IngestionSession] poll failed, backing off"
                );

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    // Dropping the producer lets the drain loop observe the end of the queue.
    drop(producer);
    debug!(
        last_update_id = last_seen,
        "[IngestionSession] poll loop exited"
    );
}

/// Delivers queued updates until the producer is gone and the queue is empty
async fn drain_loop(
    mut consumer: UpdateConsumer,
    callback: Arc<dyn UpdateHandler>,
    shared: Arc<Shared>,
    dequeue_timeout: Duration,
) {
    loop {
        match consumer.next(dequeue_timeout).await {
            Next::Update(update) => deliver(&callback, update, &shared.metrics).await,
            Next::Idle => continue,
            Next::Closed => break,
        }
    }
    debug!("[IngestionSession] drain loop exited");
}

async fn deliver(callback: &Arc<dyn UpdateHandler>, update: Update, metrics: &SessionMetrics) {
    let update_id = update.update_id;
    let callback = callback.clone();

    metrics.record_delivered();
    match tokio::task::spawn_blocking(move || callback.on_update(update)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            metrics.record_callback_failure();
            error!(update_id, "[IngestionSession] callback failed: {:#}", err);
        }
        Err(join_err) => {
            metrics.record_callback_failure();
            error!(
                update_id,
                "[IngestionSession] callback panicked: {}",
                join_err
            );
        }
    }
}
