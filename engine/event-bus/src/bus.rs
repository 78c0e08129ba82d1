//! EventBus implementation

use crate::config::BusConfig;
use crate::error::{BusError, BusResult};
use crate::event::{Category, Event, EventEnvelope, HandlerResult, Topic};
use crate::metrics::{BusMetrics, BusStats};
use crate::pool::{panic_message, WorkerPool};
use crate::registry::{Subscriber, SubscriberRegistry, SubscriptionHandle};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::any::TypeId;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// State shared between publishers, the dispatch thread and pool workers
struct BusInner {
    alive: AtomicBool,
    sender: Sender<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
    registry: SubscriberRegistry,
    metrics: BusMetrics,
    config: BusConfig,
}

struct DispatchThread {
    handle: JoinHandle<()>,
    exited: Receiver<()>,
}

/// In-process publish/subscribe bus with a bounded buffer
///
/// Publishing never blocks: when the buffer is full the event is rejected with
/// [`BusError::CapacityExceeded`]. Delivery happens on a single dispatch thread, so
/// events are delivered in publish order and a slow handler delays later events.
pub struct EventBus {
    inner: Arc<BusInner>,
    pool: WorkerPool,
    dispatcher: Mutex<Option<DispatchThread>>,
    wake: Mutex<Option<Sender<()>>>,
}

impl EventBus {
    /// Start the dispatch thread and the worker pool
    pub fn new(config: BusConfig) -> BusResult<Self> {
        config.validate().map_err(BusError::InvalidConfig)?;

        let (sender, receiver) = channel::bounded(config.capacity);
        let inner = Arc::new(BusInner {
            alive: AtomicBool::new(true),
            sender,
            receiver,
            registry: SubscriberRegistry::new(),
            metrics: BusMetrics::new(),
            config: config.clone(),
        });

        let pool = WorkerPool::new("event-bus-worker", config.worker_threads, config.capacity)?;

        let (wake_tx, wake_rx) = channel::bounded::<()>(0);
        let (exited_tx, exited) = channel::bounded(1);
        let dispatch_inner = inner.clone();
        let handle = thread::Builder::new()
            .name("event-bus-dispatch".to_string())
            .spawn(move || {
                dispatch_inner.dispatch_loop(wake_rx);
                let _ = exited_tx.send(());
            })?;

        info!(
            "[EventBus] started (capacity: {}, workers: {})",
            config.capacity, config.worker_threads
        );

        Ok(Self {
            inner,
            pool,
            dispatcher: Mutex::new(Some(DispatchThread { handle, exited })),
            wake: Mutex::new(Some(wake_tx)),
        })
    }

    /// Enqueue an event for delivery
    ///
    /// Fails immediately with `CapacityExceeded` when the buffer is full and with
    /// `ShutDown` after [`EventBus::shutdown`].
    pub fn publish<E: Event>(&self, event: E) -> BusResult<()> {
        self.inner.publish(EventEnvelope::new(event))
    }

    /// Perform [`EventBus::publish`] on the worker pool
    ///
    /// The returned handle resolves to the publish outcome. Await it from async code
    /// or call [`PublishHandle::wait`] from a plain thread.
    pub fn publish_async<E: Event>(&self, event: E) -> PublishHandle {
        if !self.inner.is_alive() {
            return PublishHandle::ready(Err(BusError::ShutDown));
        }

        let (tx, rx) = oneshot::channel();
        let inner = self.inner.clone();
        let envelope = EventEnvelope::new(event);
        let queued = self.pool.execute(move || {
            let _ = tx.send(inner.publish(envelope));
        });

        match queued {
            Ok(()) => PublishHandle::pending(rx),
            Err(e) => {
                self.inner.metrics.record_rejected();
                PublishHandle::ready(Err(e))
            }
        }
    }

    /// Register a handler for events of exactly type `E`
    pub fn subscribe<E, F>(&self, handler: F) -> BusResult<SubscriptionHandle>
    where
        E: Event,
        F: Fn(&E) -> HandlerResult + Send + Sync + 'static,
    {
        self.ensure_alive()?;
        let handle = self.inner.registry.insert(
            Topic::Type(TypeId::of::<E>()),
            Arc::new(move |envelope: &EventEnvelope| match envelope.downcast_ref::<E>() {
                Some(event) => handler(event),
                None => Ok(()),
            }),
        );
        debug!(
            "[EventBus] subscription {} to {}",
            handle.id(),
            std::any::type_name::<E>()
        );
        Ok(handle)
    }

    /// Register a handler for every event type that declares `category`
    pub fn subscribe_category<F>(
        &self,
        category: Category,
        handler: F,
    ) -> BusResult<SubscriptionHandle>
    where
        F: Fn(&EventEnvelope) -> HandlerResult + Send + Sync + 'static,
    {
        self.ensure_alive()?;
        let handle = self
            .inner
            .registry
            .insert(Topic::Category(category), Arc::new(handler));
        debug!(
            "[EventBus] subscription {} to category {}",
            handle.id(),
            category
        );
        Ok(handle)
    }

    /// Register a handler for every published event
    pub fn subscribe_all<F>(&self, handler: F) -> BusResult<SubscriptionHandle>
    where
        F: Fn(&EventEnvelope) -> HandlerResult + Send + Sync + 'static,
    {
        self.ensure_alive()?;
        let handle = self.inner.registry.insert(Topic::All, Arc::new(handler));
        debug!("[EventBus] subscription {} to all events", handle.id());
        Ok(handle)
    }

    /// Remove a registration; unknown or already removed handles are ignored
    ///
    /// Returns whether the registration was present.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.inner.registry.remove(handle)
    }

    /// Number of events accepted but not yet taken by the dispatch thread
    pub fn backlog(&self) -> usize {
        self.inner.receiver.len()
    }

    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> BusStats {
        self.inner.metrics.set_backlog(self.backlog());
        self.inner.metrics.snapshot(self.inner.registry.len())
    }

    /// Stop accepting events and wind down the worker pool and dispatch thread
    ///
    /// Events already buffered are still delivered while the dispatch thread winds
    /// down. Both the pool and the dispatch thread get a bounded wait; whatever
    /// has not finished by then is detached. Calling this again is a no-op.
    pub fn shutdown(&self) {
        if !self.inner.alive.swap(false, Ordering::AcqRel) {
            return;
        }

        info!("[EventBus] shutting down");
        let timeout = self.inner.config.shutdown_timeout();
        let deadline = Instant::now() + timeout;

        if !self.pool.shutdown(timeout) {
            warn!(
                "[EventBus] worker pool did not terminate within {:?}",
                timeout
            );
        }

        // Dropping the wake sender interrupts a dispatch thread parked on an empty buffer.
        self.wake.lock().take();

        if let Some(dispatcher) = self.dispatcher.lock().take() {
            match dispatcher.exited.recv_deadline(deadline) {
                Ok(()) => {
                    let _ = dispatcher.handle.join();
                }
                Err(_) => warn!(
                    "[EventBus] dispatch thread still running after {:?}, {} events pending",
                    timeout,
                    self.inner.receiver.len()
                ),
            }
        }

        info!("[EventBus] shut down");
    }

    fn ensure_alive(&self) -> BusResult<()> {
        if self.inner.is_alive() {
            Ok(())
        } else {
            Err(BusError::ShutDown)
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl BusInner {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn publish(&self, envelope: EventEnvelope) -> BusResult<()> {
        if !self.is_alive() {
            return Err(BusError::ShutDown);
        }

        match self.sender.try_send(envelope) {
            Ok(()) => {
                self.metrics.record_published();
                Ok(())
            }
            Err(TrySendError::Full(envelope)) => {
                self.metrics.record_rejected();
                warn!(
                    "[EventBus] back-pressure: buffer full, rejected {}",
                    envelope.type_name()
                );
                Err(BusError::CapacityExceeded {
                    capacity: self.config.capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => Err(BusError::ShutDown),
        }
    }

    /// Runs while the bus is alive or events remain buffered
    fn dispatch_loop(&self, wake: Receiver<()>) {
        let poll = self.config.dispatch_poll();
        let mut wake = Some(wake);

        while self.is_alive() || !self.receiver.is_empty() {
            let mut received = None;
            let mut woken = false;
            match &wake {
                Some(waker) => channel::select! {
                    recv(self.receiver) -> msg => received = msg.ok(),
                    recv(waker) -> _ => woken = true,
                    default(poll) => {}
                },
                None => received = self.receiver.recv_timeout(poll).ok(),
            }
            if woken {
                wake = None;
            }

            if let Some(envelope) = received {
                self.dispatch(&envelope);
                self.metrics.set_backlog(self.receiver.len());
            }
        }

        debug!("[EventBus] dispatch thread exiting");
    }

    fn dispatch(&self, envelope: &EventEnvelope) {
        for subscriber in self.registry.subscribers_for(envelope) {
            self.invoke(&subscriber, envelope);
        }
        self.metrics.record_dispatched();
    }

    fn invoke(&self, subscriber: &Subscriber, envelope: &EventEnvelope) {
        match panic::catch_unwind(AssertUnwindSafe(|| (subscriber.handler)(envelope))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.metrics.record_handler_failure();
                error!(
                    event = envelope.type_name(),
                    subscription = subscriber.id,
                    "[EventBus] handler failed: {:#}",
                    err
                );
            }
            Err(panic) => {
                self.metrics.record_handler_failure();
                error!(
                    event = envelope.type_name(),
                    subscription = subscriber.id,
                    "[EventBus] handler panicked: {}",
                    panic_message(&*panic)
                );
            }
        }
    }
}

/// Completion handle returned by [`EventBus::publish_async`]
#[must_use = "the publish outcome is only observable through the handle"]
pub struct PublishHandle {
    state: HandleState,
}

enum HandleState {
    Ready(Option<BusResult<()>>),
    Pending(oneshot::Receiver<BusResult<()>>),
}

impl PublishHandle {
    fn ready(result: BusResult<()>) -> Self {
        Self {
            state: HandleState::Ready(Some(result)),
        }
    }

    fn pending(rx: oneshot::Receiver<BusResult<()>>) -> Self {
        Self {
            state: HandleState::Pending(rx),
        }
    }

    /// Block the current thread until the publish has been attempted
    ///
    /// Must not be called from within an async runtime; await the handle there.
    pub fn wait(self) -> BusResult<()> {
        let result = match self.state {
            HandleState::Ready(result) => result,
            HandleState::Pending(rx) => rx.blocking_recv().ok(),
        };
        result.unwrap_or(Err(BusError::WorkerPoolClosed))
    }
}

impl Future for PublishHandle {
    type Output = BusResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            HandleState::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(BusError::WorkerPoolClosed)))
            }
            // A dropped sender means the job was discarded by a closing pool.
            HandleState::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(BusError::WorkerPoolClosed))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Ping;
    impl Event for Ping {}

    fn small_config(capacity: usize) -> BusConfig {
        BusConfig {
            capacity,
            worker_threads: 2,
            dispatch_poll_ms: 10,
            shutdown_timeout_ms: 1000,
        }
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_invalid_config() {
        let result = EventBus::new(small_config(0));
        assert!(matches!(result, Err(BusError::InvalidConfig(_))));
    }

    #[test]
    fn test_publish_delivers() {
        let bus = EventBus::new(small_config(8)).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        bus.subscribe(move |_: &Ping| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        bus.publish(Ping).unwrap();
        assert!(wait_for(|| count.load(Ordering::SeqCst) == 1));
        assert!(bus.is_alive());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let bus = EventBus::new(small_config(8)).unwrap();
        bus.shutdown();
        bus.shutdown();

        assert!(!bus.is_alive());
        assert!(matches!(bus.publish(Ping), Err(BusError::ShutDown)));
        assert!(matches!(bus.subscribe(|_: &Ping| Ok(())), Err(BusError::ShutDown)));
        assert!(matches!(bus.subscribe_all(|_| Ok(())), Err(BusError::ShutDown)));
    }

    #[test]
    fn test_publish_async_wait() {
        let bus = EventBus::new(small_config(8)).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        bus.subscribe(move |_: &Ping| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        bus.publish_async(Ping).wait().unwrap();
        assert!(wait_for(|| count.load(Ordering::SeqCst) == 1));

        bus.shutdown();
        assert!(matches!(bus.publish_async(Ping).wait(), Err(BusError::ShutDown)));
    }

    #[tokio::test]
    async fn test_publish_async_await() {
        let bus = EventBus::new(small_config(8)).unwrap();
        let result = bus.publish_async(Ping).await;
        assert!(result.is_ok());
        assert!(wait_for(|| bus.stats().dispatched_total == 1));
    }

    #[test]
    fn test_drop_shuts_down() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let bus = EventBus::new(small_config(8)).unwrap();
            let seen = count.clone();
            bus.subscribe(move |_: &Ping| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
            for _ in 0..5 {
                bus.publish(Ping).unwrap();
            }
        }
        // buffered events are drained before the dispatch thread exits
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }
}
