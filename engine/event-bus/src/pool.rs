//! Fixed-size worker pool serving `publish_async`

use crate::error::{BusError, BusResult};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A bounded job queue drained by a fixed set of named threads
///
/// Jobs that panic are logged; the worker keeps running.
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    exited: Receiver<()>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(name: &str, threads: usize, capacity: usize) -> BusResult<Self> {
        let (sender, receiver) = channel::bounded::<Job>(capacity);
        let (exited_tx, exited) = channel::unbounded();

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let jobs = receiver.clone();
            let exited_tx = exited_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || {
                    while let Ok(job) = jobs.recv() {
                        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
                            error!(panic = %panic_message(&*panic), "[WorkerPool] job panicked");
                        }
                    }
                    let _ = exited_tx.send(());
                })?;
            workers.push(handle);
        }

        debug!("[WorkerPool] started {} '{}' workers", threads, name);

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            exited,
            capacity,
        })
    }

    /// Queue a job without blocking
    pub fn execute<F>(&self, job: F) -> BusResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(BusError::WorkerPoolClosed)?;
        match sender.try_send(Box::new(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(BusError::CapacityExceeded {
                capacity: self.capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(BusError::WorkerPoolClosed),
        }
    }

    /// Stop accepting jobs and wait up to `timeout` for the workers to finish
    ///
    /// Queued jobs still run. Returns whether every worker exited in time; stragglers
    /// are detached.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.sender.lock().take();

        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return true;
        }

        let deadline = Instant::now() + timeout;
        for _ in 0..workers.len() {
            if self.exited.recv_deadline(deadline).is_err() {
                warn!(
                    "[WorkerPool] workers did not stop within {:?}, detaching",
                    timeout
                );
                return false;
            }
        }

        for worker in workers {
            let _ = worker.join();
        }
        true
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.lock().take();
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
