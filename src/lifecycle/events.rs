//! Worker lifecycle notifications.
//!
//! The dispatcher reports every worker start and stop to an injected
//! `WorkerObserver`. Observers are optional; the default does nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receives worker start/stop notifications. Both methods default to no-ops.
pub trait WorkerObserver: Send + Sync {
    fn on_worker_started(&self) {}
    fn on_worker_stopped(&self) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl WorkerObserver for NoopObserver {}

/// Observer counting worker starts and stops, and the peak concurrency seen.
#[derive(Debug, Default)]
pub struct WorkerCounter {
    started: AtomicU64,
    stopped: AtomicU64,
    active: AtomicU64,
    peak: AtomicU64,
}

impl WorkerCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> u64 {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Workers currently running.
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously running workers.
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::SeqCst)
    }
}

impl WorkerObserver for WorkerCounter {
    fn on_worker_started(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn on_worker_stopped(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Reports a worker start on creation and its stop on drop, so the stop is
/// delivered on every exit path.
pub(crate) struct WorkerNotice {
    observer: Arc<dyn WorkerObserver>,
}

impl WorkerNotice {
    pub(crate) fn start(observer: Arc<dyn WorkerObserver>) -> Self {
        observer.on_worker_started();
        Self { observer }
    }
}

impl Drop for WorkerNotice {
    fn drop(&mut self) {
        self.observer.on_worker_stopped();
    }
}
