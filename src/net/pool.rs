//! Bounded worker pool.
//!
//! # Responsibilities
//! - Cap the number of connections processed concurrently
//! - Cap the number of connections waiting for a worker
//!
//! # Design Decisions
//! - Two semaphores: `admission` covers workers plus queue, `workers` covers
//!   running connections only. A connection holds its admission ticket until
//!   it finishes, so waiting + running never exceeds the sum
//! - Admission never waits: a full queue rejects the connection at accept time
//! - Permits are RAII; a panicking worker still frees its slot

use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Worker pool shared by every listener.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: Arc<Semaphore>,
    admission: Arc<Semaphore>,
    capacity: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize, queue_capacity: usize) -> Self {
        Self {
            workers: Arc::new(Semaphore::new(capacity)),
            admission: Arc::new(Semaphore::new(capacity + queue_capacity)),
            capacity,
            queue_capacity,
        }
    }

    /// Admit a connection if the queue has room.
    pub fn try_admit(&self) -> Option<Admission> {
        let ticket = Arc::clone(&self.admission).try_acquire_owned().ok()?;
        Some(Admission {
            ticket,
            workers: Arc::clone(&self.workers),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Workers currently processing a connection.
    pub fn busy(&self) -> usize {
        self.capacity - self.workers.available_permits()
    }

    /// Admitted connections, running or waiting.
    pub fn admitted(&self) -> usize {
        self.capacity + self.queue_capacity - self.admission.available_permits()
    }
}

/// An admitted connection waiting for a worker.
#[derive(Debug)]
pub struct Admission {
    ticket: OwnedSemaphorePermit,
    workers: Arc<Semaphore>,
}

impl Admission {
    /// Wait for a free worker.
    pub async fn wait_for_worker(self) -> Result<WorkerSlot, AcquireError> {
        let worker = self.workers.acquire_owned().await?;
        Ok(WorkerSlot {
            _worker: worker,
            _ticket: self.ticket,
        })
    }
}

/// A running worker. Dropping it frees the worker and the queue ticket.
#[derive(Debug)]
pub struct WorkerSlot {
    _worker: OwnedSemaphorePermit,
    _ticket: OwnedSemaphorePermit,
}
