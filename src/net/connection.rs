//! Connection identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate short correlation IDs for log statements
//! - Carry the per-connection context into every task spawned for it
//! - Count in-flight connections so shutdown can drain them

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::Span;
use uuid::Uuid;

/// Short correlation identifier for a connection, rendered as 8 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u32);

impl ConnectionId {
    /// Generate a new random ID from the first group of a v4 UUID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().as_fields().0)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Per-connection context handed to every task working on the connection.
///
/// Log correlation comes from the span: tasks are instrumented with it
/// explicitly rather than inheriting any ambient state.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    id: ConnectionId,
    peer: SocketAddr,
    listener: &'static str,
    span: Span,
}

impl ConnectionContext {
    pub fn new(peer: SocketAddr, listener: &'static str) -> Self {
        let id = ConnectionId::new();
        let span = tracing::info_span!("connection", id = %id, peer = %peer, listener);
        Self {
            id,
            peer,
            listener,
            span,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Address of the client as observed by the accepting socket.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn listener(&self) -> &'static str {
        self.listener
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// Tracks in-flight connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self, id: ConnectionId) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id,
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed or `timeout` elapses.
    ///
    /// Returns `true` if every connection finished in time.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let drained = async {
            while self.active_count.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection released");
    }
}
