//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, plain or TLS)
//!     → dispatcher.rs (admission, worker assignment)
//!     → pool.rs (bounded workers + bounded queue)
//!     → tls.rs (handshake inside the worker, when configured)
//!     → connection.rs (correlation id, drain tracking)
//!     → Hand off to proxy handlers
//!
//! Connection States:
//!     Accepted → Queued → Running → Closed
//!         └──── queue full ────────▶ Closed
//! ```
//!
//! # Design Decisions
//! - Bounded queue in front of the worker pool prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - TLS is optional and handled transparently

pub mod connection;
pub mod dispatcher;
pub mod listener;
pub mod pool;
pub mod tls;

pub use connection::{ConnectionContext, ConnectionId, ConnectionTracker};
pub use dispatcher::Dispatcher;
pub use listener::{Listener, ListenerError};
pub use pool::WorkerPool;
