//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Init logging/metrics → Bind listeners → Dispatch
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Worker events (events.rs):
//!     Worker started/stopped → injected observer
//! ```

pub mod events;
pub mod shutdown;
pub mod signals;

pub use events::{NoopObserver, WorkerCounter, WorkerObserver};
pub use shutdown::Shutdown;
