//! Request handlers.
//!
//! # Data Flow
//! ```text
//! Parsed Request
//!     → CONNECT  → tunnel.rs  (connect target, ack, bidirectional relay)
//!     → other    → forward.rs (header policy, upstream client, status + body relay)
//! ```
//!
//! # Design Decisions
//! - Handlers own the client streams from the moment they receive the request
//!   and release them before returning
//! - Failures while releasing a stream are logged and never surface as errors

pub mod forward;
pub mod tunnel;

pub use forward::ForwardHandler;
pub use tunnel::{TunnelHandler, TunnelOutcome, TunnelReport};

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Shut down a writer, logging instead of returning any failure.
pub(crate) async fn shutdown_quietly<W>(writer: &mut W, what: &'static str)
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if let Err(e) = writer.shutdown().await {
        tracing::debug!(stream = what, error = %e, "Error while closing stream");
    }
}
