//! Outbound HTTP execution.
//!
//! # Data Flow
//! ```text
//! proxy::forward (header policy applied)
//!     → UpstreamRequest
//!     → UpstreamClient::send (client.rs: hyper connection pool)
//!     → http::Response (version, status, headers, streaming body)
//! ```
//!
//! # Design Decisions
//! - The forward handler only sees the `UpstreamClient` trait, so tests can
//!   substitute a recording client
//! - No retries or redirects: one attempt, surfaced once

pub mod client;

use async_trait::async_trait;
use hyper::{HeaderMap, Method, Uri};
use tokio::io::AsyncRead;

use crate::error::ProxyResult;
use crate::http::Response;

pub use client::HyperUpstream;

/// Streaming body of an outbound request.
pub type UpstreamBody = Box<dyn AsyncRead + Send + Unpin>;

/// A request ready to be sent to the origin.
pub struct UpstreamRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// `None` sends an empty body.
    pub body: Option<UpstreamBody>,
}

impl std::fmt::Debug for UpstreamRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamRequest")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Capability to execute a request against an origin server.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Send the request and return the origin's response head and body stream.
    ///
    /// Fails with `ProxyError::UpstreamUnavailable` when the exchange cannot complete.
    async fn send(&self, request: UpstreamRequest) -> ProxyResult<Response>;
}
