//! Per-connection error taxonomy.
//!
//! Every variant is fatal to the connection it occurred on and to nothing
//! else. The dispatcher logs it and releases the client socket.

use thiserror::Error;

/// Errors raised while serving a single client connection.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request head is absent, truncated, oversized or structurally invalid.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// The outbound forward request could not be completed.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The CONNECT target could not be reached. No acknowledgment was sent.
    #[error("Tunnel target {target} unreachable: {source}")]
    TargetUnreachable {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// A relay direction failed after the tunnel was established.
    #[error("Tunnel I/O error: {0}")]
    TunnelIo(#[source] std::io::Error),

    /// TLS handshake with the client failed.
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] std::io::Error),

    /// Any other I/O failure on the client connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Short stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MalformedRequest(_) => "malformed_request",
            ProxyError::UpstreamUnavailable(_) => "upstream_unavailable",
            ProxyError::TargetUnreachable { .. } => "target_unreachable",
            ProxyError::TunnelIo(_) => "tunnel_io",
            ProxyError::Tls(_) => "tls",
            ProxyError::Io(_) => "io",
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        ProxyError::MalformedRequest(msg.into())
    }
}

/// Result type for connection processing.
pub type ProxyResult<T> = Result<T, ProxyError>;
