//! Listening sockets.
//!
//! # Responsibilities
//! - Bind to configured address(es)
//! - Accept incoming TCP connections
//! - Defer the TLS handshake to the worker so a slow client never stalls accept
//!
//! # Design Decisions
//! - Plain and TLS listeners yield the same boxed byte stream; nothing past
//!   this module knows which one a connection came from
//! - Concurrency limits live in the worker pool, not here

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use crate::error::{ProxyError, ProxyResult};

/// Bidirectional client byte stream, plain or TLS.
pub trait ClientIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ClientIo for T {}

pub type ClientStream = Box<dyn ClientIo>;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// An accepting socket, optionally TLS-terminating.
pub struct Listener {
    inner: TcpListener,
    tls: Option<TlsAcceptor>,
}

impl Listener {
    /// Bind to `bind_address`.
    pub async fn bind(bind_address: &str, tls: Option<TlsAcceptor>) -> Result<Self, ListenerError> {
        let addr: SocketAddr = bind_address.parse().map_err(|e| {
            ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
        let listener = Self::from_tcp(listener, tls);

        tracing::info!(
            address = %local_addr,
            listener = listener.name(),
            "Listener bound"
        );
        Ok(listener)
    }

    /// Wrap an already-bound socket.
    pub fn from_tcp(inner: TcpListener, tls: Option<TlsAcceptor>) -> Self {
        Self { inner, tls }
    }

    /// Accept the next connection. The TLS handshake, if any, has not run yet.
    pub async fn accept(&self) -> Result<(PendingConnection, SocketAddr), ListenerError> {
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer_addr = %addr, error = %e, "Failed to set TCP_NODELAY");
        }

        tracing::debug!(peer_addr = %addr, listener = self.name(), "Connection accepted");
        Ok((
            PendingConnection {
                stream,
                tls: self.tls.clone(),
            },
            addr,
        ))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// "tls" or "plain", used as a log and metric label.
    pub fn name(&self) -> &'static str {
        if self.tls.is_some() {
            "tls"
        } else {
            "plain"
        }
    }
}

/// An accepted connection whose TLS handshake (if any) is still pending.
pub struct PendingConnection {
    stream: TcpStream,
    tls: Option<TlsAcceptor>,
}

impl PendingConnection {
    /// Complete the TLS handshake when required and return the client stream.
    pub async fn establish(self) -> ProxyResult<ClientStream> {
        match self.tls {
            Some(acceptor) => {
                let stream = acceptor.accept(self.stream).await.map_err(ProxyError::Tls)?;
                Ok(Box::new(stream))
            }
            None => Ok(Box::new(self.stream)),
        }
    }
}
