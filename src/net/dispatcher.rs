//! Connection dispatcher.
//!
//! # Responsibilities
//! - Run one accept loop per listener
//! - Admit connections into the bounded worker pool, rejecting overflow
//! - Drive each connection through parse → handler → close
//! - Stop accepting on shutdown and drain in-flight connections
//!
//! # Data Flow
//! ```text
//! accept ─▶ try_admit ──full──▶ close (rejected)
//!              │
//!              ▼
//!         wait_for_worker ─▶ establish (TLS) ─▶ read preamble ─▶ CONNECT? ─▶ TunnelHandler
//!                                                                   └──────▶ ForwardHandler
//! ```
//!
//! # Design Decisions
//! - Every task working on a connection is instrumented with the
//!   connection span, so the correlation id follows it into spawned tasks
//! - Client streams are owned by the request and dropped on every exit path;
//!   errors never escape the worker
//! - A failing accept is logged and retried after a short pause

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::BufReader;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::http::{ClientReader, Request};
use crate::lifecycle::events::WorkerNotice;
use crate::lifecycle::{NoopObserver, WorkerObserver};
use crate::net::connection::{ConnectionContext, ConnectionTracker};
use crate::net::listener::{Listener, PendingConnection};
use crate::net::pool::{WorkerPool, WorkerSlot};
use crate::observability::metrics;
use crate::proxy::{ForwardHandler, TunnelHandler};
use crate::upstream::UpstreamClient;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections and hands them to pooled workers.
pub struct Dispatcher {
    config: Arc<ProxyConfig>,
    forward: ForwardHandler,
    tunnel: TunnelHandler,
    pool: WorkerPool,
    tracker: ConnectionTracker,
    observer: Arc<dyn WorkerObserver>,
}

impl Dispatcher {
    pub fn new(config: ProxyConfig, upstream: Arc<dyn UpstreamClient>) -> Self {
        let pool = WorkerPool::new(config.listener.max_connections, config.listener.queue_capacity);
        let tunnel = TunnelHandler::new(&config.tunnel);
        Self {
            config: Arc::new(config),
            forward: ForwardHandler::new(upstream),
            tunnel,
            pool,
            tracker: ConnectionTracker::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Report worker starts and stops to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn WorkerObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Serve `listeners` until `shutdown` fires, then drain.
    pub async fn run(self: Arc<Self>, listeners: Vec<Listener>, mut shutdown: broadcast::Receiver<()>) {
        let mut accept_loops = JoinSet::new();
        for listener in listeners {
            let dispatcher = Arc::clone(&self);
            accept_loops.spawn(async move { dispatcher.accept_loop(listener).await });
        }

        if accept_loops.is_empty() {
            tracing::warn!("No listeners configured, nothing to serve");
            return;
        }

        tracing::info!(
            workers = self.pool.capacity(),
            queue = self.pool.queue_capacity(),
            "Dispatcher started"
        );

        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Shutdown signal received, no longer accepting connections");
            }
            Some(result) = accept_loops.join_next() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Accept loop terminated unexpectedly");
                }
            }
        }
        accept_loops.shutdown().await;

        let drain_timeout = Duration::from_secs(self.config.shutdown.drain_timeout_secs);
        let in_flight = self.tracker.active_count();
        if in_flight > 0 {
            tracing::info!(in_flight, timeout_secs = drain_timeout.as_secs(), "Draining connections");
        }
        if self.tracker.wait_for_idle(drain_timeout).await {
            tracing::info!("All connections drained");
        } else {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain timeout elapsed with connections still open"
            );
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: Listener) {
        let name = listener.name();
        loop {
            match listener.accept().await {
                Ok((pending, peer)) => self.dispatch(pending, peer, name),
                Err(e) => {
                    tracing::error!(listener = name, error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    /// Admit an accepted connection or close it if the queue is full.
    fn dispatch(self: &Arc<Self>, pending: PendingConnection, peer: SocketAddr, listener: &'static str) {
        let ctx = ConnectionContext::new(peer, listener);

        let Some(admission) = self.pool.try_admit() else {
            metrics::record_connection(listener, false);
            ctx.span().in_scope(|| {
                tracing::warn!(
                    workers = self.pool.capacity(),
                    queue = self.pool.queue_capacity(),
                    "Worker queue full, rejecting connection"
                );
            });
            drop(pending);
            return;
        };
        metrics::record_connection(listener, true);

        let guard = self.tracker.track(ctx.id());
        let dispatcher = Arc::clone(self);
        let span = ctx.span().clone();
        tokio::spawn(
            async move {
                let _guard = guard;
                match admission.wait_for_worker().await {
                    Ok(slot) => dispatcher.serve(pending, ctx, slot).await,
                    Err(e) => tracing::debug!(error = %e, "Worker pool closed before a slot freed up"),
                }
            }
            .instrument(span),
        );
    }

    /// Worker body. Nothing escapes: the outcome is logged and counted.
    async fn serve(&self, pending: PendingConnection, ctx: ConnectionContext, slot: WorkerSlot) {
        let _notice = WorkerNotice::start(Arc::clone(&self.observer));
        metrics::set_active_workers(self.pool.busy() as u64);
        let started = Instant::now();

        match self.process(pending, &ctx).await {
            Ok(()) => {
                tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Connection finished");
            }
            Err(e) => {
                metrics::record_connection_error(e.kind());
                match &e {
                    ProxyError::MalformedRequest(_) | ProxyError::Tls(_) => {
                        tracing::warn!(error = %e, kind = e.kind(), "Connection rejected");
                    }
                    _ => tracing::error!(error = %e, kind = e.kind(), "Connection failed"),
                }
            }
        }

        drop(slot);
        metrics::set_active_workers(self.pool.busy() as u64);
    }

    async fn process(&self, pending: PendingConnection, ctx: &ConnectionContext) -> ProxyResult<()> {
        let stream = pending.establish().await?;
        let (reader, writer) = tokio::io::split(stream);
        let reader: ClientReader = Box::new(BufReader::new(reader));

        let request = Request::read_from(reader, Box::new(writer), self.config.limits.max_preamble_bytes).await?;
        tracing::debug!(
            method = request.head().method(),
            target = %request.head().target(),
            version = request.head().version(),
            "Request parsed"
        );

        if request.is_tunnel() {
            self.tunnel.handle(request, ctx).await?;
        } else {
            self.forward.handle(request, ctx.peer().ip()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Response;
    use crate::lifecycle::{Shutdown, WorkerCounter};
    use crate::upstream::UpstreamRequest;
    use async_trait::async_trait;
    use hyper::{HeaderMap, StatusCode, Version};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Upstream answering every request with `200` and the request URI as body.
    struct EchoUri;

    #[async_trait]
    impl UpstreamClient for EchoUri {
        async fn send(&self, request: UpstreamRequest) -> ProxyResult<Response> {
            let body = request.uri.to_string().into_bytes();
            Ok(Response::new(
                Version::HTTP_11,
                StatusCode::OK,
                HeaderMap::new(),
                Box::new(std::io::Cursor::new(body)),
            ))
        }
    }

    fn test_config(workers: usize, queue: usize) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.listener.max_connections = workers;
        config.listener.queue_capacity = queue;
        config.shutdown.drain_timeout_secs = 1;
        config
    }

    async fn start(config: ProxyConfig) -> (SocketAddr, Arc<Dispatcher>, Arc<WorkerCounter>, Shutdown) {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let counter = Arc::new(WorkerCounter::new());
        let dispatcher = Arc::new(Dispatcher::new(config, Arc::new(EchoUri)).with_observer(counter.clone()));
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        tokio::spawn(Arc::clone(&dispatcher).run(vec![Listener::from_tcp(tcp, None)], rx));
        (addr, dispatcher, counter, shutdown)
    }

    async fn roundtrip(addr: SocketAddr, wire: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(wire).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn forwards_and_closes() {
        let (addr, _dispatcher, counter, _shutdown) = start(test_config(4, 4)).await;
        let out = roundtrip(addr, b"GET http://origin.test/a HTTP/1.1\r\nHost: origin.test\r\n\r\n").await;
        assert_eq!(out, b"HTTP/1.1 200\n\nhttp://origin.test/a");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.started(), 1);
        assert_eq!(counter.stopped(), 1);
    }

    #[tokio::test]
    async fn malformed_request_gets_no_bytes() {
        let (addr, _dispatcher, counter, _shutdown) = start(test_config(4, 4)).await;
        let out = roundtrip(addr, b"BADLINE\r\n\r\n").await;
        assert!(out.is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.stopped(), 1);
    }

    #[tokio::test]
    async fn overflow_beyond_queue_is_rejected() {
        let (addr, dispatcher, _counter, _shutdown) = start(test_config(1, 1)).await;

        // Two connections that never send a full head: one running, one queued.
        let running = TcpStream::connect(addr).await.unwrap();
        let queued = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(dispatcher.pool().busy(), 1);
        assert_eq!(dispatcher.pool().admitted(), 2);

        let mut rejected = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(1), rejected.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        assert_eq!(dispatcher.pool().admitted(), 2);

        drop(running);
        drop(queued);
    }

    #[tokio::test]
    async fn shutdown_stops_accepting() {
        let (addr, dispatcher, _counter, shutdown) = start(test_config(4, 4)).await;
        shutdown.trigger();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(dispatcher.tracker().active_count(), 0);
        // The listening socket is gone once the accept loop is aborted.
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
