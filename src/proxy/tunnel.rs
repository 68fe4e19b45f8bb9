//! CONNECT tunnel handling.
//!
//! # Responsibilities
//! - Connect to the CONNECT target and acknowledge the client
//! - Relay bytes in both directions until either side finishes
//! - Close tunnels that stay idle for a whole watchdog interval
//!
//! # Session Lifecycle
//! ```text
//! Connecting ──connect failed──▶ TargetUnreachable (nothing sent to client)
//!     │
//!     ▼ "HTTP/1.1 200 OK\r\n\r\n"
//! Relaying: client→target (worker task)
//!           target→client (spawned task)
//!           watchdog      (spawned task)
//!     │ either direction ends, or the watchdog sees no traffic
//!     ▼
//! Closing: cancel session → join target→client → stop + join watchdog
//!          → shut down target socket and client sink
//! ```
//!
//! # Design Decisions
//! - A cancellation token ends the session; copy loops select on it, so a
//!   pending read is abandoned as a normal termination
//! - Copy loops only ever set the activity flag; the watchdog alone clears it
//! - The watchdog is joined before any socket is released

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::TunnelConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::http::{ClientReader, ClientWriter, Request, Target};
use crate::net::connection::ConnectionContext;
use crate::observability::metrics;
use crate::proxy::shutdown_quietly;

/// Acknowledgment written to the client once the target is connected.
pub const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n";

/// How a tunnel session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelOutcome {
    /// One side closed cleanly.
    Completed,
    /// A relay direction failed with an I/O error.
    Aborted,
    /// The watchdog saw no traffic for a whole interval.
    Timeout,
}

impl TunnelOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelOutcome::Completed => "completed",
            TunnelOutcome::Aborted => "aborted",
            TunnelOutcome::Timeout => "timeout",
        }
    }
}

/// Summary of a finished tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelReport {
    pub outcome: TunnelOutcome,
    pub client_to_target: u64,
    pub target_to_client: u64,
}

/// Handles CONNECT requests.
#[derive(Debug, Clone)]
pub struct TunnelHandler {
    connect_timeout: Duration,
    idle_interval: Duration,
    buffer_size: usize,
}

impl TunnelHandler {
    pub fn new(config: &TunnelConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            idle_interval: Duration::from_millis(config.idle_interval_ms),
            buffer_size: config.buffer_size.max(1),
        }
    }

    /// Establish the tunnel and relay until it closes.
    ///
    /// Only failures before the acknowledgment is sent are returned as errors;
    /// relay failures end the session with `TunnelOutcome::Aborted`.
    pub async fn handle(&self, request: Request, ctx: &ConnectionContext) -> ProxyResult<TunnelReport> {
        let (head, client_reader, mut client_writer) = request.into_parts();
        let (host, port) = match head.target() {
            Target::Authority { host, port } => (host.as_str(), *port),
            Target::Absolute(_) => {
                return Err(ProxyError::malformed("CONNECT target must be host:port"));
            }
        };
        let target_name = head.target().to_string();

        let target = self
            .connect(host, port)
            .await
            .map_err(|source| ProxyError::TargetUnreachable {
                target: target_name.clone(),
                source,
            })?;

        client_writer.write_all(CONNECT_ESTABLISHED).await?;
        client_writer.flush().await?;
        tracing::info!(target = %target_name, "Tunnel established");

        let started = Instant::now();
        let session = TunnelSession::new(self.idle_interval, self.buffer_size);
        let report = session.run(client_reader, client_writer, target, ctx).await;

        metrics::record_tunnel(
            report.outcome.as_str(),
            started,
            report.client_to_target,
            report.target_to_client,
        );
        tracing::info!(
            target = %target_name,
            outcome = report.outcome.as_str(),
            client_to_target = report.client_to_target,
            target_to_client = report.target_to_client,
            duration_ms = started.elapsed().as_millis() as u64,
            "Tunnel closed"
        );
        Ok(report)
    }

    async fn connect(&self, host: &str, port: u16) -> std::io::Result<TcpStream> {
        let stream = time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")
            })??;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY on tunnel target");
        }
        Ok(stream)
    }
}

/// Shared state of one relaying tunnel.
struct TunnelSession {
    activity: Arc<AtomicBool>,
    cancel: CancellationToken,
    idle_interval: Duration,
    buffer_size: usize,
}

impl TunnelSession {
    fn new(idle_interval: Duration, buffer_size: usize) -> Self {
        Self {
            activity: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            idle_interval,
            buffer_size,
        }
    }

    async fn run(
        self,
        mut client_reader: ClientReader,
        client_writer: ClientWriter,
        target: TcpStream,
        ctx: &ConnectionContext,
    ) -> TunnelReport {
        let (target_reader, mut target_writer) = target.into_split();

        let watchdog_stop = self.cancel.child_token();
        let watchdog = tokio::spawn(
            watchdog(
                Arc::clone(&self.activity),
                self.cancel.clone(),
                watchdog_stop.clone(),
                self.idle_interval,
            )
            .instrument(ctx.span().clone()),
        );

        let downstream = {
            let activity = Arc::clone(&self.activity);
            let cancel = self.cancel.clone();
            let buffer_size = self.buffer_size;
            tokio::spawn(
                async move {
                    let mut target_reader = target_reader;
                    let mut client_writer = client_writer;
                    let relayed = relay(
                        &mut target_reader,
                        &mut client_writer,
                        &activity,
                        &cancel,
                        buffer_size,
                        "target_to_client",
                    )
                    .await;
                    (relayed, client_writer)
                }
                .instrument(ctx.span().clone()),
            )
        };

        let upstream = relay(
            &mut client_reader,
            &mut target_writer,
            &self.activity,
            &self.cancel,
            self.buffer_size,
            "client_to_target",
        )
        .await;

        // Whichever side finished first, the session is over.
        self.cancel.cancel();
        let (downstream, client_writer) = match downstream.await {
            Ok((relayed, writer)) => (relayed, Some(writer)),
            Err(e) => {
                tracing::error!(error = %e, "Tunnel relay task failed");
                (Relayed::failed(), None)
            }
        };

        watchdog_stop.cancel();
        let timed_out = watchdog.await.unwrap_or(false);

        shutdown_quietly(&mut target_writer, "tunnel target").await;
        if let Some(mut writer) = client_writer {
            shutdown_quietly(&mut writer, "client").await;
        }

        let outcome = if timed_out {
            TunnelOutcome::Timeout
        } else if upstream.failed || downstream.failed {
            TunnelOutcome::Aborted
        } else {
            TunnelOutcome::Completed
        };

        TunnelReport {
            outcome,
            client_to_target: upstream.bytes,
            target_to_client: downstream.bytes,
        }
    }
}

/// Bytes moved by one direction and whether it ended on an error.
#[derive(Debug, Clone, Copy)]
struct Relayed {
    bytes: u64,
    failed: bool,
}

impl Relayed {
    fn failed() -> Self {
        Self {
            bytes: 0,
            failed: true,
        }
    }
}

/// Copy from `reader` to `writer` until end-of-stream, an error, or cancellation.
///
/// Ending the loop for any reason cancels the whole session.
async fn relay<R, W>(
    reader: &mut R,
    writer: &mut W,
    activity: &AtomicBool,
    cancel: &CancellationToken,
    buffer_size: usize,
    direction: &'static str,
) -> Relayed
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; buffer_size];
    let mut bytes = 0u64;

    let result: std::io::Result<()> = async {
        loop {
            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                read = reader.read(&mut buf) => read?,
            };
            if n == 0 {
                return Ok(());
            }
            activity.store(true, Ordering::Release);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                written = write_chunk(writer, &buf[..n]) => written?,
            }
            bytes += n as u64;
        }
    }
    .await;

    cancel.cancel();
    match result {
        Ok(()) => {
            tracing::debug!(direction, bytes, "Tunnel direction finished");
            Relayed {
                bytes,
                failed: false,
            }
        }
        Err(e) => {
            let err = ProxyError::TunnelIo(e);
            tracing::warn!(direction, bytes, error = %err, "Tunnel direction failed");
            Relayed { bytes, failed: true }
        }
    }
}

async fn write_chunk<W>(writer: &mut W, chunk: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(chunk).await?;
    writer.flush().await
}

/// Close the session when a whole interval passes without traffic.
///
/// Returns `true` if it closed the session, `false` if it was stopped.
async fn watchdog(
    activity: Arc<AtomicBool>,
    session: CancellationToken,
    stop: CancellationToken,
    interval: Duration,
) -> bool {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => return false,
            _ = ticker.tick() => {
                if !activity.swap(false, Ordering::AcqRel) {
                    tracing::info!(idle_ms = interval.as_millis() as u64, "Tunnel idle, closing");
                    session.cancel();
                    return true;
                }
            }
        }
    }
}
