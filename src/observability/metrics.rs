//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_total` (counter): accepted/rejected connections by listener
//! - `proxy_active_workers` (gauge): connections currently holding a worker slot
//! - `proxy_connection_errors_total` (counter): failed connections by error kind
//! - `proxy_forward_requests_total` (counter): relayed forward requests by status
//! - `proxy_tunnels_total` (counter): finished tunnels by outcome
//! - `proxy_tunnel_duration_seconds` (histogram): tunnel lifetime
//! - `proxy_tunnel_bytes_total` (counter): relayed tunnel bytes by direction
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing when the exporter is disabled.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and start its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection(listener: &'static str, accepted: bool) {
    let result = if accepted { "accepted" } else { "rejected" };
    metrics::counter!("proxy_connections_total", "listener" => listener, "result" => result).increment(1);
}

pub fn set_active_workers(count: u64) {
    metrics::gauge!("proxy_active_workers").set(count as f64);
}

pub fn record_connection_error(kind: &'static str) {
    metrics::counter!("proxy_connection_errors_total", "kind" => kind).increment(1);
}

pub fn record_forward(status: u16) {
    metrics::counter!("proxy_forward_requests_total", "status" => status.to_string()).increment(1);
}

pub fn record_tunnel(outcome: &'static str, started: Instant, client_to_target: u64, target_to_client: u64) {
    metrics::counter!("proxy_tunnels_total", "outcome" => outcome).increment(1);
    metrics::histogram!("proxy_tunnel_duration_seconds").record(started.elapsed().as_secs_f64());
    metrics::counter!("proxy_tunnel_bytes_total", "direction" => "client_to_target").increment(client_to_target);
    metrics::counter!("proxy_tunnel_bytes_total", "direction" => "target_to_client").increment(target_to_client);
}
