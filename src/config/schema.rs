//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Plain listener and worker pool.
    pub listener: ListenerConfig,

    /// Optional TLS-terminated listener.
    pub tls: Option<TlsConfig>,

    /// CONNECT tunnel settings.
    pub tunnel: TunnelConfig,

    /// Forward (non-CONNECT) request settings.
    pub forward: ForwardConfig,

    /// Request framing limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Shutdown behaviour.
    pub shutdown: ShutdownConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8989").
    pub bind_address: String,

    /// Worker pool capacity: connections processed concurrently.
    pub max_connections: usize,

    /// Accepted connections allowed to wait for a free worker.
    /// Connections beyond this are closed immediately.
    pub queue_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8989".to_string(),
            max_connections: 128,
            queue_capacity: 256,
        }
    }
}

/// TLS-terminated listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Bind address of the TLS listener.
    pub bind_address: String,

    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// CONNECT tunnel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Watchdog interval. A tunnel with no traffic for a whole interval is closed.
    pub idle_interval_ms: u64,

    /// Timeout for connecting to the CONNECT target, in seconds.
    pub connect_timeout_secs: u64,

    /// Copy buffer size per direction.
    pub buffer_size: usize,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            idle_interval_ms: 5_000,
            connect_timeout_secs: 10,
            buffer_size: 16 * 1024,
        }
    }
}

/// Forward request configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Timeout for connecting to the origin, in seconds.
    pub connect_timeout_secs: u64,

    /// PEM bundle trusted for `https` origins instead of the built-in roots.
    pub ca_cert_path: Option<String>,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            ca_cert_path: None,
        }
    }
}

/// Request framing limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of the request line plus headers.
    pub max_preamble_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_preamble_bytes: crate::http::preamble::DEFAULT_MAX_PREAMBLE_BYTES,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Expose Prometheus metrics.
    pub metrics_enabled: bool,

    /// Bind address of the metrics endpoint.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long in-flight connections may keep running after shutdown starts.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 30,
        }
    }
}
