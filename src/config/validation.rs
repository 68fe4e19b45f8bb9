//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, pool sizes > 0)
//! - Validate addresses parse and listeners do not collide
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// Smallest head that can hold a request line and the terminator.
const MIN_PREAMBLE_BYTES: usize = 16;

/// Upper bounds keeping the worker pool's semaphores constructible.
pub const MAX_WORKERS: usize = 65_536;
pub const MAX_QUEUE: usize = 1 << 20;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("limits.max_preamble_bytes must be at least 16, got {0}")]
    PreambleTooSmall(usize),

    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: usize },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("tls.bind_address must differ from listener.bind_address ({0})")]
    ListenerCollision(String),

    #[error("observability.log_format must be 'pretty' or 'json', got '{0}'")]
    LogFormat(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_nonzero(&mut errors, "listener.max_connections", config.listener.max_connections as u64);
    check_at_most(&mut errors, "listener.max_connections", config.listener.max_connections, MAX_WORKERS);
    check_at_most(&mut errors, "listener.queue_capacity", config.listener.queue_capacity, MAX_QUEUE);
    check_nonzero(&mut errors, "tunnel.idle_interval_ms", config.tunnel.idle_interval_ms);
    check_nonzero(&mut errors, "tunnel.connect_timeout_secs", config.tunnel.connect_timeout_secs);
    check_nonzero(&mut errors, "tunnel.buffer_size", config.tunnel.buffer_size as u64);
    check_nonzero(&mut errors, "forward.connect_timeout_secs", config.forward.connect_timeout_secs);

    if config.limits.max_preamble_bytes < MIN_PREAMBLE_BYTES {
        errors.push(ValidationError::PreambleTooSmall(config.limits.max_preamble_bytes));
    }

    if let Some(path) = &config.forward.ca_cert_path {
        if path.trim().is_empty() {
            errors.push(ValidationError::Empty { field: "forward.ca_cert_path" });
        }
    }

    if let Some(tls) = &config.tls {
        check_address(&mut errors, "tls.bind_address", &tls.bind_address);
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::Empty { field: "tls.cert_path" });
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::Empty { field: "tls.key_path" });
        }
        if tls.bind_address == config.listener.bind_address {
            errors.push(ValidationError::ListenerCollision(tls.bind_address.clone()));
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &observability.metrics_address);
    }
    if !matches!(observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::LogFormat(observability.log_format.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_nonzero(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::Zero { field });
    }
}

fn check_at_most(errors: &mut Vec<ValidationError>, field: &'static str, value: usize, max: usize) {
    if value > max {
        errors.push(ValidationError::TooLarge { field, max });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TlsConfig;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.listener.max_connections = 0;
        config.tunnel.idle_interval_ms = 0;
        config.limits.max_preamble_bytes = 4;
        config.observability.log_format = "xml".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::Zero { field: "listener.max_connections" }));
        assert!(errors.contains(&ValidationError::PreambleTooSmall(4)));
    }

    #[test]
    fn tls_listener_checks() {
        let mut config = ProxyConfig::default();
        config.tls = Some(TlsConfig {
            bind_address: config.listener.bind_address.clone(),
            cert_path: "".into(),
            key_path: "key.pem".into(),
        });

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::Empty { field: "tls.cert_path" }));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::ListenerCollision(_))));
    }

    #[test]
    fn oversized_pool_is_rejected() {
        let mut config = ProxyConfig::default();
        config.listener.max_connections = usize::MAX;
        config.listener.queue_capacity = 9_223_372_036_854_775_807;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::TooLarge {
            field: "listener.max_connections",
            max: MAX_WORKERS,
        }));
        assert!(errors.contains(&ValidationError::TooLarge {
            field: "listener.queue_capacity",
            max: MAX_QUEUE,
        }));
    }

    #[test]
    fn largest_pool_still_builds() {
        let mut config = ProxyConfig::default();
        config.listener.max_connections = MAX_WORKERS;
        config.listener.queue_capacity = MAX_QUEUE;
        assert_eq!(validate_config(&config), Ok(()));

        let pool = crate::net::WorkerPool::new(MAX_WORKERS, MAX_QUEUE);
        assert!(pool.try_admit().is_some());
    }
}
