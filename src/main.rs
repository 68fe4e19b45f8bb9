//! Forward proxy binary.
//!
//! Startup: parse flags → load config → init logging and metrics → bind
//! listeners → dispatch until SIGINT/SIGTERM → drain → exit.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use forward_proxy::config::{load_config, validate_config, ConfigError, ProxyConfig};
use forward_proxy::lifecycle::signals::wait_for_signal;
use forward_proxy::net::tls::load_tls_acceptor;
use forward_proxy::net::{Dispatcher, Listener};
use forward_proxy::observability::logging::{init_logging, LogFormat};
use forward_proxy::observability::metrics::init_metrics;
use forward_proxy::upstream::HyperUpstream;
use forward_proxy::Shutdown;

#[derive(Parser, Debug)]
#[command(name = "forward-proxy")]
#[command(about = "HTTP forward proxy with CONNECT tunnelling", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the port of the plain listener.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the log format: "pretty" or "json".
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    let log_format = match args.log_format {
        Some(format) => format,
        None => config.observability.log_format.parse::<LogFormat>()?,
    };
    init_logging(log_format)?;

    tracing::info!("forward-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.tls.is_some(),
        max_connections = config.listener.max_connections,
        queue_capacity = config.listener.queue_capacity,
        idle_interval_ms = config.tunnel.idle_interval_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut listeners = vec![Listener::bind(&config.listener.bind_address, None).await?];
    if let Some(tls) = &config.tls {
        let acceptor = load_tls_acceptor(Path::new(&tls.cert_path), Path::new(&tls.key_path))?;
        listeners.push(Listener::bind(&tls.bind_address, Some(acceptor)).await?);
    }

    let upstream = Arc::new(HyperUpstream::new(&config.forward)?);
    let dispatcher = Arc::new(Dispatcher::new(config, upstream));

    let shutdown = Shutdown::new();
    let serving = tokio::spawn(Arc::clone(&dispatcher).run(listeners, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();
    serving.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Load the config file (or defaults) and apply command-line overrides.
fn resolve_config(args: &Args) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(port) = args.port {
        config.listener.bind_address = with_port(&config.listener.bind_address, port);
        validate_config(&config).map_err(ConfigError::Validation)?;
    }
    Ok(config)
}

fn with_port(bind_address: &str, port: u16) -> String {
    match bind_address.parse::<SocketAddr>() {
        Ok(mut addr) => {
            addr.set_port(port);
            addr.to_string()
        }
        Err(_) => format!("0.0.0.0:{}", port),
    }
}
