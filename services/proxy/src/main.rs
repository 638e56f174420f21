//! tproxy
//!
//! Transparent Thrift forwarding proxy.
//!
//! This binary:
//! - Loads the IDL of the service named on the command line
//! - Connects to the backend at `--hostname:<CLIENT_PORT>`
//! - Accepts callers on `<LISTEN_PORT>` and forwards every call unchanged
//! - Prints a trace line per call to stdout; logs go to stderr

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tproxy::{Cli, ProxyConfig, StdoutSink};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ProxyConfig::from_cli(Cli::parse())?;

    // Initialize tracing (prefer RUST_LOG, fallback to --log-level)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    info!("Starting tproxy");
    info!(
        service = %config.service_type,
        listen_addr = %config.server.listen_addr,
        backend_addr = %config.backend.addr(),
        framing = %config.server.framing,
        trace = config.trace.enabled,
        return_values = config.trace.show_return_values,
        "Configuration loaded"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    if let Err(e) = tproxy::run(&config, Arc::new(StdoutSink), shutdown).await {
        error!(error = %e, "Proxy failed");
        return Err(e.into());
    }

    info!("tproxy stopped");
    Ok(())
}
