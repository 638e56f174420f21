//! Command line and configuration.
//!
//! Every option can also come from a `TPROXY_*` environment variable. The
//! parsed [`Cli`] is converted once into an immutable [`ProxyConfig`].

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Result};
use clap::Parser;
use tproxy_wire::{Framing, DEFAULT_MAX_FRAME_SIZE};

use crate::backend::{BackendConfig, DEFAULT_BACKEND_HOST};
use crate::server::{ServerConfig, DEFAULT_MAX_CONNECTIONS};
use crate::service::ServiceTypeName;
use crate::trace::TraceConfig;

/// tproxy - transparent Thrift forwarding proxy with call tracing.
#[derive(Debug, Parser)]
#[command(name = "tproxy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Service to proxy, e.g. `Echo.Client`, `echo.Echo` or `Echo.Iface`.
    service_type: String,

    /// Port to accept callers on.
    listen_port: u16,

    /// Port of the backend service.
    client_port: u16,

    /// Backend host.
    #[arg(long, env = "TPROXY_HOSTNAME", default_value = DEFAULT_BACKEND_HOST)]
    hostname: String,

    /// Print the introspected methods and their docs at startup.
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Include return values in the call trace.
    #[arg(long)]
    return_values: bool,

    /// Use the buffered transport instead of the framed one, on both sides.
    #[arg(long)]
    buffered: bool,

    /// Do not trace calls.
    #[arg(long)]
    no_trace: bool,

    /// Directory to search for IDL files. May be repeated.
    #[arg(long = "idl-path", env = "TPROXY_IDL_PATH", default_value = ".")]
    idl_paths: Vec<PathBuf>,

    /// Address to bind the listener to.
    #[arg(long, env = "TPROXY_LISTEN_HOST", default_value = "0.0.0.0")]
    listen_host: IpAddr,

    /// Maximum number of callers served at once.
    #[arg(long, env = "TPROXY_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    /// Backend connect timeout in milliseconds.
    #[arg(long, env = "TPROXY_CONNECT_TIMEOUT_MS", default_value_t = 2000)]
    connect_timeout_ms: u64,

    /// Largest accepted message or frame, in bytes.
    #[arg(long, env = "TPROXY_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,

    /// Log filter used when RUST_LOG is not set (trace, debug, info, warn, error).
    #[arg(long, env = "TPROXY_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Complete proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub service_type: ServiceTypeName,
    /// IDL search path, in order.
    pub idl_paths: Vec<PathBuf>,
    pub backend: BackendConfig,
    pub server: ServerConfig,
    pub trace: TraceConfig,
    /// Print introspected methods at startup.
    pub verbose: bool,
    pub log_level: String,
}

impl ProxyConfig {
    /// Configuration with defaults for everything but the three positionals.
    pub fn new(service_type: ServiceTypeName, listen_port: u16, client_port: u16) -> Self {
        Self {
            service_type,
            idl_paths: vec![PathBuf::from(".")],
            backend: BackendConfig::new(client_port),
            server: ServerConfig::new(listen_port),
            trace: TraceConfig::default(),
            verbose: false,
            log_level: "info".to_string(),
        }
    }

    /// Validate and convert parsed arguments.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        ensure!(cli.listen_port != 0, "listen port must not be 0");
        ensure!(cli.client_port != 0, "client port must not be 0");
        ensure!(cli.max_connections > 0, "--max-connections must be at least 1");
        ensure!(cli.connect_timeout_ms > 0, "--connect-timeout-ms must be positive");
        ensure!(cli.max_frame_size > 0, "--max-frame-size must be positive");

        let service_type = ServiceTypeName::parse(&cli.service_type)?;
        let mut config = Self::new(service_type, cli.listen_port, cli.client_port);

        config.idl_paths = cli.idl_paths;
        config.backend.hostname = cli.hostname;
        config.backend.connect_timeout = Duration::from_millis(cli.connect_timeout_ms);
        config.backend.max_frame_size = cli.max_frame_size;
        config.server.listen_addr = SocketAddr::new(cli.listen_host, cli.listen_port);
        config.server.max_connections = cli.max_connections;
        config.server.max_frame_size = cli.max_frame_size;
        config.set_framing(if cli.buffered {
            Framing::Buffered
        } else {
            Framing::Framed
        });
        config.trace = TraceConfig {
            enabled: !cli.no_trace,
            show_return_values: cli.return_values,
        };
        config.verbose = cli.verbose;
        config.log_level = cli.log_level;

        Ok(config)
    }

    /// Set the transport on both sides.
    pub fn set_framing(&mut self, framing: Framing) {
        self.backend.framing = framing;
        self.server.framing = framing;
    }
}
