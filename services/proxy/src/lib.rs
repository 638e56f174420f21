//! tproxy: a transparent forwarding proxy for Thrift services.
//!
//! Given a service type name, the proxy loads the service's IDL, builds a
//! forwarding delegate for every method, and relays each inbound call to a
//! single backend connection unchanged, optionally tracing the call and its
//! result.

pub mod app;
pub mod backend;
pub mod config;
pub mod error;
pub mod forward;
pub mod server;
pub mod service;
pub mod trace;

pub use app::{load_descriptor, method_summary, run, startup_banner, Proxy};
pub use backend::{with_backend, BackendConfig, BackendConnection, SharedBackend};
pub use config::{Cli, ProxyConfig};
pub use error::ProxyError;
pub use forward::{ForwardingDelegate, ServiceObject};
pub use server::{Processed, Processor, ProxyServer, ServerConfig, ServerStats, ServiceHandler};
pub use service::{describe, ServiceDescriptor, ServiceKind, ServiceTypeName};
pub use trace::{CallTracer, CaptureSink, StdoutSink, TraceConfig, TraceRecord, TraceSink};
