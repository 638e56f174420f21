//! Startup and shutdown.
//!
//! Startup order:
//! 1. Load the IDL module named by the service type
//! 2. Describe the service (aborts before any connection on bad input)
//! 3. Open the backend connection
//! 4. Build the service object and bind the listener
//!
//! If binding fails the backend is closed before the error is returned.
//! Shutdown stops the server first, cancelling any call still waiting on the
//! backend, and then closes the backend.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tproxy_idl::IdlLoader;
use tproxy_wire::Framing;

use crate::backend::{with_backend, BackendConnection, SharedBackend};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::forward::ServiceObject;
use crate::server::{Processor, ProxyServer, ServerStats, ServiceHandler};
use crate::service::{describe, ServiceDescriptor};
use crate::trace::{CallTracer, TraceSink};

/// Load and describe the configured service.
pub fn load_descriptor(config: &ProxyConfig) -> Result<ServiceDescriptor, ProxyError> {
    let loader = IdlLoader::new(config.idl_paths.iter().cloned());
    let program = loader.load(&config.service_type.module)?;
    let descriptor = describe(&program, &config.service_type)?;

    info!(
        service = %config.service_type,
        methods = descriptor.len(),
        "Service described"
    );
    Ok(descriptor)
}

/// `<name> proxy for <signature>` per method, followed by its doc lines.
pub fn method_summary(descriptor: &ServiceDescriptor) -> Vec<String> {
    let mut lines = Vec::new();
    for method in descriptor.methods() {
        lines.push(format!("{} proxy for {}", method.name, method.signature));
        if let Some(doc) = &method.doc {
            lines.extend(doc.lines().map(|line| format!("    {}", line)));
        }
    }
    lines
}

/// Lines printed at startup with `--verbose`; empty otherwise.
pub fn startup_banner(config: &ProxyConfig, descriptor: &ServiceDescriptor) -> Vec<String> {
    if !config.verbose {
        return Vec::new();
    }
    let mut lines = Vec::new();
    if config.backend.framing == Framing::Buffered {
        lines.push("Using buffered transport".to_string());
    }
    lines.extend(method_summary(descriptor));
    lines
}

/// A running proxy: described service, open backend, bound listener.
pub struct Proxy {
    service: Arc<ServiceObject>,
    backend: SharedBackend,
    server: Arc<ProxyServer>,
}

impl Proxy {
    /// Run every startup step and return a proxy ready to serve.
    pub async fn start(config: &ProxyConfig, sink: Arc<dyn TraceSink>) -> Result<Self, ProxyError> {
        let descriptor = load_descriptor(config)?;
        let backend = BackendConnection::open(&config.backend).await?.into_shared();
        Self::assemble(config, descriptor, backend, sink).await
    }

    /// Build the service object over an open backend and bind the listener.
    async fn assemble(
        config: &ProxyConfig,
        descriptor: ServiceDescriptor,
        backend: SharedBackend,
        sink: Arc<dyn TraceSink>,
    ) -> Result<Self, ProxyError> {
        let descriptor = Arc::new(descriptor);
        let tracer = Arc::new(CallTracer::new(config.trace, Arc::clone(&descriptor), sink));
        let service = Arc::new(ServiceObject::build(
            descriptor,
            Arc::clone(&backend),
            tracer,
        ));
        let handler: Arc<dyn ServiceHandler> = service.clone();
        let processor = Arc::new(Processor::new(handler));

        let server = match ProxyServer::bind(config.server.clone(), processor).await {
            Ok(server) => server,
            Err(e) => {
                backend.lock().await.close().await;
                return Err(e);
            }
        };

        Ok(Self {
            service,
            backend,
            server: Arc::new(server),
        })
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        self.service.descriptor()
    }

    pub fn service(&self) -> &ServiceObject {
        &self.service
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.server.local_addr()
    }

    pub fn stats(&self) -> &ServerStats {
        self.server.stats()
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    /// Accept callers until the returned future is dropped.
    pub async fn serve(&self) -> Result<(), ProxyError> {
        Arc::clone(&self.server).run().await.map_err(ProxyError::Server)
    }

    /// Stop serving and close the backend. Returns false if the backend
    /// was already closed.
    pub async fn shutdown(&self) -> bool {
        self.server.shutdown().await;
        self.backend.lock().await.close().await
    }
}

/// Run the proxy until `shutdown` completes.
///
/// The backend is opened after the service has been described and closed
/// on every exit path.
pub async fn run<S>(config: &ProxyConfig, sink: Arc<dyn TraceSink>, shutdown: S) -> Result<(), ProxyError>
where
    S: Future<Output = ()>,
{
    let descriptor = load_descriptor(config)?;
    for line in startup_banner(config, &descriptor) {
        sink.write(&line, true);
    }

    with_backend(&config.backend, |backend| async move {
        let proxy = Proxy::assemble(config, descriptor, backend, sink).await?;
        let local_addr = proxy.local_addr().map_err(ProxyError::Server)?;
        info!(
            listen_addr = %local_addr,
            backend_addr = %config.backend.addr(),
            service = %config.service_type,
            "Proxy ready"
        );

        let result = tokio::select! {
            result = proxy.serve() => {
                if let Err(e) = &result {
                    warn!(error = %e, "Proxy server stopped");
                }
                result
            }
            _ = shutdown => {
                info!("Shutting down");
                Ok(())
            }
        };

        // Releases the backend lock held by any call still in flight.
        proxy.server.shutdown().await;
        result
    })
    .await
}
