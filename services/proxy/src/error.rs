//! Error types for the proxy.

use std::io;

use thiserror::Error;
use tproxy_idl::IdlError;
use tproxy_wire::WireError;

/// Errors raised while starting or running the proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The service type name does not resolve to a client or interface.
    #[error("malformed service type '{type_name}': {reason}")]
    MalformedServiceType { type_name: String, reason: String },

    /// A method's argument, return or exception types could not be resolved.
    #[error("no schema for method '{method}': {reason}")]
    SchemaNotFound { method: String, reason: String },

    /// The IDL module could not be found or parsed.
    #[error("service definition error: {0}")]
    ServiceDefinition(#[from] IdlError),

    /// The backend could not be reached at startup.
    #[error("backend {addr} unreachable: {source}")]
    BackendUnreachable {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A forwarded call failed at the transport or protocol level.
    #[error("forwarded call '{method}' failed: {source}")]
    ForwardedCallFailure {
        method: String,
        #[source]
        source: WireError,
    },

    /// The listen address could not be bound.
    #[error("failed to bind listener on {addr}: {source}")]
    ListenerBindFailure {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The accept loop stopped with an I/O error.
    #[error("server error: {0}")]
    Server(#[source] io::Error),
}

impl ProxyError {
    pub(crate) fn malformed(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedServiceType {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors that stop the proxy before it serves anything.
    pub fn is_startup_error(&self) -> bool {
        !matches!(
            self,
            ProxyError::ForwardedCallFailure { .. } | ProxyError::Server(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = ProxyError::malformed("Echo.Processor", "expected a Client or Iface suffix");
        assert_eq!(
            err.to_string(),
            "malformed service type 'Echo.Processor': expected a Client or Iface suffix"
        );
        assert!(err.is_startup_error());

        let err = ProxyError::ForwardedCallFailure {
            method: "echo".into(),
            source: WireError::Protocol("bad".into()),
        };
        assert_eq!(
            err.to_string(),
            "forwarded call 'echo' failed: protocol error: bad"
        );
        assert!(!err.is_startup_error());
    }
}
