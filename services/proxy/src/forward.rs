//! The proxy object: one forwarding delegate per service method.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tproxy_wire::{Message, MessageType};

use crate::backend::SharedBackend;
use crate::error::ProxyError;
use crate::server::ServiceHandler;
use crate::service::{MethodDescriptor, ServiceDescriptor};
use crate::trace::CallTracer;

/// Forwards calls of one method to the backend.
pub struct ForwardingDelegate {
    method: MethodDescriptor,
    backend: SharedBackend,
    tracer: Arc<CallTracer>,
}

impl ForwardingDelegate {
    pub fn new(method: MethodDescriptor, backend: SharedBackend, tracer: Arc<CallTracer>) -> Self {
        Self {
            method,
            backend,
            tracer,
        }
    }

    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Send `call` to the backend and return its reply untouched.
    ///
    /// The backend lock is held from the pre-call trace until the reply has
    /// been traced.
    pub async fn invoke(&self, call: Message) -> Result<Option<Message>, ProxyError> {
        let expect_reply = !self.method.oneway && call.kind != MessageType::Oneway;
        let mut backend = self.backend.lock().await;

        self.tracer.before_call(&self.method, &call);
        let result = backend.call(call, expect_reply).await;
        match &result {
            Ok(reply) => self.tracer.after_call(&self.method, reply.as_ref()),
            Err(e) => self.tracer.call_failed(e),
        }

        result.map_err(|source| ProxyError::ForwardedCallFailure {
            method: self.method.name.clone(),
            source,
        })
    }
}

/// Dispatch table with exactly the methods of the described service.
pub struct ServiceObject {
    descriptor: Arc<ServiceDescriptor>,
    delegates: HashMap<String, ForwardingDelegate>,
}

impl ServiceObject {
    /// Create a delegate for every method in `descriptor`.
    pub fn build(
        descriptor: Arc<ServiceDescriptor>,
        backend: SharedBackend,
        tracer: Arc<CallTracer>,
    ) -> Self {
        let delegates = descriptor
            .methods()
            .iter()
            .map(|method| {
                let delegate =
                    ForwardingDelegate::new(method.clone(), Arc::clone(&backend), Arc::clone(&tracer));
                (method.name.clone(), delegate)
            })
            .collect::<HashMap<_, _>>();

        debug!(
            service = %descriptor.type_name,
            methods = delegates.len(),
            "Built service object"
        );

        Self {
            descriptor,
            delegates,
        }
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Method names in declaration order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.descriptor.method_names()
    }

    pub fn delegate(&self, name: &str) -> Option<&ForwardingDelegate> {
        self.delegates.get(name)
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }
}

#[async_trait]
impl ServiceHandler for ServiceObject {
    fn has_method(&self, name: &str) -> bool {
        self.delegates.contains_key(name)
    }

    async fn handle(&self, call: Message) -> Result<Option<Message>, ProxyError> {
        match self.delegates.get(&call.name) {
            Some(delegate) => delegate.invoke(call).await,
            None => Err(ProxyError::SchemaNotFound {
                method: call.name,
                reason: "not a method of this service".to_string(),
            }),
        }
    }
}
