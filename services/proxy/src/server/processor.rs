//! Dispatch of decoded calls to a service handler.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use tproxy_wire::{ApplicationErrorKind, ApplicationException, Message};

use crate::error::ProxyError;

/// Something that can answer calls by method name.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Whether `name` is a method of this service.
    fn has_method(&self, name: &str) -> bool;

    /// Answer `call`. Oneway calls yield `Ok(None)`.
    async fn handle(&self, call: Message) -> Result<Option<Message>, ProxyError>;
}

/// Outcome of processing one inbound message.
#[derive(Debug)]
pub enum Processed {
    /// The handler ran; its reply, if any, goes back to the caller.
    Handled(Option<Message>),
    /// The processor answered on its own with a `TApplicationException`.
    Rejected(Message),
}

impl Processed {
    /// The message to write back, if any.
    pub fn into_reply(self) -> Option<Message> {
        match self {
            Processed::Handled(reply) => reply,
            Processed::Rejected(reply) => Some(reply),
        }
    }
}

/// Routes inbound calls to a [`ServiceHandler`].
pub struct Processor {
    handler: Arc<dyn ServiceHandler>,
}

impl Processor {
    pub fn new(handler: Arc<dyn ServiceHandler>) -> Self {
        Self { handler }
    }

    /// Process one inbound message.
    ///
    /// Unknown methods and non-call message types are answered here with a
    /// `TApplicationException` carrying the caller's sequence id. Errors
    /// from the handler are returned so the connection can be dropped.
    pub async fn process(&self, msg: Message) -> Result<Processed, ProxyError> {
        if !msg.is_request() {
            warn!(method = %msg.name, kind = ?msg.kind, "Inbound message is not a call");
            let reason = format!("unexpected message type {:?}", msg.kind);
            return Ok(Processed::Rejected(reject(
                &msg,
                ApplicationErrorKind::InvalidMessageType,
                reason,
            )));
        }

        if !self.handler.has_method(&msg.name) {
            debug!(method = %msg.name, seq_id = msg.seq_id, "Unknown method");
            let reason = format!("Unknown function {}", msg.name);
            return Ok(Processed::Rejected(reject(
                &msg,
                ApplicationErrorKind::UnknownMethod,
                reason,
            )));
        }

        self.handler.handle(msg).await.map(Processed::Handled)
    }
}

/// Build an exception reply mirroring the header form of `msg`.
fn reject(msg: &Message, kind: ApplicationErrorKind, reason: String) -> Message {
    let mut reply = ApplicationException::new(kind, reason).into_message(msg.name.clone(), msg.seq_id);
    reply.strict = msg.strict;
    reply
}
