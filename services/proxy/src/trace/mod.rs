//! Call tracing.
//!
//! Each forwarded call produces one line:
//!
//! ```text
//! echo(message='hi')               tracing on
//! echo(message='hi') -> 'hi'       with return values
//! echo(message='hi') !! <error>    with return values, transport failure
//! ```
//!
//! The pre-call part is written before the call goes out; the rest follows
//! once it completes. Callers hold the backend lock across both halves so
//! lines from different calls never interleave.

mod render;
mod sink;

use std::fmt;
use std::sync::Arc;

use tproxy_wire::{ApplicationException, Message, MessageType};

use crate::service::{MethodDescriptor, ServiceDescriptor};
use render::{str_repr, Renderer};

pub use sink::{CaptureSink, StdoutSink, TraceSink};

/// What to trace. Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceConfig {
    /// Emit a line per call.
    pub enabled: bool,
    /// Append the rendered result to each line.
    pub show_return_values: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            show_return_values: false,
        }
    }
}

/// One rendered call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub method: String,
    /// `name=value` pairs.
    pub args: Vec<String>,
    pub result: Option<String>,
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.method, self.args.join(", "))?;
        if let Some(result) = &self.result {
            write!(f, " -> {}", result)?;
        }
        Ok(())
    }
}

/// Renders calls and writes them to a [`TraceSink`].
pub struct CallTracer {
    config: TraceConfig,
    descriptor: Arc<ServiceDescriptor>,
    sink: Arc<dyn TraceSink>,
}

impl CallTracer {
    pub fn new(
        config: TraceConfig,
        descriptor: Arc<ServiceDescriptor>,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        Self {
            config,
            descriptor,
            sink,
        }
    }

    pub fn config(&self) -> TraceConfig {
        self.config
    }

    /// Render the arguments of `call`.
    pub fn record(&self, method: &MethodDescriptor, call: &Message) -> TraceRecord {
        let renderer = Renderer::new(&self.descriptor);
        TraceRecord {
            method: method.name.clone(),
            args: renderer.labeled(&call.body, &method.args),
            result: None,
        }
    }

    /// Render the outcome of a call; `None` stands for a oneway call.
    pub fn render_result(&self, method: &MethodDescriptor, reply: Option<&Message>) -> String {
        let Some(reply) = reply else {
            return "None".to_string();
        };
        let renderer = Renderer::new(&self.descriptor);

        if reply.kind == MessageType::Exception {
            let exc = ApplicationException::from_body(&reply.body);
            return format!(
                "raised TApplicationException(type={}, message={})",
                exc.kind,
                str_repr(&exc.message)
            );
        }

        if let Some(value) = reply.field(0) {
            return renderer.repr(value, method.returns.as_ref());
        }

        for field in &reply.body {
            if let Some(entry) = method.throws.by_field_id(field.id) {
                return format!("raised {}", renderer.repr(&field.value, Some(&entry.ty)));
            }
        }

        match reply.body.first() {
            Some(field) => format!("field_{}={}", field.id, renderer.repr(&field.value, None)),
            None => "None".to_string(),
        }
    }

    /// Emit the pre-call half of the line.
    pub fn before_call(&self, method: &MethodDescriptor, call: &Message) {
        if !self.config.enabled {
            return;
        }
        let record = self.record(method, call);
        self.sink
            .write(&record.to_string(), !self.config.show_return_values);
    }

    /// Finish the line with the call's result.
    pub fn after_call(&self, method: &MethodDescriptor, reply: Option<&Message>) {
        if self.config.enabled && self.config.show_return_values {
            let rendered = self.render_result(method, reply);
            self.sink.write(&format!(" -> {}", rendered), true);
        }
    }

    /// Finish the line for a call that failed in transit.
    pub fn call_failed(&self, error: &dyn fmt::Display) {
        if self.config.enabled && self.config.show_return_values {
            self.sink.write(&format!(" !! {}", error), true);
        }
    }
}

impl fmt::Debug for CallTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallTracer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tproxy_idl::{parse_document, Program};
    use tproxy_wire::{ApplicationErrorKind, Field, Value};

    use crate::service::{describe, ServiceTypeName};

    const IDL: &str = r#"
        exception Oops { 1: string why, 2: i32 code }
        service Echo {
            string echo(1: string message),
            i32 add(1: i32 a, 2: i32 b),
            void reset(),
            string risky(1: string input) throws (1: Oops oops),
            oneway void fire(1: i64 at),
        }
    "#;

    fn tracer(config: TraceConfig) -> (CallTracer, Arc<CaptureSink>) {
        let program = Program::from_document(parse_document("Echo", "Echo.thrift", IDL).unwrap());
        let descriptor = describe(&program, &ServiceTypeName::parse("Echo").unwrap()).unwrap();
        let sink = Arc::new(CaptureSink::new());
        let tracer = CallTracer::new(config, Arc::new(descriptor), sink.clone());
        (tracer, sink)
    }

    fn call(name: &str, body: Vec<Field>) -> Message {
        Message::new(name, MessageType::Call, 1, body)
    }

    fn reply(name: &str, body: Vec<Field>) -> Message {
        Message::new(name, MessageType::Reply, 1, body)
    }

    #[test]
    fn test_single_line_without_return_values() {
        let (tracer, sink) = tracer(TraceConfig::default());
        let descriptor = Arc::clone(&tracer.descriptor);
        let method = descriptor.method("echo").unwrap();
        let msg = call("echo", vec![Field::new(1, Value::string("hi"))]);

        tracer.before_call(method, &msg);
        tracer.after_call(method, Some(&reply("echo", vec![Field::new(0, Value::string("hi"))])));

        assert_eq!(sink.lines(), vec!["echo(message='hi')"]);
        assert_eq!(sink.pending(), "");
    }

    #[test]
    fn test_return_value_appended() {
        let (tracer, sink) = tracer(TraceConfig {
            enabled: true,
            show_return_values: true,
        });
        let descriptor = Arc::clone(&tracer.descriptor);
        let method = descriptor.method("echo").unwrap();
        let msg = call("echo", vec![Field::new(1, Value::string("hi"))]);

        tracer.before_call(method, &msg);
        assert!(sink.lines().is_empty());
        assert_eq!(sink.pending(), "echo(message='hi')");

        tracer.after_call(method, Some(&reply("echo", vec![Field::new(0, Value::string("hi"))])));
        assert_eq!(sink.lines(), vec!["echo(message='hi') -> 'hi'"]);
    }

    #[test]
    fn test_disabled_emits_nothing() {
        let (tracer, sink) = tracer(TraceConfig {
            enabled: false,
            show_return_values: true,
        });
        let descriptor = Arc::clone(&tracer.descriptor);
        let method = descriptor.method("echo").unwrap();
        for _ in 0..3 {
            tracer.before_call(method, &call("echo", vec![Field::new(1, Value::string("hi"))]));
            tracer.after_call(method, None);
            tracer.call_failed(&"boom");
        }
        assert!(sink.lines().is_empty());
        assert_eq!(sink.pending(), "");
    }

    #[test]
    fn test_args_in_schema_order() {
        let (tracer, _) = tracer(TraceConfig::default());
        let descriptor = Arc::clone(&tracer.descriptor);
        let method = descriptor.method("add").unwrap();
        let msg = call(
            "add",
            vec![
                Field::new(2, Value::I32(5)),
                Field::new(7, Value::Bool(true)),
                Field::new(1, Value::I32(3)),
            ],
        );
        assert_eq!(tracer.record(method, &msg).to_string(), "add(a=3, b=5, field_7=True)");
    }

    #[test]
    fn test_result_rendering() {
        let (tracer, _) = tracer(TraceConfig::default());
        let descriptor = Arc::clone(&tracer.descriptor);

        let reset = descriptor.method("reset").unwrap();
        assert_eq!(tracer.render_result(reset, Some(&reply("reset", vec![]))), "None");

        let fire = descriptor.method("fire").unwrap();
        assert_eq!(tracer.render_result(fire, None), "None");

        let risky = descriptor.method("risky").unwrap();
        let raised = reply(
            "risky",
            vec![Field::new(
                1,
                Value::Struct(vec![
                    Field::new(1, Value::string("nope")),
                    Field::new(2, Value::I32(7)),
                ]),
            )],
        );
        assert_eq!(
            tracer.render_result(risky, Some(&raised)),
            "raised Oops(why='nope', code=7)"
        );

        let exc = ApplicationException::new(ApplicationErrorKind::InternalError, "bad")
            .into_message("risky", 1);
        assert_eq!(
            tracer.render_result(risky, Some(&exc)),
            "raised TApplicationException(type=INTERNAL_ERROR, message='bad')"
        );
    }

    #[test]
    fn test_failure_terminates_line() {
        let (tracer, sink) = tracer(TraceConfig {
            enabled: true,
            show_return_values: true,
        });
        let descriptor = Arc::clone(&tracer.descriptor);
        let method = descriptor.method("echo").unwrap();
        tracer.before_call(method, &call("echo", vec![Field::new(1, Value::string("hi"))]));
        tracer.call_failed(&"transport error: connection reset");
        assert_eq!(
            sink.lines(),
            vec!["echo(message='hi') !! transport error: connection reset"]
        );
    }
}
