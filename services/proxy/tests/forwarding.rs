
use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use harness::{traced, traced_with_returns, untraced, EchoBackend, ProxyHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tproxy_wire::{
    encode_message, ApplicationErrorKind, ApplicationException, Field, Framing, Message,
    MessageType, ThriftCodec, Value,
};

#[tokio::test]
async fn echo_is_forwarded_and_traced() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let proxy = ProxyHandle::start(&backend, traced()).await.unwrap();
    let mut client = proxy.client().await;

    assert_eq!(client.echo("hi").await, "hi");
    assert_eq!(proxy.sink.lines(), vec!["echo(message='hi')"]);
    assert_eq!(backend.received(), vec!["echo"]);
}

#[tokio::test]
async fn return_values_follow_the_call() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let proxy = ProxyHandle::start(&backend, traced_with_returns()).await.unwrap();
    let mut client = proxy.client().await;

    assert_eq!(client.echo("hi").await, "hi");
    let reply = client
        .call("add", vec![Field::new(1, Value::I32(2)), Field::new(2, Value::I32(40))])
        .await;
    assert_eq!(reply.field(0), Some(&Value::I32(42)));

    assert_eq!(
        proxy.sink.lines(),
        vec!["echo(message='hi') -> 'hi'", "add(a=2, b=40) -> 42"]
    );
}

#[tokio::test]
async fn no_trace_emits_nothing() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let proxy = ProxyHandle::start(&backend, untraced()).await.unwrap();
    let mut client = proxy.client().await;

    for _ in 0..3 {
        assert_eq!(client.echo("hi").await, "hi");
    }

    assert!(proxy.sink.lines().is_empty());
    assert_eq!(proxy.sink.pending(), "");
    assert_eq!(backend.received().len(), 3);
}

#[tokio::test]
async fn declared_exception_passes_through() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let proxy = ProxyHandle::start(&backend, traced_with_returns()).await.unwrap();
    let mut client = proxy.client().await;

    let reply = client
        .call("fail", vec![Field::new(1, Value::string("nope"))])
        .await;
    assert_eq!(reply.kind, MessageType::Reply);
    assert!(reply.field(0).is_none());
    assert_eq!(
        reply.field(1),
        Some(&Value::Struct(vec![
            Field::new(1, Value::string("nope")),
            Field::new(2, Value::I32(7)),
        ]))
    );

    assert_eq!(
        proxy.sink.lines(),
        vec!["fail(reason='nope') -> raised EchoError(reason='nope', code=7)"]
    );
}

#[tokio::test]
async fn replies_are_bit_identical() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let proxy = ProxyHandle::start(&backend, untraced()).await.unwrap();
    let mut stream = TcpStream::connect(proxy.listen_addr).await.unwrap();

    // Legacy header on purpose: the header form must survive the round trip.
    let mut call = Message::new(
        "pair",
        MessageType::Call,
        77,
        vec![Field::new(1, Value::string("left")), Field::new(2, Value::I64(-5))],
    );
    call.strict = false;
    let mut payload = BytesMut::new();
    encode_message(&call, &mut payload);
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(&payload).await.unwrap();

    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await.unwrap();
    let mut reply = vec![0u8; u32::from_be_bytes(len) as usize];
    stream.read_exact(&mut reply).await.unwrap();

    assert_eq!(Some(reply), backend.last_reply());
}

#[tokio::test]
async fn unknown_method_answered_by_proxy() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let proxy = ProxyHandle::start(&backend, traced()).await.unwrap();
    let mut client = proxy.client().await;

    let reply = client
        .call("shout", vec![Field::new(1, Value::string("hi"))])
        .await;
    assert_eq!(reply.kind, MessageType::Exception);
    assert_eq!(reply.seq_id, 1);
    let exc = ApplicationException::from_body(&reply.body);
    assert_eq!(exc.kind, ApplicationErrorKind::UnknownMethod);
    assert_eq!(exc.message, "Unknown function shout");

    // The connection stays usable and the backend never saw the call.
    assert_eq!(client.echo("still here").await, "still here");
    assert_eq!(backend.received(), vec!["echo"]);
    assert!(proxy.sink.lines().iter().all(|line| !line.contains("shout")));
    assert_eq!(
        proxy.proxy.stats().calls_rejected.load(Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn inherited_method_is_forwarded() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let proxy = ProxyHandle::start(&backend, traced_with_returns()).await.unwrap();
    let mut client = proxy.client().await;

    let reply = client.call("ping", vec![]).await;
    assert_eq!(reply.field(0).and_then(Value::as_str), Some("pong"));
    assert_eq!(proxy.sink.lines(), vec!["ping() -> 'pong'"]);
}

#[tokio::test]
async fn oneway_calls_get_no_reply() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let proxy = ProxyHandle::start(&backend, traced_with_returns()).await.unwrap();
    let mut client = proxy.client().await;

    client
        .oneway("notify", vec![Field::new(1, Value::string("heads up"))])
        .await;
    // The next reply on the connection belongs to the echo call.
    assert_eq!(client.echo("after").await, "after");

    assert_eq!(backend.received(), vec!["notify", "echo"]);
    assert_eq!(
        proxy.sink.lines(),
        vec!["notify(text='heads up') -> None", "echo(message='after') -> 'after'"]
    );
}

#[tokio::test]
async fn struct_results_render_with_field_names() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let proxy = ProxyHandle::start(&backend, traced_with_returns()).await.unwrap();
    let mut client = proxy.client().await;

    client
        .call("pair", vec![Field::new(1, Value::string("l")), Field::new(2, Value::I64(9))])
        .await;
    assert_eq!(
        proxy.sink.lines(),
        vec!["pair(left='l', right=9) -> Pair(left='l', right=9)"]
    );
}

#[tokio::test]
async fn buffered_transport_end_to_end() {
    let backend = EchoBackend::spawn(Framing::Buffered).await.unwrap();
    let proxy = ProxyHandle::start_with(backend.port(), "Echo.Client", traced(), Framing::Buffered)
        .await
        .unwrap();
    let mut client = proxy.client().await;

    assert_eq!(client.echo("one").await, "one");
    assert_eq!(client.echo("two").await, "two");
    assert_eq!(
        proxy.sink.lines(),
        vec!["echo(message='one')", "echo(message='two')"]
    );
}

#[tokio::test]
async fn callers_share_one_backend_connection() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let proxy = ProxyHandle::start(&backend, traced()).await.unwrap();

    for i in 0..3 {
        let mut client = proxy.client().await;
        let message = format!("call {}", i);
        assert_eq!(client.echo(&message).await, message);
    }

    assert_eq!(backend.connection_count(), 1);
    assert_eq!(proxy.sink.lines().len(), 3);
    assert_eq!(
        proxy.proxy.stats().calls_forwarded.load(Ordering::Relaxed),
        3
    );
}

#[tokio::test]
async fn backend_loss_closes_caller_connection() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let proxy = ProxyHandle::start(&backend, traced_with_returns()).await.unwrap();
    let mut client = proxy.client().await;
    assert_eq!(client.echo("first").await, "first");

    // Close the backend link out from under the proxy.
    assert!(proxy.proxy.backend().lock().await.close().await);

    client
        .oneway("notify", vec![Field::new(1, Value::string("x"))])
        .await;
    let mut stream = client.into_stream();
    let mut buf = [0u8; 16];
    let read = timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("proxy kept the connection open");
    assert!(matches!(read, Ok(0) | Err(_)));

    let lines = proxy.sink.lines();
    assert_eq!(lines[0], "echo(message='first') -> 'first'");
    assert!(lines[1].starts_with("notify(text='x') !! "), "{}", lines[1]);
    assert!(!proxy.proxy.shutdown().await);
}

#[tokio::test]
async fn legacy_headers_are_forwarded() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let proxy = ProxyHandle::start(&backend, traced()).await.unwrap();
    let stream = TcpStream::connect(proxy.listen_addr).await.unwrap();
    let mut framed = Framed::new(stream, ThriftCodec::new(Framing::Framed));

    let mut call = Message::new("echo", MessageType::Call, 5, vec![Field::new(1, Value::string("old"))]);
    call.strict = false;
    framed.send(call).await.unwrap();
    let reply = framed.next().await.unwrap().unwrap();

    assert!(!reply.strict);
    assert_eq!(reply.seq_id, 5);
    assert_eq!(reply.field(0).and_then(Value::as_str), Some("old"));
}
