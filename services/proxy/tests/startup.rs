
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use harness::{config, dead_port, traced, untraced, write_idl, EchoBackend};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tproxy::{load_descriptor, run, CaptureSink, Proxy, ProxyError, TraceSink};
use tproxy_wire::{Field, Framing, Message, MessageType, ThriftCodec, Value};

fn idl_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_idl(dir.path()).unwrap();
    dir
}

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn client_and_interface_describe_the_same_methods() {
    let dir = idl_dir();
    let expected = vec!["ping", "echo", "add", "fail", "pair", "notify"];

    for name in ["Echo.Client", "Echo.Iface", "Echo.Echo.Client", "Echo"] {
        let config = config(dir.path(), name, 9090, traced(), Framing::Framed).unwrap();
        let descriptor = load_descriptor(&config).unwrap();
        assert_eq!(descriptor.method_names().collect::<Vec<_>>(), expected, "{}", name);
    }
}

#[tokio::test]
async fn describing_twice_gives_the_same_result() {
    let dir = idl_dir();
    let config = config(dir.path(), "Echo.Client", 9090, traced(), Framing::Framed).unwrap();

    let first = load_descriptor(&config).unwrap();
    let second = load_descriptor(&config).unwrap();
    assert_eq!(first, second);

    let fail = first.method("fail").unwrap();
    assert_eq!(
        fail.signature,
        "string fail(1: string reason) throws (1: EchoError err)"
    );
    assert_eq!(first.method("ping").unwrap().declared_in, "Base");
}

#[tokio::test]
async fn unreachable_backend_aborts_before_listening() {
    let dir = idl_dir();
    let listen_port = free_port().await;
    let mut config = config(dir.path(), "Echo.Client", dead_port().await, traced(), Framing::Framed)
        .unwrap();
    config.server.listen_addr = format!("127.0.0.1:{}", listen_port).parse().unwrap();

    let err = run(&config, Arc::new(CaptureSink::new()), std::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::BackendUnreachable { .. }), "{}", err);
    assert!(err.is_startup_error());

    let err = Proxy::start(&config, Arc::new(CaptureSink::new()))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ProxyError::BackendUnreachable { .. }), "{}", err);

    // Nothing was left listening.
    TcpListener::bind(("127.0.0.1", listen_port)).await.unwrap();
}

#[tokio::test]
async fn unknown_service_never_touches_the_backend() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let dir = idl_dir();
    let config = config(dir.path(), "Echo.Missing", backend.port(), traced(), Framing::Framed)
        .unwrap();

    let err = Proxy::start(&config, Arc::new(CaptureSink::new()))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ProxyError::MalformedServiceType { .. }), "{}", err);
    assert_eq!(backend.connection_count(), 0);
}

#[tokio::test]
async fn unknown_module_is_a_definition_error() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let dir = idl_dir();
    let config = config(dir.path(), "Nowhere.Client", backend.port(), traced(), Framing::Framed)
        .unwrap();

    let err = run(&config, Arc::new(CaptureSink::new()), std::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::ServiceDefinition(_)), "{}", err);
    assert_eq!(backend.connection_count(), 0);
}

#[tokio::test]
async fn processor_type_is_rejected() {
    let dir = idl_dir();
    let err = config(dir.path(), "Echo.Processor", 9090, traced(), Framing::Framed).unwrap_err();
    assert!(matches!(err, ProxyError::MalformedServiceType { .. }), "{}", err);
}

#[tokio::test]
async fn shutdown_closes_the_backend_once() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let dir = idl_dir();
    let config = config(dir.path(), "Echo.Client", backend.port(), untraced(), Framing::Framed)
        .unwrap();

    let proxy = Proxy::start(&config, Arc::new(CaptureSink::new())).await.unwrap();
    assert!(backend.wait_for_connections(1).await);
    assert_eq!(proxy.service().len(), 6);

    assert!(proxy.shutdown().await);
    assert!(backend.wait_for_closed(1).await, "backend never saw the close");
    assert!(!proxy.shutdown().await);
    assert_eq!(backend.connection_count(), 1);
}

#[tokio::test]
async fn verbose_run_lists_methods_and_stops_on_shutdown() {
    let backend = EchoBackend::spawn(Framing::Framed).await.unwrap();
    let dir = idl_dir();
    let mut config = config(dir.path(), "Echo.Client", backend.port(), traced(), Framing::Framed)
        .unwrap();
    config.verbose = true;

    let sink = Arc::new(CaptureSink::new());
    let trace_sink: Arc<dyn TraceSink> = sink.clone();
    run(&config, trace_sink, async {}).await.unwrap();

    let lines = sink.lines();
    assert_eq!(lines[0], "ping proxy for string ping()");
    assert_eq!(lines[1], "    Liveness check.");
    assert_eq!(lines[2], "echo proxy for string echo(1: string message)");
    assert_eq!(lines[3], "    Return the message unchanged.");
    assert!(lines.contains(&"notify proxy for oneway void notify(1: string text)".to_string()));
    assert!(backend.wait_for_connections(1).await);
    assert!(backend.wait_for_closed(1).await);
}

#[tokio::test]
async fn verbose_buffered_run_says_so() {
    let backend = EchoBackend::spawn(Framing::Buffered).await.unwrap();
    let dir = idl_dir();
    let mut config = config(dir.path(), "Echo.Client", backend.port(), traced(), Framing::Buffered)
        .unwrap();
    config.verbose = true;

    let sink = Arc::new(CaptureSink::new());
    let trace_sink: Arc<dyn TraceSink> = sink.clone();
    run(&config, trace_sink, async {}).await.unwrap();

    let lines = sink.lines();
    assert_eq!(lines[0], "Using buffered transport");
    assert_eq!(lines[1], "ping proxy for string ping()");
}

/// Backend that reads calls and never answers. Resolves `called` on the
/// first bytes received and `closed` once the proxy hangs up.
async fn silent_backend() -> (u16, oneshot::Receiver<()>, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (called_tx, called_rx) = oneshot::channel();
    let (closed_tx, closed_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut called_tx = Some(called_tx);
        let mut buf = [0u8; 1024];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if let Some(tx) = called_tx.take() {
                        let _ = tx.send(());
                    }
                }
            }
        }
        let _ = closed_tx.send(());
    });

    (port, called_rx, closed_rx)
}

async fn connect_when_listening(port: u16) -> TcpStream {
    for _ in 0..250 {
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("proxy never listened on port {}", port);
}

#[tokio::test]
async fn shutdown_does_not_wait_for_a_hung_call() {
    let (backend_port, called, closed) = silent_backend().await;
    let dir = idl_dir();
    let listen_port = free_port().await;
    let mut config = config(dir.path(), "Echo.Client", backend_port, traced(), Framing::Framed)
        .unwrap();
    config.server.listen_addr = format!("127.0.0.1:{}", listen_port).parse().unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let runner = tokio::spawn(async move {
        let stop = async {
            let _ = stop_rx.await;
        };
        run(&config, Arc::new(CaptureSink::new()), stop).await
    });

    let stream = connect_when_listening(listen_port).await;
    let mut caller = Framed::new(stream, ThriftCodec::new(Framing::Framed));
    caller
        .send(Message::new(
            "echo",
            MessageType::Call,
            1,
            vec![Field::new(1, Value::string("hi"))],
        ))
        .await
        .unwrap();
    timeout(Duration::from_secs(5), called)
        .await
        .expect("call never reached the backend")
        .unwrap();

    stop_tx.send(()).unwrap();
    timeout(Duration::from_secs(3), runner)
        .await
        .expect("run() kept waiting on the hung call")
        .unwrap()
        .unwrap();

    timeout(Duration::from_secs(3), closed)
        .await
        .expect("backend connection left open")
        .unwrap();
    let next = timeout(Duration::from_secs(3), caller.next()).await.unwrap();
    assert!(matches!(next, None | Some(Err(_))));
}
