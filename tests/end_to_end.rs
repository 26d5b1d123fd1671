//! End-to-end tests against a real server on a loopback port.

use snapkv::config::{RuntimeConfig, ServerConfig};
use snapkv::server::{Server, ShutdownHandle};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    task: JoinHandle<Result<(), snapkv::ServerError>>,
}

impl TestServer {
    async fn start(runtime: RuntimeConfig) -> Self {
        let config = ServerConfig::new().with_port(0).with_runtime(runtime);
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr();
        let shutdown = server.shutdown_handle();
        let task = tokio::spawn(server.run());
        Self {
            addr,
            shutdown,
            task,
        }
    }

    async fn stop(self) {
        self.shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop in time")
            .unwrap()
            .unwrap();
    }
}

async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.unwrap()
}

fn encode(args: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n{}\r\n", arg.len(), arg).as_bytes());
    }
    out
}

/// Sends raw bytes and reads exactly `expected.len()` bytes back.
async fn roundtrip(stream: &mut TcpStream, request: &[u8], expected: &[u8]) {
    stream.write_all(request).await.unwrap();
    let mut reply = vec![0u8; expected.len()];
    tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut reply))
        .await
        .expect("timed out waiting for reply")
        .unwrap();
    assert_eq!(
        String::from_utf8_lossy(&reply),
        String::from_utf8_lossy(expected)
    );
}

#[tokio::test]
async fn ping_replies_pong() {
    let server = TestServer::start(RuntimeConfig::new()).await;
    let mut client = connect(server.addr).await;

    roundtrip(&mut client, &encode(&["PING"]), b"+PONG\r\n").await;
    roundtrip(&mut client, b"PING\r\n", b"+PONG\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn echo_returns_argument() {
    let server = TestServer::start(RuntimeConfig::new()).await;
    let mut client = connect(server.addr).await;

    roundtrip(&mut client, b"*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n", b"$2\r\nhi\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn set_with_px_expires() {
    let server = TestServer::start(RuntimeConfig::new()).await;
    let mut client = connect(server.addr).await;

    roundtrip(&mut client, &encode(&["SET", "foo", "bar", "PX", "50"]), b"+OK\r\n").await;
    roundtrip(&mut client, &encode(&["GET", "foo"]), b"$3\r\nbar\r\n").await;

    tokio::time::sleep(Duration::from_millis(60)).await;
    roundtrip(&mut client, &encode(&["GET", "foo"]), b"$-1\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn set_overwrites_previous_value() {
    let server = TestServer::start(RuntimeConfig::new()).await;
    let mut client = connect(server.addr).await;

    roundtrip(&mut client, &encode(&["SET", "a", "1"]), b"+OK\r\n").await;
    roundtrip(&mut client, &encode(&["SET", "a", "2"]), b"+OK\r\n").await;
    roundtrip(&mut client, &encode(&["GET", "a"]), b"$1\r\n2\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn config_get_dir() {
    let server = TestServer::start(RuntimeConfig::new().with_dir("/tmp/data")).await;
    let mut client = connect(server.addr).await;

    roundtrip(
        &mut client,
        &encode(&["CONFIG", "GET", "dir"]),
        b"*2\r\n$3\r\ndir\r\n$9\r\n/tmp/data\r\n",
    )
    .await;

    server.stop().await;
}

#[tokio::test]
async fn save_writes_snapshot_file() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = RuntimeConfig::new()
        .with_dir(dir.path().to_string_lossy())
        .with_dbfilename("dump.rdb");
    let server = TestServer::start(runtime).await;
    let mut client = connect(server.addr).await;

    roundtrip(&mut client, &encode(&["SET", "greeting", "hello"]), b"+OK\r\n").await;
    roundtrip(&mut client, &encode(&["SET", "gone", "x", "PX", "1"]), b"+OK\r\n").await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    roundtrip(&mut client, &encode(&["SAVE"]), b"+OK\r\n").await;

    let contents = std::fs::read(dir.path().join("dump.rdb")).unwrap();
    assert!(contents.starts_with(b"REDIS0011"));

    let has = |needle: &[u8]| contents.windows(needle.len()).any(|w| w == needle);
    assert!(has(b"\x08greeting\x05hello"));
    assert!(!has(b"gone"));

    server.stop().await;
}

#[tokio::test]
async fn save_without_configuration_fails_softly() {
    let server = TestServer::start(RuntimeConfig::new()).await;
    let mut client = connect(server.addr).await;

    client.write_all(&encode(&["SAVE"])).await.unwrap();
    let mut first = [0u8; 1];
    client.read_exact(&mut first).await.unwrap();
    assert_eq!(&first, b"-");

    let mut rest = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        client.read_exact(&mut byte).await.unwrap();
        rest.push(byte[0]);
        if rest.ends_with(b"\r\n") {
            break;
        }
    }

    // The connection is still usable.
    roundtrip(&mut client, &encode(&["PING"]), b"+PONG\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn fragmented_and_pipelined_requests() {
    let server = TestServer::start(RuntimeConfig::new()).await;
    let mut client = connect(server.addr).await;

    let request = encode(&["ECHO", "fragmented"]);
    let (head, tail) = request.split_at(7);
    client.write_all(head).await.unwrap();
    client.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    roundtrip(&mut client, tail, b"$10\r\nfragmented\r\n").await;

    let mut pipelined = encode(&["SET", "k", "v"]);
    pipelined.extend_from_slice(&encode(&["GET", "k"]));
    pipelined.extend_from_slice(&encode(&["DBSIZE"]));
    roundtrip(&mut client, &pipelined, b"+OK\r\n$1\r\nv\r\n:1\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn malformed_frame_does_not_close_connection() {
    let server = TestServer::start(RuntimeConfig::new()).await;
    let mut client = connect(server.addr).await;

    let mut request = b"*oops\r\ngarbage\r\n".to_vec();
    request.extend_from_slice(&encode(&["PING"]));
    roundtrip(&mut client, &request, b"+PONG\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn clients_share_one_store() {
    let server = TestServer::start(RuntimeConfig::new()).await;
    let mut writer = connect(server.addr).await;
    let mut reader = connect(server.addr).await;

    roundtrip(&mut writer, &encode(&["SET", "shared", "yes"]), b"+OK\r\n").await;
    roundtrip(&mut reader, &encode(&["GET", "shared"]), b"$3\r\nyes\r\n").await;

    server.stop().await;
}

#[tokio::test]
async fn quit_closes_connection() {
    let server = TestServer::start(RuntimeConfig::new()).await;
    let mut client = connect(server.addr).await;

    roundtrip(&mut client, &encode(&["QUIT"]), b"+OK\r\n").await;

    let mut rest = Vec::new();
    let n = client.read_to_end(&mut rest).await.unwrap();
    assert_eq!(n, 0);

    server.stop().await;
}

#[tokio::test]
async fn graceful_shutdown_closes_clients() {
    let server = TestServer::start(RuntimeConfig::new()).await;
    let addr = server.addr;

    let mut clients = Vec::new();
    for _ in 0..5 {
        let mut client = connect(addr).await;
        roundtrip(&mut client, &encode(&["PING"]), b"+PONG\r\n").await;
        clients.push(client);
    }

    server.stop().await;

    for mut client in clients {
        let mut rest = Vec::new();
        let n = client.read_to_end(&mut rest).await.unwrap_or(0);
        assert_eq!(n, 0);
    }

    assert!(TcpStream::connect(addr).await.is_err());
}
