
use std::time::Duration;

use harness::{
    dead_addr, relay_config, send_and_collect, RecordingBackend, RelayHandle, TcpEchoBackend,
    TEST_TIMEOUT,
};
use tcp_relay::{JoinPolicy, RelayMode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[tokio::test]
async fn tcp_relay_echoes_payload() {
    let backend = TcpEchoBackend::spawn().await.unwrap();
    let relay = RelayHandle::spawn(relay_config(backend.addr)).await.unwrap();

    let response = send_and_collect(relay.listen_addr, b"hello").await.unwrap();

    assert_eq!(response, b"hello");
    assert_eq!(backend.connection_count(), 1);
}

#[tokio::test]
async fn tcp_relay_is_byte_transparent() {
    let backend = TcpEchoBackend::spawn().await.unwrap();
    let relay = RelayHandle::spawn(relay_config(backend.addr)).await.unwrap();

    let payload: Vec<u8> = (0..1024 * 1024).map(|i| (i * 31 % 251) as u8).collect();
    let expected = payload.clone();

    let stream = TcpStream::connect(relay.listen_addr).await.unwrap();
    let (mut reader, mut writer) = stream.into_split();

    let write = tokio::spawn(async move {
        writer.write_all(&payload).await.unwrap();
        writer.shutdown().await.unwrap();
    });

    let mut response = Vec::new();
    timeout(TEST_TIMEOUT, reader.read_to_end(&mut response))
        .await
        .expect("relay did not finish")
        .unwrap();
    write.await.unwrap();

    assert_eq!(response.len(), expected.len());
    assert!(response == expected, "relayed bytes differ");
}

#[tokio::test]
async fn proxy_header_precedes_payload() {
    let mut backend = RecordingBackend::spawn().await.unwrap();
    let mut config = relay_config(backend.addr);
    config.relay_mode = RelayMode::ProxyHeader;
    let relay = RelayHandle::spawn(config).await.unwrap();

    let mut client = TcpStream::connect(relay.listen_addr).await.unwrap();
    let client_port = client.local_addr().unwrap().port();
    client.write_all(b"payload").await.unwrap();
    client.shutdown().await.unwrap();

    let mut response = Vec::new();
    timeout(TEST_TIMEOUT, client.read_to_end(&mut response))
        .await
        .expect("relay did not finish")
        .unwrap();
    assert_eq!(response, b"ack");

    let received = backend.next_received().await.expect("no connection recorded");
    let expected = format!(
        "PROXY TCP4 127.0.0.1 127.0.0.1 {} {}\r\npayload",
        client_port,
        backend.addr.port()
    );
    assert_eq!(String::from_utf8(received).unwrap(), expected);
}

#[tokio::test]
async fn plain_mode_sends_no_header() {
    let mut backend = RecordingBackend::spawn().await.unwrap();
    let relay = RelayHandle::spawn(relay_config(backend.addr)).await.unwrap();

    let response = send_and_collect(relay.listen_addr, b"raw bytes").await.unwrap();
    assert_eq!(response, b"ack");

    let received = backend.next_received().await.expect("no connection recorded");
    assert_eq!(received, b"raw bytes");
}

#[tokio::test]
async fn unreachable_destination_closes_client_and_keeps_accepting() {
    let relay = RelayHandle::spawn(relay_config(dead_addr().await)).await.unwrap();

    for _ in 0..3 {
        let mut client = TcpStream::connect(relay.listen_addr).await.unwrap();
        let mut buf = Vec::new();
        let result = timeout(Duration::from_secs(2), client.read_to_end(&mut buf))
            .await
            .expect("client was not closed after dial failure");

        // Either a clean EOF or a reset, never data.
        if result.is_ok() {
            assert!(buf.is_empty());
        }
    }

    assert!(relay.is_running());
}

#[tokio::test]
async fn idle_session_does_not_block_others() {
    let backend = TcpEchoBackend::spawn().await.unwrap();
    let relay = RelayHandle::spawn(relay_config(backend.addr)).await.unwrap();

    let mut idle = TcpStream::connect(relay.listen_addr).await.unwrap();
    idle.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    timeout(TEST_TIMEOUT, idle.read_exact(&mut buf))
        .await
        .expect("idle session never echoed")
        .unwrap();
    assert_eq!(&buf, b"ping");

    let response = send_and_collect(relay.listen_addr, b"second").await.unwrap();
    assert_eq!(response, b"second");

    idle.write_all(b"pong").await.unwrap();
    timeout(TEST_TIMEOUT, idle.read_exact(&mut buf))
        .await
        .expect("idle session stalled")
        .unwrap();
    assert_eq!(&buf, b"pong");
}

#[tokio::test]
async fn concurrent_sessions_are_independent() {
    let backend = TcpEchoBackend::spawn().await.unwrap();
    let relay = RelayHandle::spawn(relay_config(backend.addr)).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let addr = relay.listen_addr;
        tasks.push(tokio::spawn(async move {
            let payload = format!("session-{i}");
            let response = send_and_collect(addr, payload.as_bytes()).await.unwrap();
            assert_eq!(response, payload.as_bytes());
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(backend.connection_count(), 16);
}

#[tokio::test]
async fn wait_both_delivers_reply_after_client_half_close() {
    let mut backend = RecordingBackend::spawn().await.unwrap();
    let mut config = relay_config(backend.addr);
    config.join_policy = JoinPolicy::WaitBoth;
    let relay = RelayHandle::spawn(config).await.unwrap();

    // The backend only answers once it sees EOF.
    let response = send_and_collect(relay.listen_addr, b"request").await.unwrap();

    assert_eq!(response, b"ack");
    assert_eq!(backend.next_received().await.unwrap(), b"request");
}

#[tokio::test]
async fn first_done_drops_reply_after_client_half_close() {
    let mut backend = RecordingBackend::spawn().await.unwrap();
    let mut config = relay_config(backend.addr);
    config.join_policy = JoinPolicy::FirstDone;
    let relay = RelayHandle::spawn(config).await.unwrap();

    let mut client = TcpStream::connect(relay.listen_addr).await.unwrap();
    client.write_all(b"request").await.unwrap();
    client.shutdown().await.unwrap();

    let mut response = Vec::new();
    let result = timeout(TEST_TIMEOUT, client.read_to_end(&mut response))
        .await
        .expect("relay did not close the client");

    if result.is_ok() {
        assert!(response.is_empty(), "reply should not be relayed");
    }
    assert_eq!(backend.next_received().await.unwrap(), b"request");
}
