
use std::time::Duration;

use harness::{
    relay_config, send_and_collect, tls_client_connect, RelayHandle, TcpEchoBackend,
    TlsEchoBackend, TEST_TIMEOUT,
};
use tcp_relay::ProtocolMode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const LISTENER_HOST: &str = "relay.test";
const BACKEND_HOST: &str = "backend.test";

async fn tls_relay(backend: &TcpEchoBackend) -> RelayHandle {
    let mut config = relay_config(backend.addr);
    config.protocol = ProtocolMode::Tls;
    config.tls_host = LISTENER_HOST.to_string();
    RelayHandle::spawn(config).await.unwrap()
}

#[tokio::test]
async fn tls_listener_terminates_and_relays() {
    let backend = TcpEchoBackend::spawn().await.unwrap();
    let relay = tls_relay(&backend).await;
    let cert_der = relay.cert_der.clone().expect("tls listener has a certificate");

    let mut client = tls_client_connect(relay.listen_addr, LISTENER_HOST, &cert_der)
        .await
        .unwrap();
    client.write_all(b"hello").await.unwrap();

    let mut buf = [0u8; 5];
    timeout(TEST_TIMEOUT, client.read_exact(&mut buf))
        .await
        .expect("no echo over tls")
        .unwrap();
    assert_eq!(&buf, b"hello");
}

#[tokio::test]
async fn tls_listener_rejects_other_host_name() {
    let backend = TcpEchoBackend::spawn().await.unwrap();
    let relay = tls_relay(&backend).await;
    let cert_der = relay.cert_der.clone().unwrap();

    let result = tls_client_connect(relay.listen_addr, "other.test", &cert_der).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn failed_handshake_does_not_stop_listener() {
    let backend = TcpEchoBackend::spawn().await.unwrap();
    let relay = tls_relay(&backend).await;
    let cert_der = relay.cert_der.clone().unwrap();

    let mut plain = TcpStream::connect(relay.listen_addr).await.unwrap();
    plain.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
    let mut buf = Vec::new();
    let _ = timeout(TEST_TIMEOUT, plain.read_to_end(&mut buf))
        .await
        .expect("plaintext client was not dropped");

    let mut client = tls_client_connect(relay.listen_addr, LISTENER_HOST, &cert_der)
        .await
        .unwrap();
    client.write_all(b"still up").await.unwrap();
    let mut echo = [0u8; 8];
    timeout(TEST_TIMEOUT, client.read_exact(&mut echo))
        .await
        .expect("no echo after failed handshake")
        .unwrap();
    assert_eq!(&echo, b"still up");
    assert_eq!(backend.connection_count(), 1);
}

#[tokio::test]
async fn secure_destination_completes_handshake() {
    let backend = TlsEchoBackend::spawn(BACKEND_HOST).await.unwrap();
    let mut config = relay_config(backend.addr);
    config.secure_destination = true;
    let relay = RelayHandle::spawn(config).await.unwrap();

    let response = send_and_collect(relay.listen_addr, b"over tls").await.unwrap();

    assert_eq!(response, b"over tls");
    assert_eq!(backend.handshake_count(), 1);
    assert_eq!(backend.handshake_failure_count(), 0);
}

#[tokio::test]
async fn plain_dial_to_tls_destination_is_raw() {
    let backend = TlsEchoBackend::spawn(BACKEND_HOST).await.unwrap();
    let relay = RelayHandle::spawn(relay_config(backend.addr)).await.unwrap();

    let mut client = TcpStream::connect(relay.listen_addr).await.unwrap();
    client.write_all(b"not a client hello\r\n").await.unwrap();

    let mut buf = Vec::new();
    let _ = timeout(TEST_TIMEOUT, client.read_to_end(&mut buf))
        .await
        .expect("relay did not close after backend rejected the stream");

    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while backend.handshake_failure_count() == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(backend.handshake_failure_count(), 1);
    assert_eq!(backend.handshake_count(), 0);
}
