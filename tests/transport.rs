//! Integration tests for `Transport` over real loopback sockets.

use std::time::Duration;

use rstest::rstest;
use wiresock::{
    ListenSocket,
    ReadMode,
    ReadOutcome,
    Transport,
    TransportError,
    TransportKind,
    TransportOptions,
};

mod common;

use common::{LOCALHOST, TlsMaterial, connected_pair, port_of, tcp_listener, tls_material};

/// Blocking read expected to return data.
async fn read_data(transport: &mut Transport) -> Vec<u8> {
    match transport.read(ReadMode::Blocking).await.expect("read") {
        ReadOutcome::Data(bytes) => bytes.to_vec(),
        other => panic!("expected data, got {other:?}"),
    }
}

/// Read until `expected` bytes have arrived.
async fn read_exact(transport: &mut Transport, expected: usize) -> Vec<u8> {
    let mut out = Vec::new();
    while out.len() < expected {
        out.extend(read_data(transport).await);
    }
    out
}

#[tokio::test]
async fn tcp_round_trip() {
    let listener = tcp_listener().await;
    let (mut client, mut server) = connected_pair(&listener).await;
    assert!(client.is_connected());
    assert_eq!(client.peer(), LOCALHOST);
    assert_eq!(client.kind(), TransportKind::Tcp);

    client.write(b"hello").await;
    assert_eq!(read_exact(&mut server, 5).await, b"hello");
    server.write(b"world").await;
    assert_eq!(read_exact(&mut client, 5).await, b"world");
}

#[tokio::test]
async fn blocking_read_drains_everything_buffered() {
    let listener = tcp_listener().await;
    let (mut client, mut server) = connected_pair(&listener).await;

    client.write(b"one").await;
    client.write(b"two").await;
    client.write(b"three").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(read_data(&mut server).await, b"onetwothree");
}

#[tokio::test]
async fn later_reads_leave_earlier_data_intact() {
    let listener = tcp_listener().await;
    let options = TransportOptions::builder(TransportKind::Tcp)
        .port(port_of(&listener))
        .read_chunk_size(4)
        .build()
        .expect("valid options");
    let mut client = Transport::open(LOCALHOST, options).await.expect("connect");
    let mut server = listener
        .accept(Some(Duration::from_secs(2)))
        .await
        .expect("accept")
        .expect("client");

    server.write(b"abcdefghij").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let first = match client.read(ReadMode::Blocking).await.expect("read") {
        ReadOutcome::Data(bytes) => bytes,
        other => panic!("expected data, got {other:?}"),
    };
    assert_eq!(&first[..], b"abcdefghij");

    server.write(b"klm").await;
    assert_eq!(read_exact(&mut client, 3).await, b"klm");
    assert_eq!(
        client.read(ReadMode::NonBlocking).await.expect("read"),
        ReadOutcome::WouldBlock
    );
    assert_eq!(&first[..], b"abcdefghij");
}

#[tokio::test]
async fn non_blocking_read_without_data_would_block() {
    let listener = tcp_listener().await;
    let (mut client, _server) = connected_pair(&listener).await;
    assert_eq!(
        client.read(ReadMode::NonBlocking).await.expect("read"),
        ReadOutcome::WouldBlock
    );
    assert!(client.is_connected());
}

#[tokio::test]
async fn peer_shutdown_reads_as_closed() {
    let listener = tcp_listener().await;
    let (mut client, mut server) = connected_pair(&listener).await;

    server.close().await;
    assert_eq!(
        client.read(ReadMode::Blocking).await.expect("read"),
        ReadOutcome::Closed
    );
    assert!(!client.is_connected());
}

#[tokio::test]
async fn close_is_idempotent_and_terminal() {
    let listener = tcp_listener().await;
    let (mut client, _server) = connected_pair(&listener).await;

    client.close().await;
    client.close().await;
    assert!(!client.is_connected());
    assert!(matches!(
        client.read(ReadMode::Blocking).await,
        Err(TransportError::NotConnected)
    ));
    client.write(b"dropped").await;
}

#[tokio::test]
async fn blocking_read_times_out() {
    let listener = tcp_listener().await;
    let options = TransportOptions::builder(TransportKind::Tcp)
        .port(port_of(&listener))
        .timeout_read(Duration::from_millis(50))
        .build()
        .expect("valid options");
    let mut client = Transport::open(LOCALHOST, options).await.expect("connect");
    let _server = listener.accept(None).await.expect("accept");

    assert!(matches!(
        client.read(ReadMode::Blocking).await,
        Err(TransportError::ReadTimeout(timeout)) if timeout == Duration::from_millis(50)
    ));
    assert!(client.is_connected());
}

#[tokio::test]
async fn close_handle_interrupts_blocking_read() {
    let listener = tcp_listener().await;
    let (mut client, _server) = connected_pair(&listener).await;
    let handle = client.close_handle();

    let closer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.close();
    });
    assert_eq!(
        client.read(ReadMode::Blocking).await.expect("read"),
        ReadOutcome::Closed
    );
    closer.await.expect("closer task");
    assert!(!client.is_connected());
    assert!(matches!(
        client.read(ReadMode::NonBlocking).await,
        Err(TransportError::NotConnected)
    ));
}

#[tokio::test]
async fn unix_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("wiresock.sock");
    let listener = ListenSocket::bind_unix(&path).await.expect("bind");

    let mut client = Transport::unix(&path.display().to_string())
        .await
        .expect("connect");
    let mut server = listener
        .accept(Some(Duration::from_secs(2)))
        .await
        .expect("accept")
        .expect("client");
    assert_eq!(server.peer(), path.display().to_string());

    client.write(b"ping").await;
    assert_eq!(read_exact(&mut server, 4).await, b"ping");
    client.close().await;
    assert_eq!(
        server.read(ReadMode::Blocking).await.expect("read"),
        ReadOutcome::Closed
    );
}

#[tokio::test]
async fn udp_datagrams_reach_the_listener() {
    let listener = ListenSocket::bind_udp(LOCALHOST, 0).await.expect("bind");
    let mut client = Transport::udp(LOCALHOST, port_of(&listener))
        .await
        .expect("connect");
    assert_eq!(client.options().read_chunk_size(), wiresock::options::MAX_DATAGRAM_SIZE);

    client.write(b"query").await;
    let (datagram, from) = listener.receive().await.expect("receive");
    assert_eq!(&datagram[..], b"query");

    listener.send_to(b"reply", from).await.expect("send");
    assert_eq!(read_data(&mut client).await, b"reply");
}

#[tokio::test]
async fn udp_transports_reject_encryption() {
    let listener = ListenSocket::bind_udp(LOCALHOST, 0).await.expect("bind");
    let mut client = Transport::udp(LOCALHOST, port_of(&listener))
        .await
        .expect("connect");
    assert!(matches!(
        client.encrypt(true).await,
        Err(TransportError::Unsupported {
            kind: TransportKind::Udp,
            ..
        })
    ));
}

fn tls_server_options(material: &TlsMaterial, inline: bool) -> TransportOptions {
    TransportOptions::builder(TransportKind::Tcp)
        .port(0)
        .use_tls(inline)
        .tls_cert(&material.cert)
        .tls_cert_key(&material.key)
        .build()
        .expect("valid server options")
}

#[rstest]
#[tokio::test]
async fn inline_tls_accepts_self_signed_when_allowed(tls_material: TlsMaterial) {
    let listener = ListenSocket::bind(tls_server_options(&tls_material, true), LOCALHOST, None)
        .await
        .expect("bind");
    let options = TransportOptions::builder(TransportKind::Tcp)
        .port(port_of(&listener))
        .use_tls(true)
        .tls_allow_self_signed(true)
        .tls_peer_name("localhost")
        .build()
        .expect("valid client options");

    let (client, server) = tokio::join!(
        Transport::open(LOCALHOST, options),
        listener.accept(Some(Duration::from_secs(5)))
    );
    let mut client = client.expect("tls connect");
    let mut server = server.expect("accept").expect("client");
    assert!(client.is_encrypted());
    assert!(server.is_encrypted());

    client.write(b"secret").await;
    assert_eq!(read_exact(&mut server, 6).await, b"secret");
}

#[rstest]
#[tokio::test]
async fn silent_tls_client_does_not_stall_accept(tls_material: TlsMaterial) {
    let listener = ListenSocket::bind(tls_server_options(&tls_material, true), LOCALHOST, None)
        .await
        .expect("bind");
    let port = port_of(&listener);
    let _silent = tokio::net::TcpStream::connect((LOCALHOST, port))
        .await
        .expect("raw connect");
    let options = TransportOptions::builder(TransportKind::Tcp)
        .port(port)
        .use_tls(true)
        .tls_allow_self_signed(true)
        .tls_peer_name("localhost")
        .timeout_connect(Duration::from_secs(3))
        .build()
        .expect("valid client options");

    let (client, accepted) = tokio::join!(
        Transport::open(LOCALHOST, options),
        tokio::time::timeout(Duration::from_secs(4), listener.accept(None))
    );
    let mut server = accepted
        .expect("accept returned in time")
        .expect("accept")
        .expect("client");
    let mut client = client.expect("tls connect");
    assert!(server.is_encrypted());
    assert_eq!(listener.clients().len(), 1);

    client.write(b"hello").await;
    assert_eq!(read_exact(&mut server, 5).await, b"hello");
}

#[rstest]
#[tokio::test]
async fn inline_tls_rejects_untrusted_certificates(tls_material: TlsMaterial) {
    let listener = ListenSocket::bind(tls_server_options(&tls_material, true), LOCALHOST, None)
        .await
        .expect("bind");
    let options = TransportOptions::builder(TransportKind::Tcp)
        .port(port_of(&listener))
        .use_tls(true)
        .tls_peer_name("localhost")
        .timeout_connect(Duration::from_secs(2))
        .build()
        .expect("valid client options");

    let (client, _server) = tokio::join!(
        Transport::open(LOCALHOST, options),
        listener.accept(Some(Duration::from_secs(2)))
    );
    assert!(matches!(client, Err(TransportError::Connect { .. })));
}

#[rstest]
#[tokio::test]
async fn start_tls_upgrades_and_downgrades(tls_material: TlsMaterial) {
    let listener = ListenSocket::bind(tls_server_options(&tls_material, false), LOCALHOST, None)
        .await
        .expect("bind");
    let options = TransportOptions::builder(TransportKind::Tcp)
        .port(port_of(&listener))
        .tls_validate_cert(false)
        .build()
        .expect("valid client options");
    let mut client = Transport::open(LOCALHOST, options).await.expect("connect");
    let mut server = listener
        .accept(Some(Duration::from_secs(2)))
        .await
        .expect("accept")
        .expect("client");
    assert!(!client.is_encrypted());

    let (up_client, up_server) = tokio::join!(client.encrypt(true), server.encrypt(true));
    up_client.expect("client handshake");
    up_server.expect("server handshake");
    assert!(client.is_encrypted() && server.is_encrypted());

    client.write(b"bind").await;
    assert_eq!(read_exact(&mut server, 4).await, b"bind");

    let (down_client, down_server) = tokio::join!(client.encrypt(false), server.encrypt(false));
    down_client.expect("client shutdown");
    down_server.expect("server shutdown");
    assert!(!client.is_encrypted() && !server.is_encrypted());

    server.write(b"plain").await;
    assert_eq!(read_exact(&mut client, 5).await, b"plain");
}
