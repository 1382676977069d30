//! Shared utilities for integration tests.
//!
//! Provides option presets for loopback transports, a listener/client pair
//! helper, and self-signed TLS material written to a temporary directory.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{path::PathBuf, time::Duration};

use rstest::fixture;
use tempfile::TempDir;
use wiresock::{ListenSocket, Transport, TransportKind, TransportOptions};

/// Loopback address used by every network test.
pub const LOCALHOST: &str = "127.0.0.1";

/// TCP client options for `port` with short timeouts.
pub fn tcp_options(port: u16) -> TransportOptions {
    TransportOptions::builder(TransportKind::Tcp)
        .port(port)
        .timeout_connect(Duration::from_secs(2))
        .timeout_read(Duration::from_secs(2))
        .build()
        .expect("valid tcp options")
}

/// Bind a plaintext TCP listener on an ephemeral loopback port.
pub async fn tcp_listener() -> ListenSocket {
    ListenSocket::bind_tcp(LOCALHOST, 0)
        .await
        .expect("bind loopback listener")
}

/// Port a TCP or UDP listener is bound to.
pub fn port_of(listener: &ListenSocket) -> u16 {
    listener.local_addr().expect("inet listener").port()
}

/// Connect a client to `listener` and accept it, returning `(client, server)`.
pub async fn connected_pair(listener: &ListenSocket) -> (Transport, Transport) {
    let client = Transport::open(LOCALHOST, tcp_options(port_of(listener)))
        .await
        .expect("connect client");
    let server = listener
        .accept(Some(Duration::from_secs(2)))
        .await
        .expect("accept")
        .expect("client within timeout");
    (client, server)
}

/// Self-signed certificate for `localhost` and its private key on disk.
pub struct TlsMaterial {
    _dir: TempDir,
    /// PEM certificate path.
    pub cert: PathBuf,
    /// PEM PKCS#8 private key path.
    pub key: PathBuf,
}

/// Generate fresh TLS material in a temporary directory.
#[fixture]
pub fn tls_material() -> TlsMaterial {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()])
        .expect("generate certificate");
    let dir = tempfile::tempdir().expect("tempdir");
    let cert = dir.path().join("server.pem");
    let key = dir.path().join("server.key");
    std::fs::write(&cert, certified.cert.pem()).expect("write certificate");
    std::fs::write(&key, certified.key_pair.serialize_pem()).expect("write key");
    TlsMaterial {
        _dir: dir,
        cert,
        key,
    }
}
