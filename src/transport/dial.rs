//! Outbound socket establishment for each transport kind.

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
};

#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::net::{TcpSocket, TcpStream, UdpSocket, lookup_host};

use super::stream::Stream;
use crate::options::{TransportKind, TransportOptions};

/// Open a plaintext connection to `host` using the options' kind and port.
pub(super) async fn dial(options: &TransportOptions, host: &str) -> io::Result<Stream> {
    match options.kind() {
        TransportKind::Tcp => dial_tcp(options, host).await.map(Stream::Tcp),
        TransportKind::Udp => dial_udp(options, host).await.map(Stream::Udp),
        TransportKind::Unix => dial_unix(host).await,
    }
}

fn required_port(options: &TransportOptions) -> io::Result<u16> {
    options.port().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} transport requires a port", options.kind()),
        )
    })
}

fn unresolved(host: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no addresses found for {host}"),
    )
}

async fn dial_tcp(options: &TransportOptions, host: &str) -> io::Result<TcpStream> {
    let port = required_port(options)?;
    let mut last_err = None;
    for addr in lookup_host((host, port)).await? {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        options.socket().apply(&socket)?;
        match socket.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| unresolved(host)))
}

async fn dial_udp(options: &TransportOptions, host: &str) -> io::Result<UdpSocket> {
    let port = required_port(options)?;
    let mut last_err = None;
    for addr in lookup_host((host, port)).await? {
        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        match socket.connect(addr).await {
            Ok(()) => return Ok(socket),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| unresolved(host)))
}

#[cfg(unix)]
async fn dial_unix(path: &str) -> io::Result<Stream> {
    UnixStream::connect(path).await.map(Stream::Unix)
}

#[cfg(not(unix))]
async fn dial_unix(_path: &str) -> io::Result<Stream> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix sockets are not available on this platform",
    ))
}

/// Endpoint label used in logs, for example `tls://ldap.example.com:636`.
pub(crate) fn endpoint_uri(options: &TransportOptions, host: &str) -> String {
    let scheme = if options.tls().enabled() {
        "tls"
    } else {
        options.kind().as_str()
    };
    match (options.kind(), options.port()) {
        (TransportKind::Unix, _) | (_, None) => format!("{scheme}://{host}"),
        (_, Some(port)) if host.contains(':') => format!("{scheme}://[{host}]:{port}"),
        (_, Some(port)) => format!("{scheme}://{host}:{port}"),
    }
}
