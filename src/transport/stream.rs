//! Concrete socket variants owned by a [`Transport`](super::Transport).

use std::io;

use bytes::{BufMut, BytesMut};
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, UdpSocket},
};
use tokio_rustls::{client, server};

/// One live OS connection, plaintext or TLS.
pub(crate) enum Stream {
    Tcp(TcpStream),
    Udp(UdpSocket),
    #[cfg(unix)]
    Unix(UnixStream),
    ClientTls(Box<client::TlsStream<TcpStream>>),
    ServerTls(Box<server::TlsStream<TcpStream>>),
}

impl Stream {
    /// Append at most `limit` bytes to `buf`; a datagram socket appends one
    /// datagram, truncated to `limit`.
    pub(crate) async fn read_chunk(&mut self, buf: &mut BytesMut, limit: usize) -> io::Result<usize> {
        buf.reserve(limit);
        let mut dst = (&mut *buf).limit(limit);
        match self {
            Self::Tcp(stream) => stream.read_buf(&mut dst).await,
            Self::Udp(socket) => socket.recv_buf(&mut dst).await,
            #[cfg(unix)]
            Self::Unix(stream) => stream.read_buf(&mut dst).await,
            Self::ClientTls(stream) => stream.read_buf(&mut dst).await,
            Self::ServerTls(stream) => stream.read_buf(&mut dst).await,
        }
    }

    /// Write all of `data`, or send it as one datagram.
    pub(crate) async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.write_all(data).await,
            Self::Udp(socket) => socket.send(data).await.map(drop),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write_all(data).await,
            Self::ClientTls(stream) => {
                stream.write_all(data).await?;
                stream.flush().await
            }
            Self::ServerTls(stream) => {
                stream.write_all(data).await?;
                stream.flush().await
            }
        }
    }

    /// Shut down the write direction; TLS streams send `close_notify` first.
    pub(crate) async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.shutdown().await,
            Self::Udp(_) => Ok(()),
            #[cfg(unix)]
            Self::Unix(stream) => stream.shutdown().await,
            Self::ClientTls(stream) => stream.shutdown().await,
            Self::ServerTls(stream) => stream.shutdown().await,
        }
    }

    pub(crate) fn is_datagram(&self) -> bool { matches!(self, Self::Udp(_)) }

    pub(crate) fn is_tls(&self) -> bool {
        matches!(self, Self::ClientTls(_) | Self::ServerTls(_))
    }
}
