//! Listening sockets: accept stream clients or receive datagrams.
//!
//! A [`ListenSocket`] binds one TCP, UDP or unix-domain address. Stream
//! listeners hand out accepted connections as [`Transport`]s whose read
//! timeout is the configured idle timeout, and record each one in a
//! [`ClientRegistry`]. UDP listeners exchange datagrams directly through
//! [`receive`](ListenSocket::receive) and [`send_to`](ListenSocket::send_to).
//!
//! TLS listeners hand each inbound socket to its own handshake task bounded by
//! the connect timeout, so a client that never completes its handshake cannot
//! hold up the clients behind it.

use std::{
    io,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::{
    net::{TcpListener, TcpStream, UdpSocket},
    sync::{Mutex, mpsc},
    time,
};
use tokio_rustls::{TlsAcceptor, server::TlsStream};
use tracing::{debug, trace};

use crate::{
    error::{ConfigError, TransportError},
    options::{MAX_DATAGRAM_SIZE, TransportKind, TransportOptions},
    transport::{Stream, Transport, endpoint_uri, tls_acceptor},
};

mod registry;

pub use registry::{ClientHandle, ClientId, ClientRegistry};

enum Listener {
    Tcp(TcpListener),
    Udp(UdpSocket),
    #[cfg(unix)]
    Unix(UnixListener),
}

/// A bound local address accepting clients or datagrams.
pub struct ListenSocket {
    listener: Listener,
    options: TransportOptions,
    client_options: Arc<TransportOptions>,
    tls: Option<TlsIntake>,
    local_addr: Option<SocketAddr>,
    path: Option<PathBuf>,
    registry: ClientRegistry,
    next_id: AtomicU64,
}

impl ListenSocket {
    /// Bind `address` with the kind and TLS settings from `options`.
    ///
    /// `port` overrides the port in `options` and is ignored for unix
    /// sockets, where `address` is the socket path. TCP and unix sockets
    /// start listening immediately. When `use_tls` is set the server
    /// certificate and key are loaded here so misconfiguration is reported
    /// before any client connects.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] with the operating system diagnostic
    /// if the address cannot be bound, or [`TransportError::Config`] for a
    /// missing port or unusable TLS material.
    pub async fn bind(
        options: TransportOptions,
        address: &str,
        port: Option<u16>,
    ) -> Result<Self, TransportError> {
        let kind = options.kind();
        let port = port.or(options.port());
        let tls = if options.tls().enabled() {
            Some(TlsIntake::new(
                tls_acceptor(options.tls())?,
                options.timeout_connect(),
            ))
        } else {
            None
        };
        let bind_err = |label: String| {
            move |source| TransportError::Bind {
                kind,
                address: label,
                source,
            }
        };

        let (listener, local_addr, path) = match kind {
            TransportKind::Tcp => {
                let port = port.ok_or(ConfigError::MissingPort(kind))?;
                let listener = TcpListener::bind((address, port))
                    .await
                    .map_err(bind_err(format!("{address}:{port}")))?;
                let local = listener.local_addr().ok();
                (Listener::Tcp(listener), local, None)
            }
            TransportKind::Udp => {
                let port = port.ok_or(ConfigError::MissingPort(kind))?;
                let socket = UdpSocket::bind((address, port))
                    .await
                    .map_err(bind_err(format!("{address}:{port}")))?;
                let local = socket.local_addr().ok();
                (Listener::Udp(socket), local, None)
            }
            TransportKind::Unix => bind_unix_listener(address).map_err(bind_err(address.to_owned()))?,
        };

        let label = match local_addr {
            Some(addr) => endpoint_uri(&options, &addr.ip().to_string()),
            None => endpoint_uri(&options, address),
        };
        debug!(endpoint = %label, port = ?local_addr.map(|addr| addr.port()), "listening");

        Ok(Self {
            listener,
            client_options: Arc::new(options.with_read_timeout(options.idle_timeout())),
            options,
            tls,
            local_addr,
            path,
            registry: ClientRegistry::default(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Bind a TCP listener with default options.
    ///
    /// # Errors
    ///
    /// See [`ListenSocket::bind`].
    pub async fn bind_tcp(address: &str, port: u16) -> Result<Self, TransportError> {
        let options = TransportOptions::builder(TransportKind::Tcp).port(port).build()?;
        Self::bind(options, address, None).await
    }

    /// Bind a UDP socket with default options.
    ///
    /// # Errors
    ///
    /// See [`ListenSocket::bind`].
    pub async fn bind_udp(address: &str, port: u16) -> Result<Self, TransportError> {
        let options = TransportOptions::builder(TransportKind::Udp).port(port).build()?;
        Self::bind(options, address, None).await
    }

    /// Bind a unix-domain listener at `path` with default options.
    ///
    /// # Errors
    ///
    /// See [`ListenSocket::bind`].
    pub async fn bind_unix(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let options = TransportOptions::builder(TransportKind::Unix).build()?;
        Self::bind(options, &path.as_ref().to_string_lossy(), None).await
    }

    /// Wait for the next client.
    ///
    /// `None` waits indefinitely; on timeout `Ok(None)` is returned. The
    /// accepted transport is added to the client registry. TLS listeners
    /// return clients whose handshake has completed; handshakes that fail or
    /// outlast the connect timeout are logged and skipped. Handshakes keep
    /// running between calls.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Accept`] if the operating system rejects the
    /// accept, or [`TransportError::Unsupported`] on UDP sockets.
    pub async fn accept(&self, timeout: Option<Duration>) -> Result<Option<Transport>, TransportError> {
        let (stream, peer) = match timeout {
            Some(timeout) => match time::timeout(timeout, self.accept_stream()).await {
                Ok(accepted) => accepted?,
                Err(_) => {
                    trace!(?timeout, "accept timed out");
                    return Ok(None);
                }
            },
            None => self.accept_stream().await?,
        };

        let id = ClientId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let transport = Transport::accepted(stream, Arc::clone(&self.client_options), peer.clone(), id);
        self.registry
            .insert(ClientHandle::new(id, peer.clone(), transport.close_handle()));
        debug!(%id, peer = %peer, tls = transport.is_encrypted(), "client accepted");
        Ok(Some(transport))
    }

    async fn accept_stream(&self) -> Result<(Stream, String), TransportError> {
        match &self.listener {
            Listener::Tcp(listener) => match &self.tls {
                Some(intake) => intake.next(listener).await,
                None => {
                    let (tcp, addr) = listener.accept().await.map_err(TransportError::Accept)?;
                    Ok((Stream::Tcp(tcp), addr.to_string()))
                }
            },
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (unix, _) = listener.accept().await.map_err(TransportError::Accept)?;
                let peer = self
                    .path
                    .as_deref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default();
                Ok((Stream::Unix(unix), peer))
            }
            Listener::Udp(_) => Err(self.unsupported("accept")),
        }
    }

    /// Wait for one datagram, returning its payload and sender.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the receive fails or
    /// [`TransportError::Unsupported`] on stream listeners.
    pub async fn receive(&self) -> Result<(Bytes, SocketAddr), TransportError> {
        let Listener::Udp(socket) = &self.listener else {
            return Err(self.unsupported("receive"));
        };
        let mut buf = vec![0_u8; MAX_DATAGRAM_SIZE];
        let (len, from) = socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        trace!(%from, bytes = len, "datagram received");
        Ok((Bytes::from(buf), from))
    }

    /// Send one datagram to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the send fails or
    /// [`TransportError::Unsupported`] on stream listeners.
    pub async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<(), TransportError> {
        let Listener::Udp(socket) = &self.listener else {
            return Err(self.unsupported("send_to"));
        };
        socket.send_to(data, target).await?;
        Ok(())
    }

    fn unsupported(&self, operation: &'static str) -> TransportError {
        TransportError::Unsupported {
            operation,
            kind: self.options.kind(),
        }
    }

    /// Bound address for TCP and UDP listeners.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.local_addr }

    /// Socket path for unix listeners.
    #[must_use]
    pub fn path(&self) -> Option<&Path> { self.path.as_deref() }

    /// Options the socket was bound with.
    #[must_use]
    pub fn options(&self) -> &TransportOptions { &self.options }

    /// Socket family in use.
    #[must_use]
    pub fn kind(&self) -> TransportKind { self.options.kind() }

    /// Shared registry of accepted clients.
    #[must_use]
    pub fn registry(&self) -> &ClientRegistry { &self.registry }

    /// Handles of all accepted clients not yet removed.
    #[must_use]
    pub fn clients(&self) -> Vec<ClientHandle> { self.registry.handles() }

    /// Forget a client. Its transport is left open.
    pub fn remove_client(&self, id: ClientId) -> Option<ClientHandle> { self.registry.remove(id) }
}

impl std::fmt::Debug for ListenSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenSocket")
            .field("kind", &self.options.kind())
            .field("local_addr", &self.local_addr)
            .field("path", &self.path)
            .field("tls", &self.tls.is_some())
            .field("clients", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Drop for ListenSocket {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            if let Err(err) = std::fs::remove_file(path) {
                trace!(path = %path.display(), error = %err, "failed to remove socket file");
            }
        }
    }
}

type Handshake = (io::Result<TlsStream<TcpStream>>, SocketAddr);

/// Server-side TLS handshakes running off the accept path.
struct TlsIntake {
    acceptor: TlsAcceptor,
    timeout: Duration,
    done_tx: mpsc::UnboundedSender<Handshake>,
    done_rx: Mutex<mpsc::UnboundedReceiver<Handshake>>,
}

impl TlsIntake {
    fn new(acceptor: TlsAcceptor, timeout: Duration) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            acceptor,
            timeout,
            done_tx,
            done_rx: Mutex::new(done_rx),
        }
    }

    /// Accept sockets and start their handshakes until one completes.
    async fn next(&self, listener: &TcpListener) -> Result<(Stream, String), TransportError> {
        let mut done = self.done_rx.lock().await;
        loop {
            tokio::select! {
                Some((result, addr)) = done.recv() => match result {
                    Ok(tls) => return Ok((Stream::ServerTls(Box::new(tls)), addr.to_string())),
                    Err(err) => debug!(peer = %addr, error = %err, "TLS handshake failed"),
                },
                accepted = listener.accept() => {
                    let (tcp, addr) = accepted.map_err(TransportError::Accept)?;
                    self.start(tcp, addr);
                }
            }
        }
    }

    fn start(&self, tcp: TcpStream, addr: SocketAddr) {
        let acceptor = self.acceptor.clone();
        let done = self.done_tx.clone();
        let limit = self.timeout;
        tokio::spawn(async move {
            let result = time::timeout(limit, acceptor.accept(tcp))
                .await
                .unwrap_or_else(|_| {
                    Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "TLS handshake timed out",
                    ))
                });
            if done.send((result, addr)).is_err() {
                trace!(peer = %addr, "listener gone before handshake finished");
            }
        });
    }
}

type Bound = (Listener, Option<SocketAddr>, Option<PathBuf>);

#[cfg(unix)]
fn bind_unix_listener(path: &str) -> io::Result<Bound> {
    let listener = UnixListener::bind(path)?;
    Ok((Listener::Unix(listener), None, Some(PathBuf::from(path))))
}

#[cfg(not(unix))]
fn bind_unix_listener(_path: &str) -> io::Result<Bound> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix sockets are not available on this platform",
    ))
}
