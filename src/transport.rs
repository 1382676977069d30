//! A single connection: connect, read, write, TLS upgrade and close.
//!
//! [`Transport`] exclusively owns one TCP, UDP or unix-domain socket. Reads
//! come in two flavours selected by [`ReadMode`]: a blocking read suspends the
//! task until at least one byte arrives (bounded by the read timeout), while a
//! non-blocking read polls the socket exactly once. Either flavour greedily
//! drains whatever the operating system has already buffered once data is
//! available, so a single call may return several network reads' worth of
//! bytes without waiting for another round trip.
//!
//! Peer shutdown is not an error: it is reported as [`ReadOutcome::Closed`].

use std::{io, sync::Arc};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::FutureExt;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    error::{EncryptionChange, TransportError},
    listener::ClientId,
    metrics,
    options::{TransportKind, TransportOptions},
};

mod dial;
mod stream;
mod tls;

pub(crate) use dial::endpoint_uri;
pub(crate) use stream::Stream;
pub(crate) use tls::acceptor as tls_acceptor;

/// How long a read may wait for data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// Suspend until data arrives, the peer closes, or the read timeout fires.
    Blocking,
    /// Poll the socket once and return immediately.
    NonBlocking,
}

/// Result of a successful read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One or more bytes.
    Data(Bytes),
    /// A non-blocking read found nothing buffered.
    WouldBlock,
    /// The peer closed the connection or the transport was closed locally.
    Closed,
}

/// Source of raw bytes for a [`FrameDecoder`](crate::FrameDecoder).
#[async_trait]
pub trait ByteSource: Send {
    /// Read whatever is available according to `mode`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] on socket failures and read timeouts.
    async fn read(&mut self, mode: ReadMode) -> Result<ReadOutcome, TransportError>;
}

#[async_trait]
impl<'a, T> ByteSource for &'a mut T
where
    T: ByteSource + ?Sized,
{
    async fn read(&mut self, mode: ReadMode) -> Result<ReadOutcome, TransportError> {
        (**self).read(mode).await
    }
}

/// Which end of the connection this transport represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Dialled by this process.
    Client,
    /// Accepted by a [`ListenSocket`](crate::ListenSocket).
    Server,
}

impl Role {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

/// Cloneable handle that closes a [`Transport`] from another task.
///
/// Closing through the handle ends an outstanding blocking read with
/// [`ReadOutcome::Closed`]; the owning transport then releases its socket.
#[derive(Clone, Debug)]
pub struct CloseHandle(CancellationToken);

impl CloseHandle {
    /// Request closure of the transport.
    pub fn close(&self) { self.0.cancel(); }

    /// Whether closure has been requested.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.0.is_cancelled() }
}

/// One connection plus the options it was opened with.
pub struct Transport {
    stream: Option<Stream>,
    /// Reused across reads; empty between calls to `read`.
    read_buf: BytesMut,
    options: Arc<TransportOptions>,
    role: Role,
    peer: String,
    tls_active: bool,
    eof: bool,
    closer: CancellationToken,
    client_id: Option<ClientId>,
}

impl Transport {
    /// Create an unconnected transport.
    ///
    /// # Examples
    ///
    /// ```
    /// use wiresock::{Transport, TransportKind, TransportOptions};
    ///
    /// let options = TransportOptions::builder(TransportKind::Tcp)
    ///     .port(389)
    ///     .build()
    ///     .expect("valid options");
    /// let transport = Transport::new(options);
    /// assert!(!transport.is_connected());
    /// ```
    #[must_use]
    pub fn new(options: TransportOptions) -> Self { Self::with_shared_options(Arc::new(options)) }

    pub(crate) fn with_shared_options(options: Arc<TransportOptions>) -> Self {
        Self {
            stream: None,
            read_buf: BytesMut::new(),
            options,
            role: Role::Client,
            peer: String::new(),
            tls_active: false,
            eof: false,
            closer: CancellationToken::new(),
            client_id: None,
        }
    }

    /// Wrap a socket accepted by a listener.
    pub(crate) fn accepted(
        stream: Stream,
        options: Arc<TransportOptions>,
        peer: String,
        client_id: ClientId,
    ) -> Self {
        metrics::inc_connections(Role::Server);
        Self {
            tls_active: stream.is_tls(),
            stream: Some(stream),
            read_buf: BytesMut::new(),
            options,
            role: Role::Server,
            peer,
            eof: false,
            closer: CancellationToken::new(),
            client_id: Some(client_id),
        }
    }

    /// Create a transport and connect it to `host`.
    ///
    /// # Errors
    ///
    /// See [`Transport::connect`].
    pub async fn open(host: &str, options: TransportOptions) -> Result<Self, TransportError> {
        let mut transport = Self::new(options);
        transport.connect(host).await?;
        Ok(transport)
    }

    /// Connect over TCP with default options.
    ///
    /// # Errors
    ///
    /// See [`Transport::connect`].
    pub async fn tcp(host: &str, port: u16) -> Result<Self, TransportError> {
        let options = TransportOptions::builder(TransportKind::Tcp).port(port).build()?;
        Self::open(host, options).await
    }

    /// Connect over UDP with default options and a full-datagram read size.
    ///
    /// # Errors
    ///
    /// See [`Transport::connect`].
    pub async fn udp(host: &str, port: u16) -> Result<Self, TransportError> {
        let options = TransportOptions::builder(TransportKind::Udp)
            .port(port)
            .read_chunk_size(crate::options::MAX_DATAGRAM_SIZE)
            .build()?;
        Self::open(host, options).await
    }

    /// Connect to the unix-domain socket at `path` with default options.
    ///
    /// # Errors
    ///
    /// See [`Transport::connect`].
    pub async fn unix(path: &str) -> Result<Self, TransportError> {
        let options = TransportOptions::builder(TransportKind::Unix).build()?;
        Self::open(path, options).await
    }

    /// Connect to `host`, which is a hostname or address for TCP and UDP and a
    /// filesystem path for unix sockets.
    ///
    /// Any existing connection is closed first. The dial, including the TLS
    /// handshake when `use_tls` is set, must complete within the connect
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] naming `host` if the connection
    /// cannot be established, or [`TransportError::Config`] if the TLS
    /// settings cannot be turned into a client configuration.
    pub async fn connect(&mut self, host: &str) -> Result<(), TransportError> {
        self.close().await;
        let options = Arc::clone(&self.options);
        let uri = endpoint_uri(&options, host);
        let tls = if options.tls().enabled() {
            Some((
                tls::connector(options.tls())?,
                tls::server_name(options.tls(), host)?,
            ))
        } else {
            None
        };

        let attempt = async {
            let stream = dial::dial(&options, host).await?;
            match (stream, tls) {
                (Stream::Tcp(tcp), Some((connector, name))) => {
                    let tls = connector.connect(name, tcp).await?;
                    Ok::<_, io::Error>(Stream::ClientTls(Box::new(tls)))
                }
                (stream, _) => Ok(stream),
            }
        };
        let stream = time::timeout(options.timeout_connect(), attempt)
            .await
            .unwrap_or_else(|_| {
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connection timed out",
                ))
            })
            .map_err(|source| {
                debug!(uri = %uri, error = %source, "connect failed");
                TransportError::Connect {
                    host: host.to_owned(),
                    source,
                }
            })?;

        debug!(uri = %uri, tls = stream.is_tls(), "connected");
        metrics::inc_connections(Role::Client);
        self.tls_active = stream.is_tls();
        self.stream = Some(stream);
        self.peer = host.to_owned();
        self.eof = false;
        self.closer = CancellationToken::new();
        Ok(())
    }

    /// Read bytes from the connection.
    ///
    /// A blocking read waits up to the read timeout for the first byte. A
    /// zero-length UDP datagram is returned as empty data rather than
    /// treated as end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] once the transport has been
    /// closed, [`TransportError::ReadTimeout`] if a blocking read saw no data
    /// in time, or [`TransportError::Io`] for other socket failures.
    pub async fn read(&mut self, mode: ReadMode) -> Result<ReadOutcome, TransportError> {
        if self.closer.is_cancelled() && self.stream.is_some() {
            self.release().await;
            return Ok(ReadOutcome::Closed);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        if self.eof {
            return Ok(ReadOutcome::Closed);
        }

        let datagram = stream.is_datagram();
        let limit = self.options.read_chunk_size();
        let buf = &mut self.read_buf;
        buf.clear();
        let first = match mode {
            ReadMode::Blocking => {
                let timeout = self.options.timeout_read();
                tokio::select! {
                    biased;
                    () = self.closer.cancelled() => Step::Cancelled,
                    res = time::timeout(timeout, stream.read_chunk(buf, limit)) => match res {
                        Ok(res) => classify(res, datagram)?,
                        Err(_) => return Err(TransportError::ReadTimeout(timeout)),
                    },
                }
            }
            ReadMode::NonBlocking => match stream.read_chunk(buf, limit).now_or_never() {
                Some(res) => classify(res, datagram)?,
                None => Step::Pending,
            },
        };

        match first {
            Step::Data => {}
            Step::Pending => return Ok(ReadOutcome::WouldBlock),
            Step::Eof => {
                trace!(peer = %self.peer, "peer closed connection");
                self.eof = true;
                return Ok(ReadOutcome::Closed);
            }
            Step::Cancelled => {
                self.release().await;
                return Ok(ReadOutcome::Closed);
            }
        }

        while let Some(res) = stream.read_chunk(buf, limit).now_or_never() {
            match classify(res, datagram) {
                Ok(Step::Data) => {}
                Ok(Step::Eof) => {
                    self.eof = true;
                    break;
                }
                Ok(Step::Pending | Step::Cancelled) => break,
                Err(err) => {
                    trace!(peer = %self.peer, error = %err, "drain stopped");
                    break;
                }
            }
        }
        trace!(peer = %self.peer, bytes = buf.len(), "read");
        Ok(ReadOutcome::Data(buf.split().freeze()))
    }

    /// Send `data` on a best-effort basis.
    ///
    /// Failures, including writing to a closed transport, are logged and
    /// otherwise ignored. Confirmation of delivery has to come from the peer.
    pub async fn write(&mut self, data: &[u8]) {
        let Some(stream) = self.stream.as_mut() else {
            debug!(peer = %self.peer, bytes = data.len(), "write on closed transport dropped");
            return;
        };
        if let Err(err) = stream.write_all(data).await {
            debug!(peer = %self.peer, error = %err, "write failed");
        }
    }

    /// Start (`true`) or stop (`false`) TLS on the existing connection.
    ///
    /// Requesting the current state is a no-op. Stopping TLS sends
    /// `close_notify` and returns the connection to plaintext. A failed
    /// handshake leaves the connection unusable and releases it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Encryption`] if the handshake or shutdown
    /// fails, [`TransportError::Unsupported`] on UDP and unix transports,
    /// [`TransportError::NotConnected`] if closed, or
    /// [`TransportError::Config`] if the TLS settings are unusable.
    pub async fn encrypt(&mut self, enable: bool) -> Result<(), TransportError> {
        if enable == self.tls_active && self.stream.is_some() {
            return Ok(());
        }
        let change = if enable {
            EncryptionChange::Enable
        } else {
            EncryptionChange::Disable
        };
        match self.stream.as_ref() {
            None => return Err(TransportError::NotConnected),
            Some(Stream::Tcp(_) | Stream::ClientTls(_) | Stream::ServerTls(_)) => {}
            Some(_) => {
                return Err(TransportError::Unsupported {
                    operation: "encryption",
                    kind: self.options.kind(),
                });
            }
        }

        let pending = if enable {
            self.start_tls_config()?
        } else {
            TlsStart::None
        };
        let Some(stream) = self.stream.take() else {
            return Err(TransportError::NotConnected);
        };
        let result = time::timeout(self.options.timeout_connect(), switch_tls(stream, pending))
            .await
            .unwrap_or_else(|_| {
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "TLS negotiation timed out",
                ))
            });
        match result {
            Ok(stream) => {
                debug!(peer = %self.peer, change = %change, "encryption changed");
                self.tls_active = stream.is_tls();
                self.stream = Some(stream);
                Ok(())
            }
            Err(source) => {
                debug!(peer = %self.peer, change = %change, error = %source, "encryption change failed");
                self.tls_active = false;
                self.closer.cancel();
                Err(TransportError::Encryption { change, source })
            }
        }
    }

    fn start_tls_config(&self) -> Result<TlsStart, TransportError> {
        let tls = self.options.tls();
        Ok(match self.role {
            Role::Client => TlsStart::Client(
                tls::connector(tls)?,
                tls::server_name(tls, &self.peer)?,
            ),
            Role::Server => TlsStart::Server(tls::acceptor(tls)?),
        })
    }

    /// Whether the transport holds a connection whose peer has not signalled
    /// end of stream.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some() && !self.eof && !self.closer.is_cancelled()
    }

    /// Shut down and release the connection.
    ///
    /// Closing an already closed or never connected transport does nothing.
    pub async fn close(&mut self) {
        self.closer.cancel();
        self.release().await;
    }

    async fn release(&mut self) {
        self.tls_active = false;
        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.shutdown().await {
                trace!(peer = %self.peer, error = %err, "shutdown failed");
            }
            debug!(peer = %self.peer, "transport closed");
        }
    }

    /// Handle that can close this transport from another task.
    #[must_use]
    pub fn close_handle(&self) -> CloseHandle { CloseHandle(self.closer.clone()) }

    /// Options this transport was created with.
    #[must_use]
    pub fn options(&self) -> &TransportOptions { &self.options }

    /// Socket family in use.
    #[must_use]
    pub fn kind(&self) -> TransportKind { self.options.kind() }

    /// Host or path dialled, or the remote address of an accepted client.
    #[must_use]
    pub fn peer(&self) -> &str { &self.peer }

    /// Whether TLS is currently active.
    #[must_use]
    pub fn is_encrypted(&self) -> bool { self.tls_active }

    /// Which end of the connection this is.
    #[must_use]
    pub fn role(&self) -> Role { self.role }

    /// Registry identifier when accepted by a listener.
    #[must_use]
    pub fn client_id(&self) -> Option<ClientId> { self.client_id }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("kind", &self.options.kind())
            .field("role", &self.role)
            .field("peer", &self.peer)
            .field("connected", &self.is_connected())
            .field("tls", &self.tls_active)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ByteSource for Transport {
    async fn read(&mut self, mode: ReadMode) -> Result<ReadOutcome, TransportError> {
        Transport::read(self, mode).await
    }
}

enum TlsStart {
    None,
    Client(tokio_rustls::TlsConnector, tokio_rustls::rustls::pki_types::ServerName<'static>),
    Server(tokio_rustls::TlsAcceptor),
}

async fn switch_tls(stream: Stream, start: TlsStart) -> io::Result<Stream> {
    match (stream, start) {
        (Stream::Tcp(tcp), TlsStart::Client(connector, name)) => connector
            .connect(name, tcp)
            .await
            .map(|tls| Stream::ClientTls(Box::new(tls))),
        (Stream::Tcp(tcp), TlsStart::Server(acceptor)) => acceptor
            .accept(tcp)
            .await
            .map(|tls| Stream::ServerTls(Box::new(tls))),
        (Stream::ClientTls(mut tls), TlsStart::None) => {
            tls.get_mut().1.send_close_notify();
            finish_tls(&mut *tls).await?;
            Ok(Stream::Tcp((*tls).into_inner().0))
        }
        (Stream::ServerTls(mut tls), TlsStart::None) => {
            tls.get_mut().1.send_close_notify();
            finish_tls(&mut *tls).await?;
            Ok(Stream::Tcp((*tls).into_inner().0))
        }
        (stream, _) => Ok(stream),
    }
}

/// Flush our `close_notify` and read until the peer's arrives, so no TLS
/// record is left in the socket once it carries plaintext again. Application
/// data still in flight is discarded.
async fn finish_tls<T>(tls: &mut T) -> io::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    tls.flush().await?;
    let mut scratch = [0_u8; 512];
    while tls.read(&mut scratch).await? != 0 {}
    Ok(())
}

enum Step {
    Data,
    Pending,
    Eof,
    Cancelled,
}

fn classify(result: io::Result<usize>, datagram: bool) -> Result<Step, TransportError> {
    match result {
        Ok(0) if !datagram => Ok(Step::Eof),
        Ok(_) => Ok(Step::Data),
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(Step::Pending),
        Err(err) if is_disconnect(&err) => Ok(Step::Eof),
        Err(err) => Err(TransportError::Io(err)),
    }
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
