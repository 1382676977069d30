//! Error taxonomy for the transport and framing layers.
//!
//! Errors are split by the stage at which they are detected:
//!
//! - [`ConfigError`]: invalid options, raised when options or pools are constructed (or when TLS
//!   material is first loaded).
//! - [`TransportError`]: dialling, binding, accepting, or reading failed at the socket level.
//! - [`FrameError`]: the framing loop could not produce the next message, either because the peer
//!   went away ([`FrameError::ConnectionLost`]) or because the byte stream is unusable
//!   ([`FrameError::Protocol`]).

use std::{fmt, io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::options::TransportKind;

/// Configuration problems detected before any I/O takes place.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The transport name is not one of the supported kinds.
    #[error("the transport \"{0}\" is not valid; it must be one of: tcp,udp,unix")]
    InvalidTransport(String),

    /// A port is mandatory for network transports.
    #[error("a port is required for {0} transports")]
    MissingPort(TransportKind),

    /// TLS was requested on a transport that cannot carry it.
    #[error("TLS is only available on tcp transports, not {0}")]
    TlsUnsupported(TransportKind),

    /// Reads must request at least one byte.
    #[error("read chunk size must be greater than zero")]
    ZeroChunkSize,

    /// The TLS method name is not recognised.
    #[error("unknown TLS method \"{0}\"; expected one of: any,tls1.2,tls1.3")]
    InvalidTlsMethod(String),

    /// A connection pool needs somewhere to connect to.
    #[error("at least one candidate host is required")]
    NoCandidates,

    /// A certificate, key or CA bundle could not be read.
    #[error("failed to load TLS material from {path}: {source}")]
    TlsMaterial {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O or PEM parsing failure.
        #[source]
        source: io::Error,
    },

    /// The key file did not contain a usable private key.
    #[error("no private key found in {0}")]
    MissingPrivateKey(PathBuf),

    /// Accepting TLS requires a certificate and key.
    #[error("a server certificate and key are required to accept TLS")]
    MissingServerIdentity,

    /// The peer name cannot be used for TLS name verification.
    #[error("invalid TLS peer name \"{0}\"")]
    InvalidPeerName(String),

    /// rustls rejected the assembled configuration.
    #[error("TLS configuration rejected: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),
}

/// Direction of a TLS state change requested through `encrypt`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncryptionChange {
    /// Upgrade a plaintext connection to TLS.
    Enable,
    /// Return a TLS connection to plaintext.
    Disable,
}

impl fmt::Display for EncryptionChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
        })
    }
}

/// Socket-level failures.
///
/// Dial and bind failures carry the host or address that was attempted along
/// with the operating system diagnostic.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connecting to a single host failed.
    #[error("unable to connect to {host}: {source}")]
    Connect {
        /// Host that was dialled.
        host: String,
        /// Low-level failure.
        #[source]
        source: io::Error,
    },

    /// Every candidate of a connection pool failed.
    #[error("unable to connect to server(s): {}", hosts.join(","))]
    Exhausted {
        /// Hosts attempted, in order.
        hosts: Vec<String>,
        /// Failure reported by the final attempt.
        #[source]
        last: Box<TransportError>,
    },

    /// Binding a listening socket failed.
    #[error("unable to open {kind} socket on {address}: {source}")]
    Bind {
        /// Transport kind being bound.
        kind: TransportKind,
        /// Address or path requested.
        address: String,
        /// Low-level failure.
        #[source]
        source: io::Error,
    },

    /// A TLS handshake or shutdown failed.
    #[error("unable to {change} encryption on the connection: {source}")]
    Encryption {
        /// Requested transition.
        change: EncryptionChange,
        /// Last error reported by the TLS stack or socket.
        #[source]
        source: io::Error,
    },

    /// Accepting an inbound connection failed.
    #[error("accept error: {0}")]
    Accept(#[source] io::Error),

    /// No data arrived within the configured read timeout.
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// The handle has no live connection.
    #[error("transport is not connected")]
    NotConnected,

    /// The operation does not apply to this transport kind.
    #[error("{operation} is not supported on {kind} sockets")]
    Unsupported {
        /// Operation attempted.
        operation: &'static str,
        /// Kind of the socket it was attempted on.
        kind: TransportKind,
    },

    /// Any other socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Options could not be turned into a working socket configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Unrecoverable problems with the decoded byte stream.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The decoder rejected the staged bytes.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The message builder rejected a decoded value.
    #[error("failed to build message")]
    Build(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The decoder claimed more bytes than it was offered.
    #[error("decoder consumed {consumed} bytes but only {available} were staged")]
    OverConsumed {
        /// Bytes the decoder reported as consumed.
        consumed: usize,
        /// Bytes actually offered.
        available: usize,
    },

    /// The decoder reported success without consuming input.
    #[error("decoder produced a value without consuming any bytes")]
    NoProgress,

    /// A previous protocol failure left the decoder unusable.
    #[error("frame decoder is unusable after an earlier protocol error")]
    Poisoned,
}

/// Failures surfaced by [`FrameDecoder`](crate::FrameDecoder).
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended while more bytes were needed.
    #[error("the connection to the server has been lost")]
    ConnectionLost,

    /// The stream cannot be decoded any further.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The underlying transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl FrameError {
    /// Short label used for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionLost => "connection_lost",
            Self::Protocol(_) => "protocol",
            Self::Transport(_) => "transport",
        }
    }
}
