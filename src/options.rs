//! Immutable transport configuration.
//!
//! [`TransportOptions`] is assembled once through [`TransportOptionsBuilder`]
//! (or deserialized with `serde`) and validated eagerly: an unknown transport
//! kind, a missing port, or TLS on a non-TCP kind are reported before any
//! socket is opened. After construction the options are shared read-only
//! between transports.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::Deserialize;

use crate::error::ConfigError;

mod socket;
pub use socket::SocketOptions;

/// Read chunk size used by stream transports unless overridden.
pub const DEFAULT_STREAM_CHUNK_SIZE: usize = 8192;

/// Largest UDP payload; also the default datagram read size.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Supported socket families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Connection-oriented TCP, optionally with TLS.
    Tcp,
    /// Datagram UDP.
    Udp,
    /// Unix domain stream socket addressed by path.
    Unix,
}

impl TransportKind {
    /// Whether the kind delivers a byte stream rather than datagrams.
    #[must_use]
    pub const fn is_stream(self) -> bool { !matches!(self, Self::Udp) }

    /// Scheme used when rendering endpoint URIs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Unix => "unix",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "unix" => Ok(Self::Unix),
            other => Err(ConfigError::InvalidTransport(other.to_owned())),
        }
    }
}

/// TLS protocol versions a connection may negotiate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TlsMethod {
    /// Any version supported by the TLS stack.
    #[default]
    Any,
    /// TLS 1.2 only.
    Tls12,
    /// TLS 1.3 only.
    Tls13,
}

impl FromStr for TlsMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(Self::Any),
            "tls1.2" => Ok(Self::Tls12),
            "tls1.3" => Ok(Self::Tls13),
            other => Err(ConfigError::InvalidTlsMethod(other.to_owned())),
        }
    }
}

/// Certificate and verification settings for TLS.
///
/// The certificate and key double as the server identity for accepted
/// connections and as the client identity when dialling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsOptions {
    pub(crate) enabled: bool,
    pub(crate) validate_cert: bool,
    pub(crate) allow_self_signed: bool,
    pub(crate) ca_cert: Option<PathBuf>,
    pub(crate) cert: Option<PathBuf>,
    pub(crate) cert_key: Option<PathBuf>,
    pub(crate) cert_passphrase: Option<String>,
    pub(crate) peer_name: Option<String>,
    pub(crate) method: TlsMethod,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            validate_cert: true,
            allow_self_signed: false,
            ca_cert: None,
            cert: None,
            cert_key: None,
            cert_passphrase: None,
            peer_name: None,
            method: TlsMethod::Any,
        }
    }
}

impl TlsOptions {
    /// Whether TLS is negotiated as part of connecting.
    #[must_use]
    pub fn enabled(&self) -> bool { self.enabled }

    /// Whether peer certificates are verified.
    #[must_use]
    pub fn validate_cert(&self) -> bool { self.validate_cert }

    /// Whether certificates without a known issuer are tolerated.
    #[must_use]
    pub fn allow_self_signed(&self) -> bool { self.allow_self_signed }

    /// CA bundle replacing the built-in web PKI roots.
    #[must_use]
    pub fn ca_cert(&self) -> Option<&Path> { self.ca_cert.as_deref() }

    /// Local certificate chain.
    #[must_use]
    pub fn cert(&self) -> Option<&Path> { self.cert.as_deref() }

    /// Private key for [`cert`](Self::cert).
    #[must_use]
    pub fn cert_key(&self) -> Option<&Path> { self.cert_key.as_deref() }

    /// Passphrase for the private key.
    ///
    /// Carried for configuration compatibility; encrypted keys are not
    /// decoded and fail to load.
    #[must_use]
    pub fn cert_passphrase(&self) -> Option<&str> { self.cert_passphrase.as_deref() }

    /// Name checked against the peer certificate instead of the dialled host.
    #[must_use]
    pub fn peer_name(&self) -> Option<&str> { self.peer_name.as_deref() }

    /// Permitted protocol versions.
    #[must_use]
    pub fn method(&self) -> TlsMethod { self.method }
}

/// Validated, immutable configuration shared by transports and listeners.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use wiresock::options::{TransportKind, TransportOptions};
///
/// let options = TransportOptions::builder(TransportKind::Tcp)
///     .port(389)
///     .timeout_read(Duration::from_secs(5))
///     .build()
///     .expect("valid options");
/// assert_eq!(options.port(), Some(389));
/// assert_eq!(options.read_chunk_size(), 8192);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawTransportOptions")]
pub struct TransportOptions {
    kind: TransportKind,
    port: Option<u16>,
    tls: TlsOptions,
    timeout_connect: Duration,
    timeout_read: Duration,
    idle_timeout: Duration,
    read_chunk_size: usize,
    socket: SocketOptions,
}

impl TransportOptions {
    /// Start building options for `kind`.
    #[must_use]
    pub fn builder(kind: TransportKind) -> TransportOptionsBuilder {
        TransportOptionsBuilder::new(kind)
    }

    /// Socket family.
    #[must_use]
    pub fn kind(&self) -> TransportKind { self.kind }

    /// Remote or local port; always present for network kinds.
    #[must_use]
    pub fn port(&self) -> Option<u16> { self.port }

    /// TLS settings.
    #[must_use]
    pub fn tls(&self) -> &TlsOptions { &self.tls }

    /// Upper bound on establishing a connection, TLS handshake included.
    #[must_use]
    pub fn timeout_connect(&self) -> Duration { self.timeout_connect }

    /// Upper bound on a single blocking read.
    #[must_use]
    pub fn timeout_read(&self) -> Duration { self.timeout_read }

    /// Read timeout applied to connections accepted by a listener.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration { self.idle_timeout }

    /// Bytes requested from the OS per read call.
    #[must_use]
    pub fn read_chunk_size(&self) -> usize { self.read_chunk_size }

    /// TCP socket tuning.
    #[must_use]
    pub fn socket(&self) -> &SocketOptions { &self.socket }

    /// Copy of these options with a different read timeout.
    #[must_use]
    pub fn with_read_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout_read: timeout,
            ..self.clone()
        }
    }
}

/// Builder for [`TransportOptions`].
#[derive(Clone, Debug)]
pub struct TransportOptionsBuilder {
    kind: TransportKind,
    port: Option<u16>,
    tls: TlsOptions,
    timeout_connect: Duration,
    timeout_read: Duration,
    idle_timeout: Duration,
    read_chunk_size: Option<usize>,
    socket: SocketOptions,
}

impl TransportOptionsBuilder {
    fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            port: None,
            tls: TlsOptions::default(),
            timeout_connect: DEFAULT_CONNECT_TIMEOUT,
            timeout_read: DEFAULT_READ_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            read_chunk_size: None,
            socket: SocketOptions::default(),
        }
    }

    /// Port to connect to or bind on.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Negotiate TLS while connecting.
    #[must_use]
    pub fn use_tls(mut self, enabled: bool) -> Self {
        self.tls.enabled = enabled;
        self
    }

    /// Verify the peer certificate chain and name.
    #[must_use]
    pub fn tls_validate_cert(mut self, enabled: bool) -> Self {
        self.tls.validate_cert = enabled;
        self
    }

    /// Tolerate peer certificates whose issuer is unknown.
    #[must_use]
    pub fn tls_allow_self_signed(mut self, enabled: bool) -> Self {
        self.tls.allow_self_signed = enabled;
        self
    }

    /// PEM bundle of trusted CA certificates.
    #[must_use]
    pub fn tls_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls.ca_cert = Some(path.into());
        self
    }

    /// PEM certificate chain presented to the peer.
    #[must_use]
    pub fn tls_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls.cert = Some(path.into());
        self
    }

    /// PEM private key matching [`tls_cert`](Self::tls_cert).
    #[must_use]
    pub fn tls_cert_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls.cert_key = Some(path.into());
        self
    }

    /// Passphrase for the private key.
    #[must_use]
    pub fn tls_cert_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.tls.cert_passphrase = Some(passphrase.into());
        self
    }

    /// Name to verify instead of the dialled host.
    #[must_use]
    pub fn tls_peer_name(mut self, name: impl Into<String>) -> Self {
        self.tls.peer_name = Some(name.into());
        self
    }

    /// Restrict negotiated protocol versions.
    #[must_use]
    pub fn tls_method(mut self, method: TlsMethod) -> Self {
        self.tls.method = method;
        self
    }

    /// Connect timeout.
    #[must_use]
    pub fn timeout_connect(mut self, timeout: Duration) -> Self {
        self.timeout_connect = timeout;
        self
    }

    /// Read timeout for blocking reads.
    #[must_use]
    pub fn timeout_read(mut self, timeout: Duration) -> Self {
        self.timeout_read = timeout;
        self
    }

    /// Read timeout applied to accepted connections.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Bytes requested per read call.
    #[must_use]
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = Some(size);
        self
    }

    /// TCP socket tuning applied before connecting.
    #[must_use]
    pub fn socket_options(mut self, socket: SocketOptions) -> Self {
        self.socket = socket;
        self
    }

    /// Validate and freeze the options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a network kind has no port, TLS is
    /// requested on a non-TCP kind, or the read chunk size is zero.
    pub fn build(self) -> Result<TransportOptions, ConfigError> {
        if self.port.is_none() && self.kind != TransportKind::Unix {
            return Err(ConfigError::MissingPort(self.kind));
        }
        if self.tls.enabled && self.kind != TransportKind::Tcp {
            return Err(ConfigError::TlsUnsupported(self.kind));
        }
        let read_chunk_size = self.read_chunk_size.unwrap_or(if self.kind.is_stream() {
            DEFAULT_STREAM_CHUNK_SIZE
        } else {
            MAX_DATAGRAM_SIZE
        });
        if read_chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }

        Ok(TransportOptions {
            kind: self.kind,
            port: self.port,
            tls: self.tls,
            timeout_connect: self.timeout_connect,
            timeout_read: self.timeout_read,
            idle_timeout: self.idle_timeout,
            read_chunk_size,
            socket: self.socket,
        })
    }
}

/// Flat option names accepted by deserialization.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawTransportOptions {
    transport: String,
    port: Option<u16>,
    use_tls: bool,
    tls_validate_cert: bool,
    tls_allow_self_signed: bool,
    tls_ca_cert: Option<PathBuf>,
    tls_cert: Option<PathBuf>,
    tls_cert_key: Option<PathBuf>,
    tls_cert_passphrase: Option<String>,
    tls_peer_name: Option<String>,
    tls_method: Option<String>,
    timeout_connect: Option<u64>,
    timeout_read: Option<u64>,
    idle_timeout: Option<u64>,
    read_chunk_size: Option<usize>,
}

impl Default for RawTransportOptions {
    fn default() -> Self {
        Self {
            transport: TransportKind::Tcp.as_str().to_owned(),
            port: None,
            use_tls: false,
            tls_validate_cert: true,
            tls_allow_self_signed: false,
            tls_ca_cert: None,
            tls_cert: None,
            tls_cert_key: None,
            tls_cert_passphrase: None,
            tls_peer_name: None,
            tls_method: None,
            timeout_connect: None,
            timeout_read: None,
            idle_timeout: None,
            read_chunk_size: None,
        }
    }
}

impl TryFrom<RawTransportOptions> for TransportOptions {
    type Error = ConfigError;

    fn try_from(raw: RawTransportOptions) -> Result<Self, Self::Error> {
        let mut builder = TransportOptions::builder(raw.transport.parse()?)
            .use_tls(raw.use_tls)
            .tls_validate_cert(raw.tls_validate_cert)
            .tls_allow_self_signed(raw.tls_allow_self_signed);
        builder.port = raw.port;
        builder.tls.ca_cert = raw.tls_ca_cert;
        builder.tls.cert = raw.tls_cert;
        builder.tls.cert_key = raw.tls_cert_key;
        builder.tls.cert_passphrase = raw.tls_cert_passphrase;
        builder.tls.peer_name = raw.tls_peer_name;
        if let Some(method) = raw.tls_method {
            builder.tls.method = method.parse()?;
        }
        if let Some(secs) = raw.timeout_connect {
            builder.timeout_connect = Duration::from_secs(secs);
        }
        if let Some(secs) = raw.timeout_read {
            builder.timeout_read = Duration::from_secs(secs);
        }
        if let Some(secs) = raw.idle_timeout {
            builder.idle_timeout = Duration::from_secs(secs);
        }
        builder.read_chunk_size = raw.read_chunk_size;
        builder.build()
    }
}

#[cfg(test)]
mod tests;
