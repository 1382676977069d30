#![doc(html_root_url = "https://docs.rs/wiresock/latest")]
//! Public API for the `wiresock` library.
//!
//! This crate provides the transport and framing layer beneath
//! directory-protocol clients and servers: TCP, UDP and unix-domain
//! transports with optional TLS, a framing loop that turns arbitrarily
//! chunked byte streams into decoded messages, sequential failover across
//! candidate hosts, and listening sockets that track accepted clients.

pub mod byte_order;
pub mod codec;
pub mod error;
pub mod frame_decoder;
pub mod listener;
pub mod metrics;
pub mod options;
pub mod pool;
pub mod transport;

mod test_helpers;

pub use codec::{DecodeOutcome, Decoder, IdentityBuilder, MessageBuilder};
pub use error::{ConfigError, EncryptionChange, FrameError, ProtocolError, TransportError};
pub use frame_decoder::FrameDecoder;
pub use listener::{ClientHandle, ClientId, ClientRegistry, ListenSocket};
pub use metrics::{CONNECTIONS_TOTAL, ERRORS_TOTAL, FRAMES_DECODED};
pub use options::{SocketOptions, TlsMethod, TransportKind, TransportOptions};
pub use pool::ConnectionPool;
pub use transport::{ByteSource, CloseHandle, ReadMode, ReadOutcome, Role, Transport};
