//! Collaborator traits consumed by [`FrameDecoder`](crate::FrameDecoder).
//!
//! A [`Decoder`] inspects the bytes staged by the framing loop and reports
//! one of three outcomes through [`DecodeOutcome`]: a complete value plus the
//! number of bytes it occupied, a request for more bytes, or an
//! unrecoverable error. A [`MessageBuilder`] then turns each decoded value
//! into the message type handed to callers.
//!
//! Two stock decoders are provided: [`LengthPrefixedDecoder`] for 4-byte
//! length-prefixed frames and [`BerDecoder`] for self-delimiting BER
//! elements such as LDAP messages.

use std::{convert::Infallible, error::Error};

mod ber;
mod length;

pub use ber::BerDecoder;
pub use length::{LENGTH_HEADER_SIZE, LengthPrefixedDecoder, encode_length_prefixed};

/// Largest frame the stock decoders will accept (16 MiB).
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Result of one decode attempt over the staged bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeOutcome<V> {
    /// A complete frame was decoded from the front of the input.
    Decoded {
        /// Decoded value.
        value: V,
        /// Bytes occupied by the frame, counted from the start of the input.
        consumed: usize,
    },
    /// The input is a valid but incomplete prefix of a frame.
    Partial,
    /// The input can never form a valid frame.
    Malformed(String),
}

/// Parses one frame from the front of a byte slice.
///
/// Implementations must not retain state between calls: the framing loop
/// may offer the same frame prefix repeatedly as more bytes arrive.
///
/// Plain closures implement this trait:
///
/// ```
/// use wiresock::codec::{DecodeOutcome, Decoder};
///
/// // Frames are terminated by a newline.
/// let lines = |bytes: &[u8]| match bytes.iter().position(|b| *b == b'\n') {
///     Some(end) => DecodeOutcome::Decoded {
///         value: bytes[..end].to_vec(),
///         consumed: end + 1,
///     },
///     None => DecodeOutcome::Partial,
/// };
/// assert_eq!(lines.decode(b"ab"), DecodeOutcome::Partial);
/// assert_eq!(
///     lines.decode(b"ab\ncd"),
///     DecodeOutcome::Decoded {
///         value: b"ab".to_vec(),
///         consumed: 3
///     }
/// );
/// ```
pub trait Decoder {
    /// Value produced for each frame.
    type Value;

    /// Attempt to decode one frame from the front of `bytes`.
    fn decode(&self, bytes: &[u8]) -> DecodeOutcome<Self::Value>;
}

impl<F, V> Decoder for F
where
    F: Fn(&[u8]) -> DecodeOutcome<V>,
{
    type Value = V;

    fn decode(&self, bytes: &[u8]) -> DecodeOutcome<V> { self(bytes) }
}

/// Turns decoded values into domain messages.
///
/// `correlation_id` is whatever the caller passed to
/// [`FrameDecoder::next_with_id`](crate::FrameDecoder::next_with_id), letting
/// builders validate or stamp response identifiers. Closures of the form
/// `Fn(V, Option<u64>) -> Result<M, E>` implement this trait.
pub trait MessageBuilder<V> {
    /// Message type returned to callers.
    type Message;
    /// Construction failure, reported as a protocol error.
    type Error: Into<Box<dyn Error + Send + Sync>>;

    /// Build a message from a decoded value.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the value does not describe a valid message.
    fn build(&self, value: V, correlation_id: Option<u64>) -> Result<Self::Message, Self::Error>;
}

impl<F, V, M, E> MessageBuilder<V> for F
where
    F: Fn(V, Option<u64>) -> Result<M, E>,
    E: Into<Box<dyn Error + Send + Sync>>,
{
    type Message = M;
    type Error = E;

    fn build(&self, value: V, correlation_id: Option<u64>) -> Result<M, E> {
        self(value, correlation_id)
    }
}

/// Builder that returns decoded values unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityBuilder;

impl<V> MessageBuilder<V> for IdentityBuilder {
    type Message = V;
    type Error = Infallible;

    fn build(&self, value: V, _correlation_id: Option<u64>) -> Result<V, Infallible> { Ok(value) }
}
