//! Decoder for frames carrying a 4-byte big-endian length prefix.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};

use super::{DecodeOutcome, Decoder, MAX_FRAME_LENGTH};
use crate::byte_order::{read_network_u32, write_network_u32};

/// Size of the length prefix in bytes.
pub const LENGTH_HEADER_SIZE: usize = 4;

/// Decodes `[u32 length][payload]` frames, yielding the payload.
///
/// # Examples
///
/// ```
/// use wiresock::codec::{DecodeOutcome, Decoder, LengthPrefixedDecoder};
///
/// let decoder = LengthPrefixedDecoder::default();
/// let outcome = decoder.decode(&[0, 0, 0, 2, b'h', b'i', 0xff]);
/// assert!(matches!(
///     outcome,
///     DecodeOutcome::Decoded { ref value, consumed: 6 } if &value[..] == b"hi"
/// ));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct LengthPrefixedDecoder {
    max_frame_length: usize,
}

impl LengthPrefixedDecoder {
    /// Create a decoder rejecting payloads longer than `max_frame_length`.
    ///
    /// The limit is capped at [`MAX_FRAME_LENGTH`].
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: max_frame_length.min(MAX_FRAME_LENGTH),
        }
    }

    /// Largest payload accepted.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }
}

impl Default for LengthPrefixedDecoder {
    fn default() -> Self { Self::new(MAX_FRAME_LENGTH) }
}

impl Decoder for LengthPrefixedDecoder {
    type Value = Bytes;

    fn decode(&self, bytes: &[u8]) -> DecodeOutcome<Bytes> {
        let Some(header) = bytes
            .get(..LENGTH_HEADER_SIZE)
            .and_then(|slice| <[u8; LENGTH_HEADER_SIZE]>::try_from(slice).ok())
        else {
            return DecodeOutcome::Partial;
        };
        let Ok(len) = usize::try_from(read_network_u32(header)) else {
            return DecodeOutcome::Malformed("frame length does not fit in memory".into());
        };
        if len > self.max_frame_length {
            return DecodeOutcome::Malformed(format!(
                "frame exceeds max length: {len} > {}",
                self.max_frame_length
            ));
        }
        let end = LENGTH_HEADER_SIZE + len;
        match bytes.get(LENGTH_HEADER_SIZE..end) {
            Some(payload) => DecodeOutcome::Decoded {
                value: Bytes::copy_from_slice(payload),
                consumed: end,
            },
            None => DecodeOutcome::Partial,
        }
    }
}

/// Prefix `payload` with its length, ready to be written to a transport.
///
/// # Errors
///
/// Returns [`io::ErrorKind::InvalidInput`] if `payload` is longer than
/// `u32::MAX` bytes.
pub fn encode_length_prefixed(payload: &[u8]) -> io::Result<Bytes> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "payload too long for a 4-byte length prefix",
        )
    })?;
    let mut out = BytesMut::with_capacity(LENGTH_HEADER_SIZE + payload.len());
    out.put_slice(&write_network_u32(len));
    out.put_slice(payload);
    Ok(out.freeze())
}
