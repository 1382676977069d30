//! Decoder framing one BER-encoded element (tag, length, contents).
//!
//! Only definite lengths are supported, which is all LDAP permits on the
//! wire. The decoded value is the complete element, header included, so a
//! message builder can hand it to a full ASN.1 parser.

use bytes::Bytes;

use super::{DecodeOutcome, Decoder, MAX_FRAME_LENGTH};

/// Multi-byte tag numbers longer than this are rejected.
const MAX_TAG_OCTETS: usize = 5;
/// Long-form lengths wider than a `u64` are rejected.
const MAX_LENGTH_OCTETS: usize = 8;

/// Frames a single BER TLV element.
///
/// # Examples
///
/// ```
/// use wiresock::codec::{BerDecoder, DecodeOutcome, Decoder};
///
/// let decoder = BerDecoder::default();
/// // SEQUENCE { INTEGER 1 }
/// let element = [0x30, 0x03, 0x02, 0x01, 0x01];
/// assert_eq!(decoder.decode(&element[..3]), DecodeOutcome::Partial);
/// assert!(matches!(
///     decoder.decode(&element),
///     DecodeOutcome::Decoded { consumed: 5, .. }
/// ));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct BerDecoder {
    max_element_length: usize,
}

impl BerDecoder {
    /// Create a decoder rejecting elements longer than `max_element_length`
    /// bytes, header included.
    ///
    /// The limit is capped at [`MAX_FRAME_LENGTH`].
    #[must_use]
    pub fn new(max_element_length: usize) -> Self {
        Self {
            max_element_length: max_element_length.min(MAX_FRAME_LENGTH),
        }
    }

    /// Largest element accepted, header included.
    #[must_use]
    pub fn max_element_length(&self) -> usize { self.max_element_length }
}

impl Default for BerDecoder {
    fn default() -> Self { Self::new(MAX_FRAME_LENGTH) }
}

/// Outcome of scanning an element header.
enum Header {
    Complete { header_len: usize, content_len: u64 },
    Incomplete,
    Invalid(String),
}

fn scan_tag(bytes: &[u8]) -> Result<Option<usize>, String> {
    let Some(&first) = bytes.first() else {
        return Ok(None);
    };
    if first & 0x1f != 0x1f {
        return Ok(Some(1));
    }
    for (idx, octet) in bytes.iter().enumerate().skip(1) {
        if idx > MAX_TAG_OCTETS {
            return Err(format!("tag number spans more than {MAX_TAG_OCTETS} octets"));
        }
        if octet & 0x80 == 0 {
            return Ok(Some(idx + 1));
        }
    }
    Ok(None)
}

fn scan_header(bytes: &[u8]) -> Header {
    let tag_len = match scan_tag(bytes) {
        Ok(Some(len)) => len,
        Ok(None) => return Header::Incomplete,
        Err(detail) => return Header::Invalid(detail),
    };
    let Some(&initial) = bytes.get(tag_len) else {
        return Header::Incomplete;
    };
    match initial {
        0x00..=0x7f => Header::Complete {
            header_len: tag_len + 1,
            content_len: u64::from(initial),
        },
        0x80 => Header::Invalid("indefinite length encoding is not supported".into()),
        0xff => Header::Invalid("reserved length octet 0xff".into()),
        _ => {
            let octets = usize::from(initial & 0x7f);
            if octets > MAX_LENGTH_OCTETS {
                return Header::Invalid(format!("length spans {octets} octets"));
            }
            let start = tag_len + 1;
            let Some(length_bytes) = bytes.get(start..start + octets) else {
                return Header::Incomplete;
            };
            let content_len = length_bytes
                .iter()
                .fold(0_u64, |acc, octet| (acc << 8) | u64::from(*octet));
            Header::Complete {
                header_len: start + octets,
                content_len,
            }
        }
    }
}

impl Decoder for BerDecoder {
    type Value = Bytes;

    fn decode(&self, bytes: &[u8]) -> DecodeOutcome<Bytes> {
        let (header_len, content_len) = match scan_header(bytes) {
            Header::Complete {
                header_len,
                content_len,
            } => (header_len, content_len),
            Header::Incomplete => return DecodeOutcome::Partial,
            Header::Invalid(detail) => return DecodeOutcome::Malformed(detail),
        };
        let total = usize::try_from(content_len)
            .ok()
            .and_then(|len| len.checked_add(header_len))
            .filter(|total| *total <= self.max_element_length);
        let Some(total) = total else {
            return DecodeOutcome::Malformed(format!(
                "element of {content_len} content bytes exceeds max length {}",
                self.max_element_length
            ));
        };
        match bytes.get(..total) {
            Some(element) => DecodeOutcome::Decoded {
                value: Bytes::copy_from_slice(element),
                consumed: total,
            },
            None => DecodeOutcome::Partial,
        }
    }
}
