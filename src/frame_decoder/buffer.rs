//! Two-stage byte buffer backing the framing loop.
//!
//! `staged` holds the bytes currently offered to the decoder; `ingest`
//! collects bytes read since the last promotion. `staged` followed by
//! `ingest` is always the unconsumed tail of the stream.

use bytes::{Buf, BytesMut};

use crate::error::ProtocolError;

#[derive(Debug, Default)]
pub(super) struct StreamBuffer {
    staged: BytesMut,
    ingest: BytesMut,
}

impl StreamBuffer {
    pub(super) fn is_empty(&self) -> bool { self.staged.is_empty() && self.ingest.is_empty() }

    pub(super) fn len(&self) -> usize { self.staged.len() + self.ingest.len() }

    pub(super) fn staged(&self) -> &[u8] { &self.staged }

    pub(super) fn has_staged(&self) -> bool { !self.staged.is_empty() }

    pub(super) fn has_ingest(&self) -> bool { !self.ingest.is_empty() }

    /// Queue freshly read bytes behind everything already buffered.
    pub(super) fn push(&mut self, bytes: &[u8]) { self.ingest.extend_from_slice(bytes); }

    /// Append all of `ingest` to `staged`.
    pub(super) fn promote(&mut self) {
        if self.staged.is_empty() {
            std::mem::swap(&mut self.staged, &mut self.ingest);
        } else {
            self.staged.extend_from_slice(&self.ingest);
            self.ingest.clear();
        }
    }

    /// Drop `consumed` bytes from the front of `staged`.
    pub(super) fn consume(&mut self, consumed: usize) -> Result<(), ProtocolError> {
        if consumed == 0 {
            return Err(ProtocolError::NoProgress);
        }
        if consumed > self.staged.len() {
            return Err(ProtocolError::OverConsumed {
                consumed,
                available: self.staged.len(),
            });
        }
        self.staged.advance(consumed);
        Ok(())
    }
}
