//! Pull-based framing loop turning a byte stream into messages.
//!
//! [`FrameDecoder`] owns a [`ByteSource`] (normally a [`Transport`]), a
//! [`Decoder`] and a [`MessageBuilder`]. Each call to
//! [`next`](FrameDecoder::next) yields exactly one message regardless of how
//! the peer's bytes were split across network reads.
//!
//! The loop blocks only when the decoder needs bytes that have not arrived.
//! Once a frame is decoded and nothing else is staged, the source is polled
//! once without blocking so that pipelined frames already sitting in the
//! socket are picked up by the next call without another wait.

use futures::Stream;
use tracing::trace;

use crate::{
    codec::{DecodeOutcome, Decoder, MessageBuilder},
    error::{FrameError, ProtocolError},
    metrics,
    transport::{ByteSource, ReadMode, ReadOutcome, Transport},
};

mod buffer;

use buffer::StreamBuffer;

/// Framing loop over one byte source.
///
/// After a protocol error the decoder is poisoned: every further call fails
/// with [`ProtocolError::Poisoned`] and both it and its source should be
/// discarded. Transport errors such as read timeouts leave the buffered
/// bytes intact.
///
/// # Examples
///
/// ```no_run
/// use wiresock::{
///     FrameDecoder,
///     Transport,
///     codec::{IdentityBuilder, LengthPrefixedDecoder},
/// };
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = Transport::tcp("127.0.0.1", 7878).await?;
/// let mut frames = FrameDecoder::new(transport, LengthPrefixedDecoder::default(), IdentityBuilder);
/// let payload = frames.next().await?;
/// println!("received {} bytes", payload.len());
/// # Ok(())
/// # }
/// ```
pub struct FrameDecoder<D, B, S = Transport> {
    source: S,
    decoder: D,
    builder: B,
    buffer: StreamBuffer,
    poisoned: bool,
}

impl<D, B, S> FrameDecoder<D, B, S>
where
    D: Decoder,
    B: MessageBuilder<D::Value>,
    S: ByteSource,
{
    /// Wrap `source`, framing its bytes with `decoder` and building messages
    /// with `builder`.
    #[must_use]
    pub fn new(source: S, decoder: D, builder: B) -> Self {
        Self {
            source,
            decoder,
            builder,
            buffer: StreamBuffer::default(),
            poisoned: false,
        }
    }

    /// Return the next message.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::ConnectionLost`] if the stream ends while a
    /// frame is incomplete, [`FrameError::Protocol`] if the decoder or
    /// builder rejects the stream, and [`FrameError::Transport`] if a read
    /// fails.
    pub async fn next(&mut self) -> Result<B::Message, FrameError> { self.next_with_id(None).await }

    /// Return the next message, passing `correlation_id` to the builder.
    ///
    /// # Errors
    ///
    /// See [`FrameDecoder::next`].
    pub async fn next_with_id(
        &mut self,
        correlation_id: Option<u64>,
    ) -> Result<B::Message, FrameError> {
        if self.poisoned {
            return Err(ProtocolError::Poisoned.into());
        }
        let result = self.decode_next(correlation_id).await;
        match &result {
            Ok(_) => metrics::inc_frames(),
            Err(err) => {
                if matches!(err, FrameError::Protocol(_)) {
                    self.poisoned = true;
                }
                metrics::inc_errors(err.kind());
            }
        }
        result
    }

    /// Return the first message accepted by `predicate`, discarding the rest.
    ///
    /// # Errors
    ///
    /// See [`FrameDecoder::next`].
    pub async fn next_matching<P>(&mut self, mut predicate: P) -> Result<B::Message, FrameError>
    where
        P: FnMut(&B::Message) -> bool,
    {
        loop {
            let message = self.next().await?;
            if predicate(&message) {
                return Ok(message);
            }
            trace!("discarding message rejected by filter");
        }
    }

    /// Messages as a stream that ends after the first error.
    pub fn messages(&mut self) -> impl Stream<Item = Result<B::Message, FrameError>> + '_ {
        futures::stream::unfold((self, false), |(frames, done)| async move {
            if done {
                return None;
            }
            let item = frames.next().await;
            let done = item.is_err();
            Some((item, (frames, done)))
        })
    }

    async fn decode_next(&mut self, correlation_id: Option<u64>) -> Result<B::Message, FrameError> {
        if self.buffer.is_empty() {
            self.fill().await?;
        }
        if !self.buffer.has_staged() {
            self.buffer.promote();
        }
        loop {
            match self.decoder.decode(self.buffer.staged()) {
                DecodeOutcome::Decoded { value, consumed } => {
                    self.buffer.consume(consumed)?;
                    trace!(consumed, buffered = self.buffer.len(), "frame decoded");
                    if !self.buffer.has_staged() {
                        self.peek().await;
                    }
                    return self
                        .builder
                        .build(value, correlation_id)
                        .map_err(|err| ProtocolError::Build(err.into()).into());
                }
                DecodeOutcome::Partial => {
                    if !self.buffer.has_ingest() {
                        self.fill().await?;
                    }
                    self.buffer.promote();
                }
                DecodeOutcome::Malformed(detail) => {
                    return Err(ProtocolError::Malformed(detail).into());
                }
            }
        }
    }

    /// Block until the source yields bytes or closes.
    async fn fill(&mut self) -> Result<(), FrameError> {
        match self.source.read(ReadMode::Blocking).await? {
            ReadOutcome::Data(bytes) => {
                self.buffer.push(&bytes);
                Ok(())
            }
            ReadOutcome::WouldBlock => Ok(()),
            ReadOutcome::Closed => Err(FrameError::ConnectionLost),
        }
    }

    /// Collect whatever is already readable without waiting.
    async fn peek(&mut self) {
        match self.source.read(ReadMode::NonBlocking).await {
            Ok(ReadOutcome::Data(bytes)) => self.buffer.push(&bytes),
            Ok(ReadOutcome::WouldBlock | ReadOutcome::Closed) => {}
            Err(err) => trace!(error = %err, "opportunistic read failed"),
        }
    }
}

impl<D, B, S> FrameDecoder<D, B, S> {
    /// Bytes read but not yet consumed by a decoded frame.
    #[must_use]
    pub fn buffered_len(&self) -> usize { self.buffer.len() }

    /// Whether an earlier protocol error made this decoder unusable.
    #[must_use]
    pub fn is_poisoned(&self) -> bool { self.poisoned }

    /// Borrow the underlying source.
    #[must_use]
    pub fn source(&self) -> &S { &self.source }

    /// Mutably borrow the underlying source, for example to write requests.
    pub fn source_mut(&mut self) -> &mut S { &mut self.source }

    /// Consume the decoder, returning the source. Buffered bytes are lost.
    #[must_use]
    pub fn into_source(self) -> S { self.source }
}
