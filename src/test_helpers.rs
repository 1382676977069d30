#![cfg(test)]
//! Scripted byte sources for exercising the framing loop without sockets.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::TransportError,
    transport::{ByteSource, ReadMode, ReadOutcome},
};

/// One scripted reaction of a [`ScriptedSource`].
#[derive(Clone, Debug)]
pub(crate) enum Step {
    /// Bytes that arrive only when the reader blocks for them.
    Chunk(Bytes),
    /// Bytes already buffered, visible to non-blocking reads too.
    Ready(Bytes),
    /// The peer closed the connection.
    Closed,
    /// A blocking read times out.
    Timeout,
}

impl Step {
    pub(crate) fn chunk(bytes: impl AsRef<[u8]>) -> Self {
        Self::Chunk(Bytes::copy_from_slice(bytes.as_ref()))
    }

    pub(crate) fn ready(bytes: impl AsRef<[u8]>) -> Self {
        Self::Ready(Bytes::copy_from_slice(bytes.as_ref()))
    }
}

/// Byte source replaying a fixed script and counting reads per mode.
///
/// Blocking reads pop the next step; an exhausted script reads as closed.
/// Non-blocking reads only consume [`Step::Ready`] steps and otherwise
/// report [`ReadOutcome::WouldBlock`].
#[derive(Debug, Default)]
pub(crate) struct ScriptedSource {
    steps: VecDeque<Step>,
    pub(crate) blocking_reads: usize,
    pub(crate) nonblocking_reads: usize,
}

impl ScriptedSource {
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Script where each chunk must be waited for.
    pub(crate) fn chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self::new(chunks.into_iter().map(Step::chunk))
    }

    pub(crate) fn remaining(&self) -> usize { self.steps.len() }
}

#[async_trait]
impl ByteSource for ScriptedSource {
    async fn read(&mut self, mode: ReadMode) -> Result<ReadOutcome, TransportError> {
        match mode {
            ReadMode::Blocking => {
                self.blocking_reads += 1;
                match self.steps.pop_front() {
                    Some(Step::Chunk(bytes) | Step::Ready(bytes)) => Ok(ReadOutcome::Data(bytes)),
                    Some(Step::Closed) | None => Ok(ReadOutcome::Closed),
                    Some(Step::Timeout) => Err(TransportError::ReadTimeout(
                        std::time::Duration::from_secs(15),
                    )),
                }
            }
            ReadMode::NonBlocking => {
                self.nonblocking_reads += 1;
                if let Some(Step::Ready(_)) = self.steps.front() {
                    if let Some(Step::Ready(bytes)) = self.steps.pop_front() {
                        return Ok(ReadOutcome::Data(bytes));
                    }
                }
                Ok(ReadOutcome::WouldBlock)
            }
        }
    }
}
