use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;

use super::OffsetTracker;
use crate::error::{Error, Result};

/// Lazy, single-pass byte stream opened by a [`SeekableSource`](super::SeekableSource).
///
/// Chunks arrive from the backend as they become available. Only the bytes
/// returned to the caller advance the owner's offset; whatever is still
/// buffered when the stream is dropped is simply discarded.
pub struct ByteStream<'a> {
    inner: BoxStream<'a, Result<Bytes>>,
    pending: Bytes,
    tracker: &'a mut dyn OffsetTracker,
    start: u64,
    expected: u64,
    delivered: u64,
}

impl<'a> ByteStream<'a> {
    /// Wrap `inner`, which must produce `expected` bytes starting at `start`.
    pub fn new(
        inner: BoxStream<'a, Result<Bytes>>,
        tracker: &'a mut dyn OffsetTracker,
        start: u64,
        expected: u64,
    ) -> Self {
        Self {
            inner,
            pending: Bytes::new(),
            tracker,
            start,
            expected,
            delivered: 0,
        }
    }

    /// Bytes handed out so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Return up to `max` bytes, or `None` once the source is exhausted.
    pub async fn next_chunk(&mut self, max: usize) -> Result<Option<Bytes>> {
        if max == 0 {
            return Ok(Some(Bytes::new()));
        }

        while self.pending.is_empty() {
            match self.inner.next().await {
                Some(chunk) => self.pending = chunk?,
                None => {
                    if self.delivered < self.expected {
                        return Err(self.truncated(self.expected));
                    }
                    return Ok(None);
                }
            }
        }

        let n = max.min(self.pending.len());
        let chunk = self.pending.split_to(n);
        self.delivered += n as u64;
        self.tracker.advance(n as u64);
        Ok(Some(chunk))
    }

    pub async fn next_byte(&mut self) -> Result<Option<u8>> {
        Ok(self.next_chunk(1).await?.map(|chunk| chunk[0]))
    }

    /// Read up to `buf.len()` bytes, returning how many were written.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.next_chunk(buf.len()).await? {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => Ok(0),
        }
    }

    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(self.truncated(self.delivered - filled as u64 + buf.len() as u64));
            }
            filled += n;
        }
        Ok(())
    }

    fn truncated(&self, expected: u64) -> Error {
        Error::TruncatedRead {
            offset: self.start,
            expected,
            received: self.delivered,
        }
    }
}
