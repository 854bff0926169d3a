//! Seekable byte sources.
//!
//! Archive parsing needs random access, but a firmware image may be a
//! multi-gigabyte file on a web server. [`SeekableSource`] hides where the
//! bytes live: seeking only moves a cursor, and [`SeekableSource::stream`]
//! lazily delivers bytes from that cursor onwards. Every byte handed out by a
//! [`ByteStream`] moves the cursor forward by one, so callers can interleave
//! seeks and reads freely.
//!
//! Three backends are provided:
//!
//! - [`MemorySource`]: an in-memory buffer
//! - [`FileSource`]: a local file
//! - [`RemoteSource`]: an HTTP URL read with `Range: bytes=<offset>-` requests

mod http;
mod local;
mod memory;
mod stream;

pub use http::RemoteSource;
pub use local::FileSource;
pub use memory::MemorySource;
pub use stream::ByteStream;

use async_trait::async_trait;

use crate::error::Result;

/// Receives notice of bytes consumed through a [`ByteStream`].
pub trait OffsetTracker: Send {
    fn advance(&mut self, n: u64);
}

/// Cursor shared by all backends.
///
/// `offset` may be set past `len`; streaming from there yields nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub offset: u64,
    pub len: u64,
}

impl Position {
    pub fn new(len: u64) -> Self {
        Self { offset: 0, len }
    }

    /// Bytes left between the cursor and the end of the source.
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.offset)
    }
}

impl OffsetTracker for Position {
    fn advance(&mut self, n: u64) {
        self.offset += n;
    }
}

/// A byte source with a movable cursor.
///
/// Streaming borrows the source mutably, so a second stream cannot be opened
/// on the same instance while the first one is alive.
#[async_trait]
pub trait SeekableSource: Send {
    fn position(&self) -> &Position;

    fn position_mut(&mut self) -> &mut Position;

    /// Open a lazy stream starting exactly at the current offset.
    async fn stream(&mut self) -> Result<ByteStream<'_>>;

    fn len(&self) -> u64 {
        self.position().len
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn offset(&self) -> u64 {
        self.position().offset
    }

    fn seek(&mut self, offset: u64) {
        self.position_mut().offset = offset;
    }

    fn seek_to_end(&mut self) -> u64 {
        let position = self.position_mut();
        position.offset = position.len;
        position.offset
    }
}

/// Fill `buf` with the bytes starting at `offset`.
pub async fn read_exact_at<S>(source: &mut S, offset: u64, buf: &mut [u8]) -> Result<()>
where
    S: SeekableSource + ?Sized,
{
    if buf.is_empty() {
        return Ok(());
    }
    source.seek(offset);
    let mut stream = source.stream().await?;
    stream.read_exact(buf).await
}
