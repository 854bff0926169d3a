use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;

use super::{ByteStream, Position, SeekableSource};
use crate::error::{Error, Result};

/// In-memory buffer presented as a seekable source.
pub struct MemorySource {
    data: Bytes,
    position: Position,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let position = Position::new(data.len() as u64);
        Self { data, position }
    }
}

#[async_trait]
impl SeekableSource for MemorySource {
    fn position(&self) -> &Position {
        &self.position
    }

    fn position_mut(&mut self) -> &mut Position {
        &mut self.position
    }

    async fn stream(&mut self) -> Result<ByteStream<'_>> {
        let start = self.position.offset;
        let expected = self.position.remaining();
        let tail = if expected == 0 {
            Bytes::new()
        } else {
            self.data.slice(start as usize..)
        };

        let inner = stream::once(async move { Ok::<_, Error>(tail) }).boxed();
        Ok(ByteStream::new(inner, &mut self.position, start, expected))
    }
}
