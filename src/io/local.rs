use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use futures_util::stream;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{ByteStream, Position, SeekableSource};
use crate::error::{Error, Result};

const CHUNK_SIZE: usize = 64 * 1024;

/// Local file with random access support
pub struct FileSource {
    file: File,
    position: Position,
}

impl FileSource {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok(Self {
            file,
            position: Position::new(size),
        })
    }
}

#[async_trait]
impl SeekableSource for FileSource {
    fn position(&self) -> &Position {
        &self.position
    }

    fn position_mut(&mut self) -> &mut Position {
        &mut self.position
    }

    async fn stream(&mut self) -> Result<ByteStream<'_>> {
        let start = self.position.offset;
        let expected = self.position.remaining();
        if expected > 0 {
            self.file.seek(SeekFrom::Start(start)).await?;
        }

        let inner = stream::unfold(
            (&mut self.file, expected),
            |(file, left)| async move {
                if left == 0 {
                    return None;
                }
                let mut buf = BytesMut::zeroed(CHUNK_SIZE.min(left as usize));
                match file.read(&mut buf).await {
                    Ok(0) => None,
                    Ok(n) => {
                        buf.truncate(n);
                        Some((Ok(Bytes::from(buf)), (file, left - n as u64)))
                    }
                    Err(e) => Some((Err(Error::from(e)), (file, 0))),
                }
            },
        )
        .boxed();

        Ok(ByteStream::new(inner, &mut self.position, start, expected))
    }
}
