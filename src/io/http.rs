use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use log::{debug, warn};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{ByteStream, Position, SeekableSource};
use crate::error::{Error, Result};

/// Remote file read with HTTP Range requests.
///
/// Seeking is free. Every call to [`SeekableSource::stream`] issues one
/// `GET` with `Range: bytes=<offset>-`, and the body is consumed only as far
/// as the caller reads it.
pub struct RemoteSource {
    client: Client,
    url: String,
    position: Position,
    transferred_bytes: Arc<AtomicU64>,
}

impl RemoteSource {
    /// Create a new remote source
    ///
    /// This will send a HEAD request to learn the file size
    pub async fn new(url: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Self::with_client(client, url).await
    }

    pub async fn with_client(client: Client, url: String) -> Result<Self> {
        let resp = client.head(&url).send().await?.error_for_status()?;

        let accept_ranges = resp
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");
        if !accept_ranges.contains("bytes") {
            warn!("{} does not advertise byte range support", url);
        }

        let size: u64 = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or(Error::UnknownLength)?;

        debug!("{} is {} bytes", url, size);

        Ok(Self {
            client,
            url,
            position: Position::new(size),
            transferred_bytes: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SeekableSource for RemoteSource {
    fn position(&self) -> &Position {
        &self.position
    }

    fn position_mut(&mut self) -> &mut Position {
        &mut self.position
    }

    async fn stream(&mut self) -> Result<ByteStream<'_>> {
        let start = self.position.offset;
        let expected = self.position.remaining();
        if expected == 0 {
            return Ok(ByteStream::new(
                stream::empty::<Result<Bytes>>().boxed(),
                &mut self.position,
                start,
                0,
            ));
        }

        let range = format!("bytes={}-", start);
        debug!("GET {} {}", self.url, range);
        let resp = self
            .client
            .get(&self.url)
            .header(RANGE, &range)
            .send()
            .await?;

        // A plain 200 is only acceptable when the whole file was asked for.
        let status = resp.status();
        let ranged = status == StatusCode::PARTIAL_CONTENT || (status.is_success() && start == 0);
        if !ranged {
            warn!("{} answered {} to range request {}", self.url, status, range);
            return Err(Error::TruncatedRead {
                offset: start,
                expected,
                received: 0,
            });
        }

        let transferred = Arc::clone(&self.transferred_bytes);
        let mut received = 0u64;
        let inner = resp
            .bytes_stream()
            .map(move |chunk| -> Result<Bytes> {
                match chunk {
                    Ok(chunk) => {
                        received += chunk.len() as u64;
                        transferred.fetch_add(chunk.len() as u64, Ordering::Relaxed);
                        Ok(chunk)
                    }
                    // The connection ended before the advertised body did.
                    Err(e) if e.is_body() || e.is_decode() => {
                        debug!("body ended after {} of {} bytes: {}", received, expected, e);
                        Err(Error::TruncatedRead {
                            offset: start,
                            expected,
                            received,
                        })
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .boxed();

        Ok(ByteStream::new(inner, &mut self.position, start, expected))
    }
}
