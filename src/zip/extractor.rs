use std::io::Write;
use std::path::Path;

use crc32fast::Hasher;
use flate2::write::DeflateDecoder;
use log::debug;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::io::SeekableSource;

use super::parser::ZipParser;
use super::structures::{ArchiveEntry, CompressionMethod};

/// Largest piece of compressed data pulled from the source at once.
const CHUNK_SIZE: usize = 256 * 1024;

/// ZIP archive over a seekable source.
///
/// The central directory is read on first use and cached. Extracting an
/// entry reads only that entry's local header and data.
pub struct ZipArchive<S: SeekableSource> {
    parser: ZipParser<S>,
    entries: Option<Vec<ArchiveEntry>>,
}

impl<S: SeekableSource> ZipArchive<S> {
    pub fn new(source: S) -> Self {
        Self {
            parser: ZipParser::new(source),
            entries: None,
        }
    }

    /// All entries in central directory order.
    pub async fn entries(&mut self) -> Result<&[ArchiveEntry]> {
        if self.entries.is_none() {
            self.entries = Some(self.parser.list_files().await?);
        }
        Ok(self.entries.as_deref().unwrap_or_default())
    }

    /// Find the entry stored under exactly `path`.
    ///
    /// An unreadable archive is an error; a readable archive without the
    /// entry is `Ok(None)`.
    pub async fn locate(&mut self, path: &str) -> Result<Option<ArchiveEntry>> {
        Ok(self
            .entries()
            .await?
            .iter()
            .find(|e| e.path == path)
            .cloned())
    }

    /// Stream the entry's uncompressed bytes into `sink`, returning the
    /// CRC-32 of what was written.
    ///
    /// The checksum is not compared here; see [`ArchiveEntry::verify`].
    pub async fn extract<W>(&mut self, entry: &ArchiveEntry, sink: &mut W) -> Result<u32>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let method = entry.compression_method;
        if let CompressionMethod::Unknown(m) = method {
            return Err(Error::UnsupportedCompression(m));
        }

        let data_offset = self.parser.get_data_offset(entry).await?;
        debug!(
            "extracting {} ({} -> {} bytes) from offset {}",
            entry.path, entry.compressed_size, entry.size, data_offset
        );

        let source = self.parser.source_mut();
        source.seek(data_offset);
        let mut stream = source.stream().await?;

        let mut hasher = Hasher::new();
        let mut inflater = match method {
            CompressionMethod::Deflate => Some(DeflateDecoder::new(Vec::new())),
            _ => None,
        };

        let mut remaining = entry.compressed_size;
        while remaining > 0 {
            let want = CHUNK_SIZE.min(remaining as usize);
            let chunk = match stream.next_chunk(want).await? {
                Some(chunk) => chunk,
                None => {
                    return Err(Error::TruncatedRead {
                        offset: data_offset,
                        expected: entry.compressed_size,
                        received: entry.compressed_size - remaining,
                    });
                }
            };
            remaining -= chunk.len() as u64;

            match inflater.as_mut() {
                Some(decoder) => {
                    decoder.write_all(&chunk)?;
                    let out = std::mem::take(decoder.get_mut());
                    hasher.update(&out);
                    sink.write_all(&out).await?;
                }
                None => {
                    hasher.update(&chunk);
                    sink.write_all(&chunk).await?;
                }
            }
        }

        if let Some(decoder) = inflater {
            let out = decoder.finish()?;
            hasher.update(&out);
            sink.write_all(&out).await?;
        }
        sink.flush().await?;

        Ok(hasher.finalize())
    }

    /// Extract file data to memory, checking its checksum.
    pub async fn extract_to_memory(&mut self, entry: &ArchiveEntry) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(entry.size.min(64 * 1024 * 1024) as usize);
        let checksum = self.extract(entry, &mut buf).await?;
        entry.verify(checksum)?;
        Ok(buf)
    }

    /// Extract file to disk, checking its checksum.
    ///
    /// The output file is left in place on failure; the caller owns it.
    pub async fn extract_to_file(&mut self, entry: &ArchiveEntry, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = fs::File::create(output_path).await?;
        let checksum = self.extract(entry, &mut file).await?;
        entry.verify(checksum)
    }

    pub fn source_mut(&mut self) -> &mut S {
        self.parser.source_mut()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::MemorySource;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn build(files: &[(&str, &[u8], zip::CompressionMethod)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data, method) in files {
            writer
                .start_file(*name, SimpleFileOptions::default().compression_method(*method))
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn test_locate_and_extract() {
        let text = b"the quick brown fox jumps over the lazy dog ".repeat(100);
        let bytes = build(&[
            ("a.txt", &b"alpha"[..], zip::CompressionMethod::Stored),
            ("dir/b.txt", &text[..], zip::CompressionMethod::Deflated),
        ]);
        let mut archive = ZipArchive::new(MemorySource::new(bytes));

        assert_eq!(archive.entries().await.unwrap().len(), 2);
        assert!(archive.locate("b.txt").await.unwrap().is_none());

        let a = archive.locate("a.txt").await.unwrap().unwrap();
        assert_eq!(archive.extract_to_memory(&a).await.unwrap(), b"alpha");

        let b = archive.locate("dir/b.txt").await.unwrap().unwrap();
        assert_eq!(b.compression_method, CompressionMethod::Deflate);
        assert_eq!(b.size, text.len() as u64);
        assert_eq!(archive.extract_to_memory(&b).await.unwrap(), text);
    }

    #[tokio::test]
    async fn test_flipped_byte_fails_checksum() {
        let payload = b"payload-that-will-be-damaged";
        let mut bytes = build(&[("img.dmg", &payload[..], zip::CompressionMethod::Stored)]);
        let at = bytes
            .windows(payload.len())
            .position(|w| w == payload)
            .unwrap();
        bytes[at + 3] ^= 0xFF;

        let mut archive = ZipArchive::new(MemorySource::new(bytes));
        let entry = archive.locate("img.dmg").await.unwrap().unwrap();
        assert!(matches!(
            archive.extract_to_memory(&entry).await,
            Err(Error::CorruptArchive { .. })
        ));
    }

    #[tokio::test]
    async fn test_not_a_zip() {
        let mut archive = ZipArchive::new(MemorySource::new(vec![0u8; 100]));
        assert!(matches!(
            archive.locate("anything").await,
            Err(Error::InvalidArchive(_))
        ));
    }
}
