//! Error types and the related `Result<T>`

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The remote server did not report a definite content length.
    #[error("Remote server did not return Content-Length")]
    UnknownLength,

    /// A source delivered fewer bytes than its length implies, or the
    /// server refused the range request.
    #[error("Truncated read at offset {offset}: expected {expected} bytes, received {received}")]
    TruncatedRead {
        offset: u64,
        expected: u64,
        received: u64,
    },

    /// An extracted entry did not match the checksum in the central directory.
    #[error("Corrupt archive: bad checksum for {path} (expected {expected:#010x}, got {actual:#010x})")]
    CorruptArchive {
        path: String,
        expected: u32,
        actual: u32,
    },

    #[error("Invalid IPSW: could not locate {0}")]
    ManifestNotFound(String),

    #[error("Malformed build manifest: {0}")]
    MalformedManifest(#[from] plist::Error),

    #[error("Could not find {0} image path in build manifest")]
    ImagePathNotFound(String),

    #[error("Image {0} was not found in archive")]
    ImageNotInArchive(String),

    #[error("Mounting {image} failed: {reason}")]
    MountFailed { image: PathBuf, reason: String },

    #[error("Could not load extractor: {0}")]
    ExtractorUnavailable(String),

    /// The extraction call did not return normally.
    #[error("Extractor aborted: {0}")]
    ExtractorAborted(String),

    /// The ZIP container is not well formed.
    #[error("Invalid Zip archive: {0}")]
    InvalidArchive(&'static str),

    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
