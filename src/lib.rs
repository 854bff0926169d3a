//! # dscify
//!
//! Extract the dyld shared cache from Apple firmware and split it into
//! individual images.
//!
//! Firmware archives (ipsw files) are ZIP containers holding several
//! gigabytes of disk images, of which only one is needed. The archive is read
//! through a [`SeekableSource`], so an ipsw on a web server is parsed with a
//! handful of HTTP Range requests and only the system image is downloaded.
//!
//! ## Features
//!
//! - Seekable sources over memory, local files, and HTTP URLs
//! - ZIP/ZIP64 central directory lookup with CRC-32 checked extraction
//! - Build manifest lookup of the SystemOS cryptex image
//! - Mount, extract, unmount with cleanup on every failure path
//! - Progress from the native extractor published on a watch channel
//!
//! ## Example
//!
//! ```no_run
//! use dscify::{MemorySource, ZipArchive};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let data = std::fs::read("firmware.ipsw")?;
//!     let mut archive = ZipArchive::new(MemorySource::new(data));
//!
//!     if let Some(entry) = archive.locate("BuildManifest.plist").await? {
//!         let manifest = archive.extract_to_memory(&entry).await?;
//!         println!("{} bytes", manifest.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod download;
pub mod error;
pub mod extractor;
pub mod io;
pub mod manifest;
pub mod mount;
pub mod pipeline;
pub mod progress;
pub mod zip;

pub use cli::Cli;
pub use error::{Error, Result};
pub use extractor::{CacheExtractor, DylibLoader, ExtractorLoader};
pub use io::{ByteStream, FileSource, MemorySource, OffsetTracker, RemoteSource, SeekableSource};
pub use mount::{Hdiutil, ImageMounter};
pub use pipeline::{ExtractionPipeline, PipelineConfig, PipelineError, PipelineReport, State};
pub use progress::{ProgressBridge, ProgressReporter, ProgressSnapshot};
pub use zip::{ArchiveEntry, ZipArchive};
