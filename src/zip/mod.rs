//! ZIP archive parsing and extraction.
//!
//! Entries are located through the central directory, so finding and
//! extracting one file never requires reading its siblings. Combined with
//! [`RemoteSource`](crate::io::RemoteSource) this lets a few megabytes be
//! pulled out of a multi-gigabyte firmware image on a web server.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from a seekable source
//! - [`extractor`]: Entry lookup and checksummed extraction
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED (no compression) method
//! - DEFLATE compression method
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod extractor;
mod parser;
mod structures;

pub use extractor::ZipArchive;
pub use structures::*;
