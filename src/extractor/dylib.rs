use std::ffi::{CString, c_char, c_uint};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use block2::RcBlock;
use libloading::Library;
use log::error;

use super::{CacheExtractor, EXTRACT_SYMBOL};
use crate::error::{Error, Result};
use crate::progress::ProgressReporter;

type ExtractFn = unsafe extern "C" fn(
    cache: *const c_char,
    output: *const c_char,
    progress: &block2::Block<dyn Fn(c_uint, c_uint)>,
);

/// Extractor backed by the Xcode bundle.
pub struct DylibExtractor {
    extract: ExtractFn,
    // Keeps `extract` valid.
    _library: Library,
}

impl DylibExtractor {
    pub fn open(path: &Path) -> Result<Self> {
        // SAFETY: loading runs the bundle's initializers; the bundle is Apple's
        // extractor resolved from the caller's configuration or Xcode.
        let library = unsafe { Library::new(path) }
            .map_err(|e| Error::ExtractorUnavailable(e.to_string()))?;

        let mut symbol = Vec::from(EXTRACT_SYMBOL.as_bytes());
        symbol.push(0);
        // SAFETY: the signature matches the exported function.
        let extract = unsafe { library.get::<ExtractFn>(&symbol) }
            .map(|f| *f)
            .map_err(|e| {
                Error::ExtractorUnavailable(format!("could not find {}: {}", EXTRACT_SYMBOL, e))
            })?;

        Ok(Self {
            extract,
            _library: library,
        })
    }
}

impl CacheExtractor for DylibExtractor {
    fn extract(&self, cache: &Path, output: &Path, progress: ProgressReporter) {
        let (cache, output) = match (
            CString::new(cache.as_os_str().as_bytes()),
            CString::new(output.as_os_str().as_bytes()),
        ) {
            (Ok(cache), Ok(output)) => (cache, output),
            _ => {
                error!("paths passed to the extractor may not contain NUL bytes");
                return;
            }
        };

        let block = RcBlock::new(move |current: c_uint, total: c_uint| {
            progress.report(current, total);
        });

        // SAFETY: both strings and the block outlive the call.
        unsafe { (self.extract)(cache.as_ptr(), output.as_ptr(), &block) };
    }
}
