//! The external dyld shared cache extractor.
//!
//! Xcode ships the extractor as a loadable bundle exporting
//! `dyld_shared_cache_extract_dylibs_progress`. Callers only see the
//! [`CacheExtractor`] trait; how the bundle is found and loaded stays in
//! [`DylibLoader`].

#[cfg(target_os = "macos")]
mod dylib;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::progress::ProgressReporter;

/// Location of the extractor bundle relative to the active developer directory.
pub const BUNDLE_SUBPATH: &str = "Platforms/iPhoneOS.platform/usr/lib/dsc_extractor.bundle";

/// Exported symbol performing the extraction.
pub const EXTRACT_SYMBOL: &str = "dyld_shared_cache_extract_dylibs_progress";

const XCODE_SELECT: &str = "/usr/bin/xcode-select";

/// Splits a shared cache into individual images under `output`.
///
/// There is no return value: the native routine reports nothing beyond
/// progress, so a run that silently does nothing is indistinguishable from
/// success.
pub trait CacheExtractor: Send + Sync {
    fn extract(&self, cache: &Path, output: &Path, progress: ProgressReporter);
}

/// Resolves a [`CacheExtractor`] before any work starts.
#[async_trait]
pub trait ExtractorLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn CacheExtractor>>;
}

/// Loads the extractor bundle from an explicit path, or from the active
/// Xcode when none is given.
#[derive(Debug, Clone, Default)]
pub struct DylibLoader {
    path: Option<PathBuf>,
}

impl DylibLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// The bundle path to load, running `xcode-select -p` when no path was
    /// configured.
    pub async fn resolve_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }

        let output = Command::new(XCODE_SELECT)
            .arg("-p")
            .output()
            .await
            .map_err(|e| Error::ExtractorUnavailable(format!("{}: {}", XCODE_SELECT, e)))?;
        if !output.status.success() {
            return Err(Error::ExtractorUnavailable(format!(
                "{} -p exited with {}",
                XCODE_SELECT, output.status
            )));
        }

        let developer_dir = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("developer directory: {}", developer_dir);
        Ok(bundle_path(Path::new(&developer_dir)))
    }
}

/// Extractor bundle inside a developer directory.
pub fn bundle_path(developer_dir: &Path) -> PathBuf {
    developer_dir.join(BUNDLE_SUBPATH)
}

#[async_trait]
impl ExtractorLoader for DylibLoader {
    async fn load(&self) -> Result<Arc<dyn CacheExtractor>> {
        let path = self.resolve_path().await?;
        info!("Loading extractor from {}", path.display());
        load_bundle(&path)
    }
}

#[cfg(target_os = "macos")]
fn load_bundle(path: &Path) -> Result<Arc<dyn CacheExtractor>> {
    Ok(Arc::new(dylib::DylibExtractor::open(path)?))
}

#[cfg(not(target_os = "macos"))]
fn load_bundle(path: &Path) -> Result<Arc<dyn CacheExtractor>> {
    Err(Error::ExtractorUnavailable(format!(
        "{}: the extractor bundle can only be loaded on macOS",
        path.display()
    )))
}
