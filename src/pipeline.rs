//! Firmware archive to extracted shared cache.
//!
//! A run walks these states in order:
//!
//! ```text
//! Init -> ManifestLocated -> ManifestDecoded -> ImagePathResolved
//!      -> ImageExtracted -> Mounted -> Extracted -> Unmounted -> CleanedUp
//! ```
//!
//! Any stage may fail. Once the image has been written to the scratch
//! location it is removed on every way out, and once the image is mounted it
//! is detached on every way out. Cleanup failures are logged; the error the
//! caller sees is always the first one.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::fs;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::extractor::{CacheExtractor, ExtractorLoader};
use crate::io::SeekableSource;
use crate::manifest::{BUILD_MANIFEST_PATH, BuildManifest, SYSTEM_OS_COMPONENT};
use crate::mount::ImageMounter;
use crate::progress::{ProgressBridge, ProgressSnapshot, run_extractor};
use crate::zip::{ArchiveEntry, ZipArchive};

/// Shared cache inside the SystemOS image.
pub const DEFAULT_CACHE_SUBPATH: &str =
    "System/Library/Caches/com.apple.dyld/dyld_shared_cache_arm64e";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    ManifestLocated,
    ManifestDecoded,
    ImagePathResolved,
    ImageExtracted,
    Mounted,
    Extracted,
    Unmounted,
    CleanedUp,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Init => "init",
            State::ManifestLocated => "manifest located",
            State::ManifestDecoded => "manifest decoded",
            State::ImagePathResolved => "image path resolved",
            State::ImageExtracted => "image extracted",
            State::Mounted => "mounted",
            State::Extracted => "extracted",
            State::Unmounted => "unmounted",
            State::CleanedUp => "cleaned up",
        };
        f.write_str(name)
    }
}

/// A failed run: the error and the last state reached before it.
#[derive(Debug, thiserror::Error)]
#[error("{error} (after {state})")]
pub struct PipelineError {
    pub state: State,
    #[source]
    pub error: Error,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Output directory; also holds the scratch image and mount point.
    pub destination: PathBuf,
    pub component: String,
    pub image_file_name: String,
    pub mount_dir_name: String,
    /// Path of the shared cache relative to the mount point.
    pub cache_subpath: PathBuf,
}

impl PipelineConfig {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            component: SYSTEM_OS_COMPONENT.to_string(),
            image_file_name: "SystemOS.dmg".to_string(),
            mount_dir_name: "SystemOS".to_string(),
            cache_subpath: PathBuf::from(DEFAULT_CACHE_SUBPATH),
        }
    }

    pub fn image_path(&self) -> PathBuf {
        self.destination.join(&self.image_file_name)
    }

    pub fn mount_point(&self) -> PathBuf {
        self.destination.join(&self.mount_dir_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub state: State,
    pub image_entry: String,
    pub progress: ProgressSnapshot,
    /// Whether the image was detached cleanly.
    pub unmounted: bool,
}

/// Scratch resources of one run.
struct PipelineState {
    scratch_dir: PathBuf,
    image: PathBuf,
    mount_point: PathBuf,
}

/// One-shot extraction run over a firmware archive.
pub struct ExtractionPipeline<'a> {
    config: PipelineConfig,
    mounter: &'a dyn ImageMounter,
    loader: &'a dyn ExtractorLoader,
    progress: ProgressBridge,
    state: State,
}

impl<'a> ExtractionPipeline<'a> {
    pub fn new(
        config: PipelineConfig,
        mounter: &'a dyn ImageMounter,
        loader: &'a dyn ExtractorLoader,
    ) -> Self {
        Self {
            config,
            mounter,
            loader,
            progress: ProgressBridge::new(),
            state: State::Init,
        }
    }

    /// Observe extractor progress. Subscribe before calling [`run`](Self::run).
    pub fn progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    pub async fn run<S: SeekableSource>(
        mut self,
        archive: &mut ZipArchive<S>,
    ) -> std::result::Result<PipelineReport, PipelineError> {
        let extractor = self.loader.load().await.map_err(|e| self.fail(e))?;

        let manifest_entry = archive
            .locate(BUILD_MANIFEST_PATH)
            .await
            .map_err(|e| self.fail(e))?
            .ok_or_else(|| self.fail(Error::ManifestNotFound(BUILD_MANIFEST_PATH.to_string())))?;
        self.advance(State::ManifestLocated);

        let manifest_data = archive
            .extract_to_memory(&manifest_entry)
            .await
            .map_err(|e| self.fail(e))?;
        let manifest = BuildManifest::from_bytes(&manifest_data).map_err(|e| self.fail(e))?;
        self.advance(State::ManifestDecoded);

        let image_entry_path = manifest
            .image_path(&self.config.component)
            .ok_or_else(|| self.fail(Error::ImagePathNotFound(self.config.component.clone())))?
            .to_string();
        self.advance(State::ImagePathResolved);

        let image_entry = archive
            .locate(&image_entry_path)
            .await
            .map_err(|e| self.fail(e))?
            .ok_or_else(|| self.fail(Error::ImageNotInArchive(image_entry_path.clone())))?;

        let scratch = PipelineState {
            scratch_dir: self.config.destination.clone(),
            image: self.config.image_path(),
            mount_point: self.config.mount_point(),
        };

        info!("Unarchiving {}...", image_entry.path);
        let staged = self.stage_image(archive, &image_entry, &scratch, extractor).await;

        remove_scratch_image(&scratch.image).await;
        let (progress, unmounted) = staged?;
        self.advance(State::CleanedUp);

        Ok(PipelineReport {
            state: self.state,
            image_entry: image_entry_path,
            progress,
            unmounted,
        })
    }

    /// Everything from writing the scratch image up to and including
    /// detaching it. The caller removes the scratch image afterwards.
    async fn stage_image<S: SeekableSource>(
        &mut self,
        archive: &mut ZipArchive<S>,
        image_entry: &ArchiveEntry,
        scratch: &PipelineState,
        extractor: Arc<dyn CacheExtractor>,
    ) -> std::result::Result<(ProgressSnapshot, bool), PipelineError> {
        fs::create_dir_all(&scratch.scratch_dir)
            .await
            .map_err(|e| self.fail(e.into()))?;
        archive
            .extract_to_file(image_entry, &scratch.image)
            .await
            .map_err(|e| self.fail(e))?;
        self.advance(State::ImageExtracted);

        info!("Mounting...");
        if let Err(e) = self
            .mounter
            .attach(&scratch.image, &scratch.mount_point)
            .await
        {
            // Nothing is mounted, but the mounter may have created the directory.
            remove_mount_point(&scratch.mount_point).await;
            return Err(self.fail(e));
        }
        self.advance(State::Mounted);

        info!("Expanding cache...");
        let cache = scratch.mount_point.join(&self.config.cache_subpath);
        let bridge = std::mem::take(&mut self.progress);
        let extracted = run_extractor(
            extractor,
            cache,
            self.config.destination.clone(),
            bridge,
        )
        .await;
        if extracted.is_ok() {
            self.advance(State::Extracted);
        }

        info!("Unmounting {}...", self.config.mount_dir_name);
        let unmounted = match self.mounter.detach(&scratch.mount_point).await {
            Ok(()) => {
                remove_mount_point(&scratch.mount_point).await;
                true
            }
            Err(e) => {
                warn!("Failed to unmount {}: {}", scratch.mount_point.display(), e);
                false
            }
        };

        let progress = extracted.map_err(|e| self.fail(e))?;
        self.advance(State::Unmounted);
        Ok((progress, unmounted))
    }

    fn advance(&mut self, next: State) {
        debug!("pipeline: {} -> {}", self.state, next);
        self.state = next;
    }

    fn fail(&self, error: Error) -> PipelineError {
        PipelineError {
            state: self.state,
            error,
        }
    }
}

/// Remove the mount point if it is an empty directory.
async fn remove_mount_point(mount_point: &Path) {
    if let Err(e) = fs::remove_dir(mount_point).await {
        if e.kind() != ErrorKind::NotFound {
            debug!("leaving mount point {}: {}", mount_point.display(), e);
        }
    }
}

async fn remove_scratch_image(image: &Path) {
    match fs::remove_file(image).await {
        Ok(()) => debug!("removed {}", image.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", image.display(), e),
    }
}

/// Empty `dir`, creating it if needed.
pub async fn prepare_destination(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(dir).await?;
    Ok(())
}
