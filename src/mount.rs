//! Disk image attach/detach.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use crate::error::{Error, Result};

const HDIUTIL: &str = "/usr/bin/hdiutil";

#[async_trait]
pub trait ImageMounter: Send + Sync {
    /// Mount `image` at `mount_point`. Failing to mount is fatal.
    async fn attach(&self, image: &Path, mount_point: &Path) -> Result<()>;

    /// Unmount whatever is mounted at `mount_point`.
    async fn detach(&self, mount_point: &Path) -> Result<()>;
}

/// `hdiutil` backed mounter.
#[derive(Debug, Clone)]
pub struct Hdiutil {
    program: PathBuf,
}

impl Hdiutil {
    pub fn new() -> Self {
        Self::with_program(HDIUTIL)
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn attach_args(image: &Path, mount_point: &Path) -> Vec<String> {
        vec![
            "attach".to_string(),
            image.display().to_string(),
            "-mountpoint".to_string(),
            mount_point.display().to_string(),
            "-nobrowse".to_string(),
        ]
    }
}

impl Default for Hdiutil {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageMounter for Hdiutil {
    async fn attach(&self, image: &Path, mount_point: &Path) -> Result<()> {
        let args = Self::attach_args(image, mount_point);
        debug!("{} {}", self.program.display(), args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| Error::MountFailed {
                image: image.to_path_buf(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::MountFailed {
                image: image.to_path_buf(),
                reason: format!(
                    "{} ({})",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }

    async fn detach(&self, mount_point: &Path) -> Result<()> {
        debug!("{} detach {}", self.program.display(), mount_point.display());
        let status = Command::new(&self.program)
            .arg("detach")
            .arg(mount_point)
            .status()
            .await?;

        if !status.success() {
            return Err(Error::Io(std::io::Error::other(format!(
                "detach {} exited with {}",
                mount_point.display(),
                status
            ))));
        }
        Ok(())
    }
}
