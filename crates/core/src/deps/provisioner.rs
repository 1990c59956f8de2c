//! Provisioning orchestration: lookup, download, verify, extract.

use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::archive::extract;
use super::download::{DownloadProgress, Downloader};
use super::error::ProvisionError;
use super::types::{DescriptorTable, Platform, Tool};

/// Finds an executable, preferring a system-installed copy over one in `bin_dir`.
pub fn locate_executable(name: &str, bin_dir: &Path) -> Option<PathBuf> {
    if let Ok(path) = which::which(name) {
        return Some(path);
    }

    let local = local_executable(name, bin_dir);
    local.is_file().then_some(local)
}

/// Path an executable would have inside `bin_dir` on this host.
pub fn local_executable(name: &str, bin_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        bin_dir.join(format!("{}.exe", name))
    } else {
        bin_dir.join(name)
    }
}

/// How a tool was made available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStatus {
    /// Every executable was already resolvable.
    AlreadyAvailable,
    /// The archive was downloaded and these files were installed.
    Installed(Vec<PathBuf>),
}

/// Ensures external tools exist, fetching them on first run.
pub struct Provisioner {
    table: DescriptorTable,
    platform: Platform,
    bin_dir: PathBuf,
    downloader: Downloader,
}

impl Provisioner {
    /// Creates a provisioner for the given platform and tool directory.
    pub fn new(table: DescriptorTable, platform: Platform, bin_dir: PathBuf) -> Result<Self, ProvisionError> {
        Ok(Self {
            table,
            platform,
            bin_dir,
            downloader: Downloader::new()?,
        })
    }

    /// Replaces the downloader.
    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = downloader;
        self
    }

    /// The directory tools are extracted into.
    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Whether every executable of `tool` can already be found.
    pub fn is_available(&self, tool: Tool) -> bool {
        tool.executables()
            .iter()
            .all(|name| locate_executable(name, &self.bin_dir).is_some())
    }

    /// Downloads and installs `tool` unless it is already available.
    pub async fn ensure(
        &self,
        tool: Tool,
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Result<ProvisionStatus, ProvisionError> {
        if self.is_available(tool) {
            debug!(%tool, "Tool already available");
            return Ok(ProvisionStatus::AlreadyAvailable);
        }

        let descriptor = self.table.lookup(tool, self.platform)?;
        info!(%tool, platform = %self.platform, url = %descriptor.url, "Provisioning tool");

        let archive = self
            .downloader
            .download(&descriptor.url, &descriptor.checksum, progress_tx.as_ref())
            .await?;
        drop(progress_tx);

        let bin_dir = self.bin_dir.clone();
        let written = tokio::task::spawn_blocking(move || {
            extract(&archive, &bin_dir, tool.executables())
        })
        .await
        .map_err(ProvisionError::archive)??;

        let Some(written) = written else {
            return Err(ProvisionError::UnrecognizedArchive {
                url: descriptor.url,
            });
        };

        let missing: Vec<&str> = tool
            .executables()
            .iter()
            .copied()
            .filter(|name| !local_executable(name, &self.bin_dir).is_file())
            .collect();
        if !missing.is_empty() {
            return Err(ProvisionError::archive(format!(
                "{} not found in {}",
                missing.join(", "),
                descriptor.url
            )));
        }

        info!(%tool, files = written.len(), "Tool installed");
        Ok(ProvisionStatus::Installed(written))
    }
}
