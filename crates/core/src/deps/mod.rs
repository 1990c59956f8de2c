//! Dependency provisioner for external tool binaries.
//!
//! On first run the transcoder and fingerprinting tools may be missing. This
//! module downloads the archive named by a [`DependencyDescriptor`], verifies
//! its SHA-256 digest, and extracts only the wanted executables into a tool
//! directory, rejecting any archive entry that would land outside it.
//!
//! # Example
//!
//! ```ignore
//! use metronome_core::deps::{DescriptorTable, Platform, Provisioner, Tool};
//!
//! let table = DescriptorTable::builtin()?;
//! let provisioner = Provisioner::new(table, Platform::detect()?, "bin".into())?;
//! provisioner.ensure(Tool::Ffmpeg, None).await?;
//! ```

mod archive;
mod download;
mod error;
mod provisioner;
mod types;

pub use archive::{extract, ArchiveFormat, ArchiveMember, ArchiveReader, TarReader, ZipReader};
pub use download::{check_length, sha256_hex, verify_checksum, DownloadProgress, Downloader};
pub use error::ProvisionError;
pub use provisioner::{local_executable, locate_executable, ProvisionStatus, Provisioner};
pub use types::{DependencyDescriptor, DescriptorTable, Platform, Tool};
