//! Error types for the dependency provisioner.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while acquiring an external tool.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The host operating system has no descriptor column.
    #[error("{os} is not supported")]
    UnsupportedPlatform { os: String },

    /// The descriptor file could not be read.
    #[error("Failed to read dependency descriptors from {path}: {reason}")]
    DescriptorFile { path: PathBuf, reason: String },

    /// The descriptor JSON is malformed.
    #[error("Malformed dependency descriptors: {reason}")]
    DescriptorParse { reason: String },

    /// No descriptor for this tool on this platform.
    #[error("No download descriptor for {tool} on {platform}")]
    MissingDescriptor { tool: String, platform: String },

    /// Transport failure or non-success HTTP status.
    #[error("Failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    /// Received byte count differs from the declared Content-Length.
    #[error("Incomplete download of {url}: expected {expected} bytes, received {actual}")]
    SizeMismatch {
        url: String,
        expected: u64,
        actual: u64,
    },

    /// Downloaded bytes do not hash to the expected digest.
    #[error("{url} checksums do not match! Please obtain from a trusted source. Expected: {expected} Found: {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    /// The archive container format was not recognized.
    #[error("Unable to extract {url}, please obtain it manually")]
    UnrecognizedArchive { url: String },

    /// An archive entry would be written outside the tool directory.
    #[error("Blocked path traversal attempt: {entry} resolves to {target}")]
    PathTraversal { entry: String, target: PathBuf },

    /// The archive could not be read or did not contain the wanted executables.
    #[error("Archive error: {reason}")]
    Archive { reason: String },

    /// I/O error while writing extracted files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    /// Creates a new download error.
    pub fn download(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Download {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a new archive error.
    pub fn archive(reason: impl ToString) -> Self {
        Self::Archive {
            reason: reason.to_string(),
        }
    }

    /// Whether this error indicates tampered or malicious input.
    pub fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::PathTraversal { .. }
        )
    }
}

impl From<zip::result::ZipError> for ProvisionError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::archive(err)
    }
}
