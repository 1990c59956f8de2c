//! Streaming archive download with integrity checks.

use futures::StreamExt;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::error::ProvisionError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Emit a progress update every this many bytes.
const PROGRESS_THRESHOLD: u64 = 256 * 1024;

/// Upper bound on the buffer reserved up front from a declared length.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Transfer progress for one download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadProgress {
    pub url: String,
    pub downloaded: u64,
    /// Declared Content-Length, if the server sent one.
    pub total: Option<u64>,
}

/// HTTP downloader for tool archives.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    /// Creates a downloader with the default client settings.
    pub fn new() -> Result<Self, ProvisionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("metronome/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProvisionError::download("<client>", e))?;
        Ok(Self { client })
    }

    /// Creates a downloader around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Downloads `url` into memory and verifies it against `expected_checksum`.
    ///
    /// The bytes are only returned when the transfer is complete and the
    /// SHA-256 digest matches.
    pub async fn download(
        &self,
        url: &str,
        expected_checksum: &str,
        progress_tx: Option<&mpsc::Sender<DownloadProgress>>,
    ) -> Result<Vec<u8>, ProvisionError> {
        info!(url, "Downloading");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProvisionError::download(url, e))?;

        let declared = response.content_length();
        let mut bytes = Vec::with_capacity(declared.map_or(0, |n| n.min(MAX_PREALLOCATION)) as usize);
        let mut last_reported = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProvisionError::download(url, e))?;
            bytes.extend_from_slice(&chunk);

            let downloaded = bytes.len() as u64;
            if downloaded - last_reported >= PROGRESS_THRESHOLD {
                report(progress_tx, url, downloaded, declared);
                last_reported = downloaded;
            }
        }

        let received = bytes.len() as u64;
        if last_reported != received {
            report(progress_tx, url, received, declared);
        }

        check_length(url, declared, received)?;
        verify_checksum(url, &bytes, expected_checksum)?;

        debug!(url, bytes = received, "Download verified");
        Ok(bytes)
    }
}

fn report(
    progress_tx: Option<&mpsc::Sender<DownloadProgress>>,
    url: &str,
    downloaded: u64,
    total: Option<u64>,
) {
    if let Some(tx) = progress_tx {
        // Best effort: a full or closed channel never stalls the transfer.
        let _ = tx.try_send(DownloadProgress {
            url: url.to_string(),
            downloaded,
            total,
        });
    }
}

/// Returns the lowercase hex SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Fails unless the received byte count matches the declared length.
///
/// A missing or zero Content-Length disables the check.
pub fn check_length(url: &str, declared: Option<u64>, received: u64) -> Result<(), ProvisionError> {
    match declared {
        Some(expected) if expected != 0 && expected != received => {
            Err(ProvisionError::SizeMismatch {
                url: url.to_string(),
                expected,
                actual: received,
            })
        }
        _ => Ok(()),
    }
}

/// Fails unless `bytes` hash to `expected` (hex, case-insensitive).
pub fn verify_checksum(url: &str, bytes: &[u8], expected: &str) -> Result<(), ProvisionError> {
    let actual = sha256_hex(bytes);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(ProvisionError::ChecksumMismatch {
            url: url.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}
