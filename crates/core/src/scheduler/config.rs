//! Configuration for the scheduler module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::converter::OutputFormat;

/// Extensions discovered when no extras are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "flac", "wav", "aiff", "aif", "ape", "wv", "m4a", "ogg", "wma",
];

/// Configuration for a conversion batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum concurrent transcodes. Never below 1.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Output codec profile.
    #[serde(default)]
    pub format: OutputFormat,

    /// Extensions discovered in addition to [`DEFAULT_EXTENSIONS`].
    #[serde(default)]
    pub extra_extensions: Vec<String>,
}

/// Number of CPUs, or 1 when it cannot be determined.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            format: OutputFormat::default(),
            extra_extensions: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    /// Sets the worker count, clamped to at least 1.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the extra extensions.
    pub fn with_extra_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Effective worker count.
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    /// Normalised set of extensions to discover.
    pub fn extensions(&self) -> BTreeSet<String> {
        DEFAULT_EXTENSIONS
            .iter()
            .map(|e| e.to_string())
            .chain(
                self.extra_extensions
                    .iter()
                    .filter_map(|e| normalize_extension(e)),
            )
            .collect()
    }
}

/// Trims, strips a leading dot and lower-cases. Empty input yields `None`.
pub fn normalize_extension(raw: &str) -> Option<String> {
    let ext = raw.trim().trim_start_matches('.').trim();
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Splits a comma-separated extension list.
pub fn parse_extension_list(raw: &str) -> Vec<String> {
    raw.split(',').filter_map(normalize_extension).collect()
}
