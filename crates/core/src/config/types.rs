use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::converter::OutputFormat;
use crate::scheduler::{default_workers, SchedulerConfig};

/// Merged settings for one run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    /// Directory holding the original files; its layout is mirrored.
    #[serde(default = "default_input")]
    pub input: PathBuf,
    /// Directory receiving converted files.
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Output codec profile.
    #[serde(default)]
    pub format: OutputFormat,
    /// Maximum concurrent transcodes.
    #[serde(default = "default_workers")]
    pub threads: usize,
    /// Extensions discovered in addition to the defaults.
    #[serde(default)]
    pub extra_extensions: Vec<String>,
    /// Directory provisioned tools are installed into.
    #[serde(default = "default_bin_dir")]
    pub bin_dir: PathBuf,
    /// Descriptor file replacing the built-in table.
    #[serde(default)]
    pub descriptors: Option<PathBuf>,
    /// Log filter directive, e.g. `warn` or `metronome_core=debug`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: default_output(),
            format: OutputFormat::default(),
            threads: default_workers(),
            extra_extensions: Vec::new(),
            bin_dir: default_bin_dir(),
            descriptors: None,
            log_level: default_log_level(),
        }
    }
}

fn default_input() -> PathBuf {
    PathBuf::from("input")
}

fn default_output() -> PathBuf {
    PathBuf::from("output")
}

fn default_bin_dir() -> PathBuf {
    PathBuf::from("bin")
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Settings {
    /// Scheduler configuration derived from these settings.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_workers(self.threads)
            .with_format(self.format)
            .with_extra_extensions(self.extra_extensions.iter().cloned())
    }
}

/// Values given explicitly on the command line. Unset fields are not merged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SettingsOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_extensions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptors: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}
