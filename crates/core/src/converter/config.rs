//! Configuration for the converter module.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::deps::locate_executable;

/// Configuration for the FFmpeg-based converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// FFmpeg log level passed to both ffmpeg and ffprobe.
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_log_level() -> String {
    "error".to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            ffmpeg_log_level: default_log_level(),
        }
    }
}

impl ConverterConfig {
    /// Creates a new config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    /// Resolves both executables, preferring system copies over ones in `bin_dir`.
    ///
    /// Unresolvable names stay bare so that spawning reports a not-found error.
    pub fn resolve(bin_dir: &Path) -> Self {
        let ffmpeg_path = locate_executable("ffmpeg", bin_dir).unwrap_or_else(default_ffmpeg_path);
        let ffprobe_path =
            locate_executable("ffprobe", bin_dir).unwrap_or_else(default_ffprobe_path);
        Self::with_paths(ffmpeg_path, ffprobe_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::local_executable;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ConverterConfig::default();
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.ffprobe_path, PathBuf::from("ffprobe"));
        assert_eq!(config.ffmpeg_log_level, "error");
    }

    #[test]
    fn test_resolve_uses_local_copy_when_no_system_copy() {
        let bin = TempDir::new().unwrap();
        std::fs::write(local_executable("ffprobe", bin.path()), b"stub").unwrap();

        let config = ConverterConfig::resolve(bin.path());
        if which::which("ffprobe").is_err() {
            assert_eq!(config.ffprobe_path, local_executable("ffprobe", bin.path()));
        }
        if which::which("ffmpeg").is_err() {
            assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        }
    }

    #[test]
    fn test_config_serialization() {
        let config = ConverterConfig::with_paths(
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffprobe"),
        );
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ConverterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.ffmpeg_path, config.ffmpeg_path);
        assert_eq!(parsed.ffprobe_path, config.ffprobe_path);
    }
}
