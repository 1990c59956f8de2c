//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Longest file name shown on a progress line before truncation.
pub const MAX_DISPLAY_NAME: usize = 40;

/// Output codec profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// MPEG Audio Layer III at 320 kbit/s with ID3v2.3 tags.
    #[default]
    Mp3,
    /// Opus at 384 kbit/s VBR.
    Opus,
}

impl OutputFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
        }
    }

    /// Returns the ffmpeg codec arguments for this profile.
    ///
    /// Both profiles copy source metadata, request a `key=value` progress
    /// stream on stdout and limit logging to errors.
    pub fn codec_args(&self) -> &'static [&'static str] {
        match self {
            Self::Mp3 => &[
                "-ab",
                "320k",
                "-vcodec",
                "copy",
                "-map_metadata",
                "0",
                "-id3v2_version",
                "3",
                "-progress",
                "pipe:1",
                "-loglevel",
                "error",
                "-f",
                "mp3",
            ],
            Self::Opus => &[
                "-c:a",
                "libopus",
                "-b:a",
                "384k",
                "-vbr",
                "on",
                "-compression_level",
                "10",
                "-map_metadata",
                "0",
                "-progress",
                "pipe:1",
                "-loglevel",
                "error",
                "-f",
                "opus",
            ],
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "opus" => Ok(Self::Opus),
            other => Err(format!("unsupported output format '{}' (expected mp3 or opus)", other)),
        }
    }
}

/// One file to transcode. Never mutated after discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionTask {
    /// Source file; identifies the task.
    pub source: PathBuf,
    /// Destination file, already carrying the output extension.
    pub destination: PathBuf,
    /// Codec profile.
    pub format: OutputFormat,
}

impl ConversionTask {
    /// Creates a task.
    pub fn new(source: PathBuf, destination: PathBuf, format: OutputFormat) -> Self {
        Self {
            source,
            destination,
            format,
        }
    }

    /// File name of the destination.
    pub fn output_name(&self) -> String {
        file_name_of(&self.destination)
    }

    /// Source file name shortened for progress lines.
    pub fn display_name(&self) -> String {
        truncate_name(&file_name_of(&self.source), MAX_DISPLAY_NAME)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Shortens `name` to at most `max` characters, ending in `...` when cut.
pub fn truncate_name(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        return name.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = name.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Information about a media file, as reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    /// File path.
    pub path: PathBuf,
    /// Duration of the first stream in seconds.
    pub duration_secs: f64,
}

impl MediaInfo {
    /// Duration rounded to whole seconds, used to size progress bars.
    pub fn duration_whole_secs(&self) -> u64 {
        if self.duration_secs.is_finite() && self.duration_secs > 0.0 {
            self.duration_secs.round() as u64
        } else {
            0
        }
    }
}

/// Progress update during a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionProgress {
    /// Source file of the task.
    pub source: PathBuf,
    /// Seconds of output written so far. Never decreases within a task.
    pub position_secs: u64,
    /// Probed duration in whole seconds.
    pub total_secs: u64,
    /// Increase since the previous update.
    pub advanced_by: u64,
    /// Processing speed as reported by ffmpeg (e.g. "1.5x").
    pub speed: Option<String>,
}

/// Result of a successful conversion.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    /// Source file.
    pub source: PathBuf,
    /// Written file.
    pub destination: PathBuf,
    /// Output file size in bytes.
    pub output_size_bytes: u64,
    /// Conversion wall-clock time in milliseconds.
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_extension() {
        assert_eq!(OutputFormat::Mp3.extension(), "mp3");
        assert_eq!(OutputFormat::Opus.extension(), "opus");
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("mp3".parse::<OutputFormat>().unwrap(), OutputFormat::Mp3);
        assert_eq!(".OPUS".parse::<OutputFormat>().unwrap(), OutputFormat::Opus);
        assert!("flac".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_codec_args_request_progress() {
        for format in [OutputFormat::Mp3, OutputFormat::Opus] {
            let args = format.codec_args();
            let pos = args.iter().position(|a| *a == "-progress").unwrap();
            assert_eq!(args[pos + 1], "pipe:1");
            assert!(args.windows(2).any(|w| w == ["-loglevel", "error"]));
            assert!(args.windows(2).any(|w| w == ["-map_metadata", "0"]));
            assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == format.extension()));
        }
    }

    #[test]
    fn test_mp3_profile() {
        let args = OutputFormat::Mp3.codec_args();
        assert!(args.windows(2).any(|w| w == ["-ab", "320k"]));
        assert!(args.windows(2).any(|w| w == ["-id3v2_version", "3"]));
    }

    #[test]
    fn test_opus_profile() {
        let args = OutputFormat::Opus.codec_args();
        assert!(args.windows(2).any(|w| w == ["-c:a", "libopus"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "384k"]));
        assert!(args.windows(2).any(|w| w == ["-compression_level", "10"]));
    }

    #[test]
    fn test_format_serde_lowercase() {
        let json = serde_json::to_string(&OutputFormat::Opus).unwrap();
        assert_eq!(json, "\"opus\"");
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("short.flac", 40), "short.flac");
        let long = "a".repeat(50);
        let cut = truncate_name(&long, 40);
        assert_eq!(cut.chars().count(), 40);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_name(&"b".repeat(40), 40), "b".repeat(40));
    }

    #[test]
    fn test_truncate_name_multibyte() {
        let name = "日本語".repeat(20);
        let cut = truncate_name(&name, 40);
        assert_eq!(cut.chars().count(), 40);
    }

    #[test]
    fn test_task_names() {
        let task = ConversionTask::new(
            PathBuf::from("/in/album/01 - Intro.flac"),
            PathBuf::from("/out/album/01 - Intro.mp3"),
            OutputFormat::Mp3,
        );
        assert_eq!(task.display_name(), "01 - Intro.flac");
        assert_eq!(task.output_name(), "01 - Intro.mp3");
    }

    #[test]
    fn test_duration_whole_secs() {
        let info = MediaInfo {
            path: PathBuf::from("x.flac"),
            duration_secs: 180.6,
        };
        assert_eq!(info.duration_whole_secs(), 181);

        let unknown = MediaInfo {
            path: PathBuf::from("x.flac"),
            duration_secs: f64::NAN,
        };
        assert_eq!(unknown.duration_whole_secs(), 0);
    }
}
