//! FFmpeg-based converter implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::progress::ProgressState;
use super::traits::Converter;
use super::types::{ConversionProgress, ConversionResult, ConversionTask, MediaInfo};

/// Longest stderr excerpt kept in a failure.
const MAX_STDERR_BYTES: usize = 4096;

/// FFmpeg-based converter implementation.
pub struct FfmpegConverter {
    config: ConverterConfig,
}

impl FfmpegConverter {
    /// Creates a new FFmpeg converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Builds ffmpeg arguments: `-y -i <input> <profile> <output>`.
    fn build_args(task: &ConversionTask) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), task.source.clone().into()];
        args.extend(task.format.codec_args().iter().map(OsString::from));
        args.push(task.destination.clone().into());
        args
    }

    /// Parses ffprobe JSON output into MediaInfo.
    ///
    /// The duration comes from the first stream, falling back to the container.
    fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, ConverterError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            #[serde(default)]
            format: Option<ProbeFormat>,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            duration: Option<String>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| ConverterError::ParseError {
                reason: format!("Failed to parse ffprobe output: {}", e),
            })?;

        let parse = |d: &String| d.trim().parse::<f64>().ok().filter(|v| v.is_finite());

        let duration_secs = probe
            .streams
            .first()
            .and_then(|s| s.duration.as_ref())
            .and_then(parse)
            .or_else(|| {
                probe
                    .format
                    .as_ref()
                    .and_then(|f| f.duration.as_ref())
                    .and_then(parse)
            })
            .ok_or_else(|| ConverterError::probe_failed("no duration reported"))?;

        Ok(MediaInfo {
            path: path.to_path_buf(),
            duration_secs,
        })
    }

    /// Runs the conversion with optional progress reporting.
    async fn run_conversion(
        &self,
        task: &ConversionTask,
        total_secs: u64,
        progress_tx: Option<mpsc::Sender<ConversionProgress>>,
    ) -> Result<ConversionResult, ConverterError> {
        let start = Instant::now();

        if !tokio::fs::try_exists(&task.source).await.unwrap_or(false) {
            return Err(ConverterError::InputNotFound {
                path: task.source.clone(),
            });
        }

        let args = Self::build_args(task);
        debug!(source = %task.source.display(), args = ?args, "Spawning ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConverterError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    ConverterError::Io(e)
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConverterError::conversion_failed("stdout not captured", None))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConverterError::conversion_failed("stderr not captured", None))?;

        let read_progress = async {
            let mut reader = BufReader::new(stdout).lines();
            let mut state = ProgressState::new();
            while let Ok(Some(line)) = reader.next_line().await {
                trace!(line = %line, "ffmpeg progress");
                let Some(advanced_by) = state.feed_line(&line) else {
                    continue;
                };
                if let Some(ref tx) = progress_tx {
                    let progress = ConversionProgress {
                        source: task.source.clone(),
                        position_secs: state.position_secs(),
                        total_secs,
                        advanced_by,
                        speed: state.speed().map(str::to_string),
                    };
                    // Non-blocking send
                    let _ = tx.try_send(progress);
                }
            }
        };

        let ((), stderr_output) = tokio::join!(read_progress, collect_stderr(stderr));
        let status = child.wait().await?;

        if !status.success() {
            return Err(ConverterError::conversion_failed(
                format!("FFmpeg exited with {}", status),
                (!stderr_output.is_empty()).then_some(stderr_output),
            ));
        }

        let output_meta = tokio::fs::metadata(&task.destination)
            .await
            .map_err(|_| ConverterError::conversion_failed("Output file not created", None))?;

        Ok(ConversionResult {
            source: task.source.clone(),
            destination: task.destination.clone(),
            output_size_bytes: output_meta.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Reads a child's stderr to the end, keeping at most [`MAX_STDERR_BYTES`].
async fn collect_stderr<R: AsyncRead + Unpin>(mut stderr: R) -> String {
    let mut kept = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = MAX_STDERR_BYTES.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    String::from_utf8_lossy(&kept).trim().to_string()
}

#[async_trait]
impl Converter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConverterError> {
        if !path.exists() {
            return Err(ConverterError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-show_format",
                "-show_streams",
                "-print_format",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConverterError::FfprobeNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    ConverterError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(ConverterError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(path, &stdout)
    }

    async fn convert(&self, task: &ConversionTask) -> Result<ConversionResult, ConverterError> {
        self.run_conversion(task, 0, None).await
    }

    async fn convert_with_progress(
        &self,
        task: &ConversionTask,
        total_secs: u64,
        progress_tx: mpsc::Sender<ConversionProgress>,
    ) -> Result<ConversionResult, ConverterError> {
        self.run_conversion(task, total_secs, Some(progress_tx)).await
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        let ffmpeg_result = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await;

        if let Err(e) = ffmpeg_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(ConverterError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                });
            }
            return Err(ConverterError::Io(e));
        }

        let ffprobe_result = Command::new(&self.config.ffprobe_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await;

        if let Err(e) = ffprobe_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(ConverterError::FfprobeNotFound {
                    path: self.config.ffprobe_path.clone(),
                });
            }
            return Err(ConverterError::Io(e));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::types::OutputFormat;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn task(format: OutputFormat) -> ConversionTask {
        ConversionTask::new(
            PathBuf::from("/music/in.flac"),
            PathBuf::from(format!("/out/in.{}", format.extension())),
            format,
        )
    }

    #[test]
    fn test_build_args_mp3() {
        let args = FfmpegConverter::build_args(&task(OutputFormat::Mp3));

        assert_eq!(args[0], "-y");
        assert_eq!(args[1], "-i");
        assert_eq!(args[2], "/music/in.flac");
        assert!(args.contains(&OsString::from("320k")));
        assert!(args.contains(&OsString::from("-id3v2_version")));
        assert_eq!(args.last().unwrap(), "/out/in.mp3");
    }

    #[test]
    fn test_build_args_opus() {
        let args = FfmpegConverter::build_args(&task(OutputFormat::Opus));

        assert!(args.contains(&OsString::from("libopus")));
        assert!(args.contains(&OsString::from("384k")));
        assert!(!args.contains(&OsString::from("-id3v2_version")));
        assert_eq!(args.last().unwrap(), "/out/in.opus");
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "format": { "filename": "test.flac", "duration": "999.0" },
            "streams": [
                { "codec_type": "audio", "codec_name": "flac", "duration": "180.5" }
            ]
        }"#;

        let info = FfmpegConverter::parse_probe_output(Path::new("test.flac"), json).unwrap();
        assert!((info.duration_secs - 180.5).abs() < 0.01);
        assert_eq!(info.duration_whole_secs(), 181);
    }

    #[test]
    fn test_parse_probe_output_falls_back_to_format() {
        let json = r#"{
            "format": { "duration": "42.0" },
            "streams": [ { "codec_type": "audio" } ]
        }"#;

        let info = FfmpegConverter::parse_probe_output(Path::new("a.wma"), json).unwrap();
        assert!((info.duration_secs - 42.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_probe_output_without_duration() {
        let json = r#"{ "streams": [] }"#;
        let err = FfmpegConverter::parse_probe_output(Path::new("a.wav"), json).unwrap_err();
        assert!(matches!(err, ConverterError::ProbeFailed { .. }));

        let err = FfmpegConverter::parse_probe_output(Path::new("a.wav"), "not json").unwrap_err();
        assert!(matches!(err, ConverterError::ParseError { .. }));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_reported() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.flac");
        std::fs::write(&input, b"fLaC").unwrap();

        let converter = FfmpegConverter::new(ConverterConfig::with_paths(
            dir.path().join("no-such-ffmpeg"),
            dir.path().join("no-such-ffprobe"),
        ));
        let task = ConversionTask::new(input.clone(), dir.path().join("in.mp3"), OutputFormat::Mp3);

        let err = converter.convert(&task).await.unwrap_err();
        assert!(matches!(err, ConverterError::FfmpegNotFound { .. }));

        let err = converter.probe(&input).await.unwrap_err();
        assert!(matches!(err, ConverterError::FfprobeNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_input_is_reported() {
        let converter = FfmpegConverter::with_defaults();
        let task = task(OutputFormat::Mp3);
        let err = converter.convert(&task).await.unwrap_err();
        assert!(matches!(err, ConverterError::InputNotFound { .. }));
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_streams_monotonic_progress() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = script(
            dir.path(),
            "ffmpeg",
            "for last; do :; done\n\
             printf 'out_time_us=N/A\\nout_time_us=2000000\\nspeed=1.5x\\nprogress=continue\\n'\n\
             printf 'out_time_us=1000000\\nbroken line\\nout_time_us=5000000\\nprogress=end\\n'\n\
             printf 'ID3' > \"$last\"",
        );
        let input = dir.path().join("song.flac");
        std::fs::write(&input, b"fLaC").unwrap();

        let converter = FfmpegConverter::new(ConverterConfig::with_paths(ffmpeg, "ffprobe".into()));
        let task = ConversionTask::new(input, dir.path().join("song.mp3"), OutputFormat::Mp3);
        let (tx, mut rx) = mpsc::channel(16);

        let result = converter.convert_with_progress(&task, 5, tx).await.unwrap();
        assert_eq!(result.output_size_bytes, 3);

        let mut positions = Vec::new();
        while let Some(progress) = rx.recv().await {
            assert_eq!(progress.total_secs, 5);
            positions.push((progress.position_secs, progress.advanced_by));
        }
        assert_eq!(positions, vec![(2, 2), (5, 3)]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_nonzero_exit_fails_with_stderr() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = script(dir.path(), "ffmpeg", "echo 'Invalid data found' >&2\nexit 3");
        let input = dir.path().join("bad.flac");
        std::fs::write(&input, b"junk").unwrap();

        let converter = FfmpegConverter::new(ConverterConfig::with_paths(ffmpeg, "ffprobe".into()));
        let task = ConversionTask::new(input, dir.path().join("bad.mp3"), OutputFormat::Mp3);

        match converter.convert(&task).await.unwrap_err() {
            ConverterError::ConversionFailed { stderr, .. } => {
                assert_eq!(stderr.as_deref(), Some("Invalid data found"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_reads_first_stream_duration() {
        let dir = TempDir::new().unwrap();
        let ffprobe = script(
            dir.path(),
            "ffprobe",
            r#"echo '{"streams":[{"duration":"61.4"}],"format":{"duration":"70.0"}}'"#,
        );
        let input = dir.path().join("a.flac");
        std::fs::write(&input, b"fLaC").unwrap();

        let converter = FfmpegConverter::new(ConverterConfig::with_paths("ffmpeg".into(), ffprobe));
        let info = converter.probe(&input).await.unwrap();
        assert_eq!(info.duration_whole_secs(), 61);
    }
}
