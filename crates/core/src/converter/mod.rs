//! Converter module for transcoding audio files.
//!
//! This module provides the `Converter` trait and an FFmpeg implementation
//! that runs one ffmpeg process per file, probing the source duration first
//! and turning ffmpeg's `key=value` progress stream into monotonic updates.
//!
//! # Example
//!
//! ```ignore
//! use metronome_core::converter::{Converter, ConverterConfig, ConversionTask, FfmpegConverter, OutputFormat};
//!
//! let converter = FfmpegConverter::new(ConverterConfig::resolve(Path::new("bin")));
//! converter.validate().await?;
//!
//! let info = converter.probe(Path::new("/music/in.flac")).await?;
//! let task = ConversionTask::new("/music/in.flac".into(), "/out/in.mp3".into(), OutputFormat::Mp3);
//! let (tx, rx) = tokio::sync::mpsc::channel(64);
//! let result = converter.convert_with_progress(&task, info.duration_whole_secs(), tx).await?;
//! println!("Converted in {} ms", result.duration_ms);
//! ```

mod config;
mod error;
mod ffmpeg;
mod progress;
mod traits;
mod types;

pub use config::ConverterConfig;
pub use error::ConverterError;
pub use ffmpeg::FfmpegConverter;
pub use progress::{ProgressEvent, ProgressState};
pub use traits::Converter;
pub use types::{
    truncate_name, ConversionProgress, ConversionResult, ConversionTask, MediaInfo, OutputFormat,
    MAX_DISPLAY_NAME,
};
