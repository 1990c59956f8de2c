//! Testing utilities and mock implementations.
//!
//! This module provides a mock [`Converter`](crate::converter::Converter) so
//! the scheduler can be exercised without ffmpeg installed, plus small
//! fixtures for building input trees.
//!
//! # Example
//!
//! ```rust,ignore
//! use metronome_core::testing::{fixtures, MockConverter};
//!
//! let input = tempfile::TempDir::new()?;
//! fixtures::audio_tree(input.path(), &["a.flac", "Album/01.wav"]);
//!
//! let converter = MockConverter::new();
//! converter.set_probe_duration(input.path().join("a.flac"), 42.0).await;
//! ```

mod mock_converter;

pub use mock_converter::{MockConverter, RecordedConversion};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    /// Placeholder content for fake source files.
    pub const FAKE_AUDIO: &[u8] = b"fLaC\0\0\0\x22";

    /// Creates each relative path under `root` with placeholder content.
    ///
    /// Panics on I/O errors; intended for tests only.
    pub fn audio_tree(root: &Path, files: &[&str]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|relative| {
                let path = root.join(relative);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).expect("create fixture directory");
                }
                std::fs::write(&path, FAKE_AUDIO).expect("write fixture file");
                path
            })
            .collect()
    }
}
