//! Tracing setup that cooperates with the progress display.

use anyhow::{Context, Result};
use indicatif::MultiProgress;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Writes log lines to stderr with the progress bars hidden for the duration
/// of the write, so bars and log lines never interleave.
#[derive(Clone)]
pub struct ProgressWriter {
    multi: MultiProgress,
}

impl ProgressWriter {
    pub fn new(multi: MultiProgress) -> Self {
        Self { multi }
    }
}

impl<'a> MakeWriter<'a> for ProgressWriter {
    type Writer = SuspendingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendingWriter {
            multi: self.multi.clone(),
            buf: Vec::new(),
        }
    }
}

/// Buffers one formatted event and emits it on flush or drop.
pub struct SuspendingWriter {
    multi: MultiProgress,
    buf: Vec<u8>,
}

impl Write for SuspendingWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let buf = std::mem::take(&mut self.buf);
        self.multi.suspend(|| {
            let mut stderr = io::stderr().lock();
            stderr.write_all(&buf)?;
            stderr.flush()
        })
    }
}

impl Drop for SuspendingWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Maps the level names accepted on the command line to a filter directive.
fn directive(level: &str) -> &str {
    match level.trim() {
        "log" => "info",
        other => other,
    }
}

/// Whether a global subscriber is receiving events.
pub fn is_installed() -> bool {
    tracing::dispatcher::has_been_set()
}

/// Installs the global subscriber. `RUST_LOG` wins over `level`.
pub fn init(level: &str, log_file: Option<&Path>, multi: &MultiProgress) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directive(level))
            .with_context(|| format!("Invalid log level: {}", level))?,
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(ProgressWriter::new(multi.clone())))
        .with(file_layer)
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_maps_log_to_info() {
        assert_eq!(directive("log"), "info");
        assert_eq!(directive(" debug "), "debug");
        assert_eq!(directive("metronome_core=trace"), "metronome_core=trace");
    }

    #[test]
    fn test_unopenable_log_file_leaves_no_subscriber() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let path = std::env::temp_dir()
            .join("metronome-missing-dir")
            .join("nested")
            .join("metronome.log");

        let err = init("warn", Some(&path), &multi).unwrap_err();
        assert!(err.to_string().contains("Failed to open log file"));
        assert!(!is_installed());
    }

    #[test]
    fn test_writer_buffers_until_flush() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let writer = ProgressWriter::new(multi);
        let mut w = writer.make_writer();
        w.write_all(b"partial").unwrap();
        assert_eq!(w.buf, b"partial");
        w.flush().unwrap();
        assert!(w.buf.is_empty());
    }
}
