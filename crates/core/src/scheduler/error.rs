//! Error types for the scheduler module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a batch before any task is dispatched.
///
/// Per-task problems are never errors; they become
/// [`TaskOutcome::Failed`](super::TaskOutcome::Failed).
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Input root is missing or not a directory.
    #[error("Input directory not found: {path}")]
    InputNotFound { path: PathBuf },

    /// A root resolves outside the allowed base.
    #[error("Unsafe root path: {path}")]
    UnsafeRoot { path: PathBuf },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
