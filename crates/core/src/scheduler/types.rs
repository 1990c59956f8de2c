//! Types for the scheduler module.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::converter::{ConversionProgress, ConversionTask};

/// Why a task was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The destination file already exists.
    AlreadyExists,
    /// An earlier task in this batch targets the same destination.
    DuplicateDestination,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists => f.write_str("output already exists"),
            Self::DuplicateDestination => f.write_str("destination claimed by another file"),
        }
    }
}

/// Terminal state of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The transcoder exited successfully.
    Converted {
        output_size_bytes: u64,
        duration_ms: u64,
    },
    /// Not dispatched.
    Skipped { reason: SkipReason },
    /// Preparation or transcoding failed.
    Failed { reason: String },
}

impl TaskOutcome {
    /// Creates a failed outcome.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Whether the task converted.
    pub fn is_converted(&self) -> bool {
        matches!(self, Self::Converted { .. })
    }

    /// Whether the task failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Final counts of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Tasks converted.
    pub converted: u64,
    /// Tasks skipped.
    pub skipped: u64,
    /// Tasks failed.
    pub failed: u64,
}

impl BatchResult {
    /// Total number of tasks accounted for.
    pub fn total(&self) -> u64 {
        self.converted + self.skipped + self.failed
    }

    /// Whether no task failed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} converted, {} skipped, {} failed",
            self.converted, self.skipped, self.failed
        )
    }
}

/// Progress stream of a batch, consumed by a single renderer.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// Discovery finished.
    Discovered { total: usize },
    /// A task holds a worker slot and its source was probed.
    TaskStarted {
        task: ConversionTask,
        total_secs: u64,
    },
    /// A running task advanced.
    TaskProgress(ConversionProgress),
    /// A task reached a terminal state, including skips.
    TaskFinished {
        task: ConversionTask,
        outcome: TaskOutcome,
    },
}
