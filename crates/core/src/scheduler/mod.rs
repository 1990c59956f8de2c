//! Batch scheduler for conversion tasks.
//!
//! Discovery walks the input root in a stable order and builds one
//! [`ConversionTask`](crate::converter::ConversionTask) per wanted file. The
//! [`BatchScheduler`] then skips tasks whose output already exists and runs
//! the rest with at most `workers` conversions in flight. Every task ends as
//! converted, skipped or failed; a failing task never stops the batch.
//!
//! # Example
//!
//! ```ignore
//! use metronome_core::scheduler::{BatchScheduler, SchedulerConfig};
//!
//! let scheduler = BatchScheduler::new(SchedulerConfig::default().with_workers(4), converter);
//! let result = scheduler.run_directory(Path::new("input"), Path::new("output"), None).await?;
//! println!("{}", result);
//! ```

mod config;
mod discovery;
mod error;
mod pipeline;
mod types;

pub use config::{
    default_workers, normalize_extension, parse_extension_list, SchedulerConfig,
    DEFAULT_EXTENSIONS,
};
pub use discovery::discover_tasks;
pub use error::SchedulerError;
pub use pipeline::BatchScheduler;
pub use types::{BatchEvent, BatchResult, SkipReason, TaskOutcome};
