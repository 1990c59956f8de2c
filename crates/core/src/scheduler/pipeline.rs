//! Bounded batch scheduler.

use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::converter::{ConversionTask, Converter};

use super::config::SchedulerConfig;
use super::discovery::discover_tasks;
use super::error::SchedulerError;
use super::types::{BatchEvent, BatchResult, SkipReason, TaskOutcome};

/// Buffer for per-task progress before it is forwarded.
const PROGRESS_BUFFER: usize = 32;

/// Counters for one batch. Updated from every worker.
#[derive(Default)]
struct BatchStats {
    active: AtomicU64,
    converted: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl BatchStats {
    fn record(&self, outcome: &TaskOutcome) {
        let counter = match outcome {
            TaskOutcome::Converted { .. } => &self.converted,
            TaskOutcome::Skipped { .. } => &self.skipped,
            TaskOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn to_result(&self) -> BatchResult {
        BatchResult {
            converted: self.converted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Runs conversion tasks with at most `workers` transcodes in flight.
pub struct BatchScheduler<C: Converter> {
    config: SchedulerConfig,
    converter: Arc<C>,
    semaphore: Arc<Semaphore>,
}

impl<C: Converter + 'static> BatchScheduler<C> {
    /// Creates a new scheduler.
    pub fn new(config: SchedulerConfig, converter: C) -> Self {
        Self::with_shared(config, Arc::new(converter))
    }

    /// Creates a scheduler around an already shared converter.
    pub fn with_shared(config: SchedulerConfig, converter: Arc<C>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.worker_count()));
        Self {
            config,
            converter,
            semaphore,
        }
    }

    /// Returns the converter.
    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// Discovers tasks under `input` and runs them.
    pub async fn run_directory(
        &self,
        input: &Path,
        output: &Path,
        events: Option<mpsc::Sender<BatchEvent>>,
    ) -> Result<BatchResult, SchedulerError> {
        let extensions = self.config.extensions();
        let format = self.config.format;
        let (input, output) = (input.to_path_buf(), output.to_path_buf());

        let tasks = tokio::task::spawn_blocking(move || {
            discover_tasks(&input, &output, &extensions, format)
        })
        .await
        .map_err(|e| SchedulerError::Io(std::io::Error::other(e)))??;

        Ok(self.run(tasks, events).await)
    }

    /// Runs every task to a terminal state and returns the final counts.
    ///
    /// Tasks are dispatched in the given order. Dispatch waits for a free
    /// worker slot, so no more than `workers` conversions run at once.
    pub async fn run(
        &self,
        tasks: Vec<ConversionTask>,
        events: Option<mpsc::Sender<BatchEvent>>,
    ) -> BatchResult {
        let stats = Arc::new(BatchStats::default());
        emit(&events, BatchEvent::Discovered { total: tasks.len() }).await;
        info!(
            tasks = tasks.len(),
            workers = self.config.worker_count(),
            format = %self.config.format,
            "Starting batch"
        );

        let mut claimed: HashSet<PathBuf> = HashSet::new();
        let mut workers = JoinSet::new();

        for task in tasks {
            if !claimed.insert(task.destination.clone()) {
                skip(&stats, &events, task, SkipReason::DuplicateDestination).await;
                continue;
            }

            if tokio::fs::try_exists(&task.destination).await.unwrap_or(false) {
                skip(&stats, &events, task, SkipReason::AlreadyExists).await;
                continue;
            }

            if let Some(parent) = task.destination.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    let outcome = TaskOutcome::failed(format!(
                        "failed to create {}: {}",
                        parent.display(),
                        e
                    ));
                    finish(&stats, &events, task, outcome).await;
                    continue;
                }
            }

            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    finish(&stats, &events, task, TaskOutcome::failed("worker pool closed")).await;
                    continue;
                }
            };

            workers.spawn(run_task(
                Arc::clone(&self.converter),
                task,
                events.clone(),
                Arc::clone(&stats),
                permit,
            ));
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Conversion worker did not complete");
                stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        let result = stats.to_result();
        info!(
            converted = result.converted,
            skipped = result.skipped,
            failed = result.failed,
            "Batch finished"
        );
        result
    }
}

/// One worker: probe, convert, forward progress, report.
async fn run_task<C: Converter + 'static>(
    converter: Arc<C>,
    task: ConversionTask,
    events: Option<mpsc::Sender<BatchEvent>>,
    stats: Arc<BatchStats>,
    _permit: OwnedSemaphorePermit,
) {
    let active = stats.active.fetch_add(1, Ordering::Relaxed) + 1;
    debug!(source = %task.source.display(), active, "Worker started");

    let outcome = AssertUnwindSafe(convert_one(converter.as_ref(), &task, &events))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| TaskOutcome::failed("conversion task panicked"));

    if outcome.is_failed() {
        remove_partial_output(&task.destination).await;
    }

    stats.active.fetch_sub(1, Ordering::Relaxed);
    finish(&stats, &events, task, outcome).await;
}

async fn convert_one<C: Converter>(
    converter: &C,
    task: &ConversionTask,
    events: &Option<mpsc::Sender<BatchEvent>>,
) -> TaskOutcome {
    let info = match converter.probe(&task.source).await {
        Ok(info) => info,
        Err(e) => return TaskOutcome::failed(e.to_string()),
    };
    let total_secs = info.duration_whole_secs();

    emit(
        events,
        BatchEvent::TaskStarted {
            task: task.clone(),
            total_secs,
        },
    )
    .await;
    debug!(source = %task.source.display(), total_secs, "Converting");

    let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_BUFFER);
    let forward = async {
        while let Some(progress) = progress_rx.recv().await {
            emit(events, BatchEvent::TaskProgress(progress)).await;
        }
    };

    let (result, ()) = tokio::join!(
        converter.convert_with_progress(task, total_secs, progress_tx),
        forward
    );

    match result {
        Ok(result) => TaskOutcome::Converted {
            output_size_bytes: result.output_size_bytes,
            duration_ms: result.duration_ms,
        },
        Err(e) => TaskOutcome::failed(e.to_string()),
    }
}

async fn skip(
    stats: &BatchStats,
    events: &Option<mpsc::Sender<BatchEvent>>,
    task: ConversionTask,
    reason: SkipReason,
) {
    debug!(source = %task.source.display(), %reason, "Skipping");
    finish(stats, events, task, TaskOutcome::Skipped { reason }).await;
}

async fn finish(
    stats: &BatchStats,
    events: &Option<mpsc::Sender<BatchEvent>>,
    task: ConversionTask,
    outcome: TaskOutcome,
) {
    match &outcome {
        TaskOutcome::Converted { duration_ms, .. } => {
            info!(source = %task.source.display(), duration_ms, "Converted");
        }
        TaskOutcome::Failed { reason } => {
            warn!(source = %task.source.display(), %reason, "Conversion failed");
        }
        TaskOutcome::Skipped { .. } => {}
    }
    stats.record(&outcome);
    emit(events, BatchEvent::TaskFinished { task, outcome }).await;
}

async fn emit(events: &Option<mpsc::Sender<BatchEvent>>, event: BatchEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

async fn remove_partial_output(destination: &Path) {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => debug!(path = %destination.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %destination.display(), error = %e, "Failed to remove partial output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{ConverterError, OutputFormat};
    use crate::testing::MockConverter;
    use std::time::Duration;
    use tempfile::TempDir;

    fn task(dir: &Path, name: &str) -> ConversionTask {
        let source = dir.join(format!("{}.flac", name));
        std::fs::write(&source, b"fLaC").unwrap();
        ConversionTask::new(source, dir.join("out").join(format!("{}.mp3", name)), OutputFormat::Mp3)
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let scheduler = BatchScheduler::new(SchedulerConfig::default(), MockConverter::new());
        let result = scheduler.run(Vec::new(), None).await;
        assert_eq!(result, BatchResult::default());
    }

    #[tokio::test]
    async fn test_converts_and_creates_destination_dir() {
        let dir = TempDir::new().unwrap();
        let scheduler = BatchScheduler::new(
            SchedulerConfig::default().with_workers(2),
            MockConverter::new().with_duration(Duration::ZERO),
        );

        let result = scheduler
            .run(vec![task(dir.path(), "a"), task(dir.path(), "b")], None)
            .await;

        assert_eq!(result.converted, 2);
        assert!(dir.path().join("out").join("a.mp3").exists());
    }

    #[tokio::test]
    async fn test_duplicate_destination_is_skipped() {
        let dir = TempDir::new().unwrap();
        let first = task(dir.path(), "a");
        let mut second = task(dir.path(), "a-wav");
        second.destination = first.destination.clone();

        let scheduler = BatchScheduler::new(
            SchedulerConfig::default().with_workers(1),
            MockConverter::new().with_duration(Duration::ZERO),
        );
        let result = scheduler.run(vec![first, second], None).await;

        assert_eq!(result, BatchResult { converted: 1, skipped: 1, failed: 0 });
    }

    #[tokio::test]
    async fn test_failure_removes_partial_output_and_continues() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new()
            .with_duration(Duration::ZERO)
            .with_partial_output_on_failure(true);
        let bad = task(dir.path(), "bad");
        converter
            .fail_on(&bad.source, ConverterError::conversion_failed("exit 1", None))
            .await;

        let scheduler = BatchScheduler::new(SchedulerConfig::default().with_workers(1), converter);
        let result = scheduler.run(vec![bad.clone(), task(dir.path(), "good")], None).await;

        assert_eq!(result, BatchResult { converted: 1, skipped: 0, failed: 1 });
        assert!(!bad.destination.exists());
    }

    #[tokio::test]
    async fn test_panicking_converter_counts_as_failed() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new().with_duration(Duration::ZERO);
        let boom = task(dir.path(), "boom");
        converter.panic_on(&boom.source).await;

        let scheduler = BatchScheduler::new(SchedulerConfig::default().with_workers(2), converter);
        let result = scheduler.run(vec![boom, task(dir.path(), "ok")], None).await;

        assert_eq!(result, BatchResult { converted: 1, skipped: 0, failed: 1 });
    }

    #[tokio::test]
    async fn test_events_cover_every_task() {
        let dir = TempDir::new().unwrap();
        let existing = task(dir.path(), "done");
        std::fs::create_dir_all(existing.destination.parent().unwrap()).unwrap();
        std::fs::write(&existing.destination, b"ID3").unwrap();

        let scheduler = BatchScheduler::new(
            SchedulerConfig::default().with_workers(2),
            MockConverter::new().with_duration(Duration::from_millis(20)),
        );
        let (tx, mut rx) = mpsc::channel(256);
        let result = scheduler
            .run(vec![existing, task(dir.path(), "new")], Some(tx))
            .await;

        let mut discovered = None;
        let mut started = 0;
        let mut finished = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                BatchEvent::Discovered { total } => discovered = Some(total),
                BatchEvent::TaskStarted { .. } => started += 1,
                BatchEvent::TaskFinished { outcome, .. } => finished.push(outcome),
                BatchEvent::TaskProgress(_) => {}
            }
        }

        assert_eq!(discovered, Some(2));
        assert_eq!(started, 1);
        assert_eq!(finished.len(), 2);
        assert_eq!(result, BatchResult { converted: 1, skipped: 1, failed: 0 });
    }
}
