//! Mock converter for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::converter::{
    ConversionProgress, ConversionResult, ConversionTask, Converter, ConverterError, MediaInfo,
};

/// Bytes written to the destination of a successful mock conversion.
const MOCK_OUTPUT: &[u8] = b"ID3mock";

/// A recorded conversion for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedConversion {
    /// The task that was submitted.
    pub task: ConversionTask,
    /// Whether the conversion succeeded.
    pub success: bool,
}

/// Mock implementation of the Converter trait.
///
/// Provides controllable behavior for testing:
/// - Track conversions for assertions
/// - Measure how many conversions overlapped
/// - Fail or panic for chosen sources
/// - Simulate progress updates
///
/// Successful conversions write a small file at the destination, so a second
/// run over the same tree sees every output as already present.
///
/// # Example
///
/// ```rust,ignore
/// use metronome_core::testing::MockConverter;
///
/// let converter = MockConverter::new().with_duration(Duration::from_millis(20));
/// converter.fail_on("/music/broken.flac", ConverterError::conversion_failed("exit 1", None)).await;
///
/// let scheduler = BatchScheduler::new(SchedulerConfig::default().with_workers(2), converter);
/// scheduler.run(tasks, None).await;
///
/// assert!(scheduler.converter().peak_concurrency() <= 2);
/// ```
#[derive(Debug)]
pub struct MockConverter {
    /// Recorded conversions.
    conversions: Arc<RwLock<Vec<RecordedConversion>>>,
    /// Pre-configured probe durations by path.
    probe_results: Arc<RwLock<HashMap<PathBuf, f64>>>,
    /// Errors returned by the conversion of specific sources.
    failures: Arc<RwLock<HashMap<PathBuf, ConverterError>>>,
    /// Sources whose conversion panics.
    panics: Arc<RwLock<HashSet<PathBuf>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<ConverterError>>>,
    /// Simulated conversion duration.
    conversion_duration: Duration,
    /// Whether to send progress updates during conversion.
    send_progress: bool,
    /// Whether a failing conversion leaves a truncated destination behind.
    partial_output_on_failure: bool,
    /// Conversions currently running.
    active: Arc<AtomicUsize>,
    /// Highest number of simultaneous conversions seen.
    peak: Arc<AtomicUsize>,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    /// Default probed duration in seconds.
    pub const DEFAULT_DURATION_SECS: f64 = 180.0;

    /// Create a new mock converter.
    pub fn new() -> Self {
        Self {
            conversions: Arc::new(RwLock::new(Vec::new())),
            probe_results: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            panics: Arc::new(RwLock::new(HashSet::new())),
            next_error: Arc::new(RwLock::new(None)),
            conversion_duration: Duration::from_millis(10),
            send_progress: true,
            partial_output_on_failure: false,
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the simulated conversion duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.conversion_duration = duration;
        self
    }

    /// Enable or disable progress updates during conversion.
    pub fn with_progress(mut self, send: bool) -> Self {
        self.send_progress = send;
        self
    }

    /// Leave a truncated destination behind when a conversion fails.
    pub fn with_partial_output_on_failure(mut self, partial: bool) -> Self {
        self.partial_output_on_failure = partial;
        self
    }

    /// Get all recorded conversions.
    pub async fn recorded_conversions(&self) -> Vec<RecordedConversion> {
        self.conversions.read().await.clone()
    }

    /// Get the number of conversions attempted.
    pub async fn conversion_count(&self) -> usize {
        self.conversions.read().await.len()
    }

    /// Highest number of conversions that ran at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Set the probed duration for a specific path.
    pub async fn set_probe_duration(&self, path: impl AsRef<Path>, duration_secs: f64) {
        self.probe_results
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), duration_secs);
    }

    /// Make the conversion of `source` fail with `error`.
    pub async fn fail_on(&self, source: impl AsRef<Path>, error: ConverterError) {
        self.failures
            .write()
            .await
            .insert(source.as_ref().to_path_buf(), error);
    }

    /// Make the conversion of `source` panic.
    pub async fn panic_on(&self, source: impl AsRef<Path>) {
        self.panics
            .write()
            .await
            .insert(source.as_ref().to_path_buf());
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: ConverterError) {
        *self.next_error.write().await = Some(error);
    }

    /// Take the next error if set.
    async fn take_error(&self) -> Option<ConverterError> {
        self.next_error.write().await.take()
    }

    async fn take_failure(&self, source: &Path) -> Option<ConverterError> {
        if let Some(err) = self.failures.write().await.remove(source) {
            return Some(err);
        }
        self.take_error().await
    }

    async fn run(
        &self,
        task: &ConversionTask,
        total_secs: u64,
        progress_tx: Option<mpsc::Sender<ConversionProgress>>,
    ) -> Result<ConversionResult, ConverterError> {
        let _active = ActiveGuard::enter(&self.active, &self.peak);

        if self.panics.read().await.contains(&task.source) {
            panic!("mock conversion panicked for {}", task.source.display());
        }

        let steps = 4u64;
        let step = self.conversion_duration / steps as u32;
        let mut position = 0;
        for i in 1..=steps {
            if !step.is_zero() {
                tokio::time::sleep(step).await;
            }
            if let (true, Some(tx)) = (self.send_progress, progress_tx.as_ref()) {
                let next = total_secs * i / steps;
                if next > position {
                    let _ = tx
                        .send(ConversionProgress {
                            source: task.source.clone(),
                            position_secs: next,
                            total_secs,
                            advanced_by: next - position,
                            speed: Some("10x".to_string()),
                        })
                        .await;
                    position = next;
                }
            }
        }

        if let Some(err) = self.take_failure(&task.source).await {
            if self.partial_output_on_failure {
                let _ = tokio::fs::write(&task.destination, &MOCK_OUTPUT[..1]).await;
            }
            self.conversions.write().await.push(RecordedConversion {
                task: task.clone(),
                success: false,
            });
            return Err(err);
        }

        tokio::fs::write(&task.destination, MOCK_OUTPUT).await?;
        self.conversions.write().await.push(RecordedConversion {
            task: task.clone(),
            success: true,
        });

        Ok(ConversionResult {
            source: task.source.clone(),
            destination: task.destination.clone(),
            output_size_bytes: MOCK_OUTPUT.len() as u64,
            duration_ms: self.conversion_duration.as_millis() as u64,
        })
    }
}

/// Tracks one running conversion and the peak overlap.
struct ActiveGuard<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ActiveGuard<'a> {
    fn enter(active: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConverterError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        let duration_secs = self
            .probe_results
            .read()
            .await
            .get(path)
            .copied()
            .unwrap_or(Self::DEFAULT_DURATION_SECS);

        Ok(MediaInfo {
            path: path.to_path_buf(),
            duration_secs,
        })
    }

    async fn convert(&self, task: &ConversionTask) -> Result<ConversionResult, ConverterError> {
        self.run(task, 0, None).await
    }

    async fn convert_with_progress(
        &self,
        task: &ConversionTask,
        total_secs: u64,
        progress_tx: mpsc::Sender<ConversionProgress>,
    ) -> Result<ConversionResult, ConverterError> {
        self.run(task, total_secs, Some(progress_tx)).await
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::OutputFormat;
    use tempfile::TempDir;

    fn create_test_task(dir: &Path, name: &str) -> ConversionTask {
        ConversionTask::new(
            dir.join(format!("{}.flac", name)),
            dir.join(format!("{}.mp3", name)),
            OutputFormat::Mp3,
        )
    }

    #[tokio::test]
    async fn test_basic_conversion_writes_output() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new().with_duration(Duration::ZERO);

        let task = create_test_task(dir.path(), "one");
        let result = converter.convert(&task).await.unwrap();

        assert_eq!(result.destination, task.destination);
        assert!(task.destination.exists());
        assert_eq!(converter.conversion_count().await, 1);
    }

    #[tokio::test]
    async fn test_custom_probe_duration() {
        let converter = MockConverter::new();
        converter.set_probe_duration("/custom/file.wav", 300.0).await;

        let info = converter.probe(Path::new("/custom/file.wav")).await.unwrap();
        assert_eq!(info.duration_secs, 300.0);

        let info = converter.probe(Path::new("/other.wav")).await.unwrap();
        assert_eq!(info.duration_secs, MockConverter::DEFAULT_DURATION_SECS);
    }

    #[tokio::test]
    async fn test_fail_on_records_failure() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new().with_duration(Duration::ZERO);
        let task = create_test_task(dir.path(), "bad");
        converter
            .fail_on(&task.source, ConverterError::conversion_failed("test error", None))
            .await;

        assert!(converter.convert(&task).await.is_err());
        assert!(!task.destination.exists());

        let conversions = converter.recorded_conversions().await;
        assert_eq!(conversions.len(), 1);
        assert!(!conversions[0].success);

        // Failure is consumed
        assert!(converter.convert(&task).await.is_ok());
    }

    #[tokio::test]
    async fn test_progress_updates_are_monotonic() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new().with_duration(Duration::from_millis(20));
        let (tx, mut rx) = mpsc::channel(10);

        let task = create_test_task(dir.path(), "progress");
        tokio::spawn(async move {
            converter.convert_with_progress(&task, 100, tx).await.unwrap();
        });

        let mut last = 0;
        let mut count = 0;
        while let Some(progress) = rx.recv().await {
            assert!(progress.position_secs > last);
            last = progress.position_secs;
            count += 1;
        }
        assert_eq!(count, 4);
        assert_eq!(last, 100);
    }

    #[tokio::test]
    async fn test_peak_concurrency_tracks_overlap() {
        let dir = TempDir::new().unwrap();
        let converter = Arc::new(MockConverter::new().with_duration(Duration::from_millis(40)));

        let a = create_test_task(dir.path(), "a");
        let b = create_test_task(dir.path(), "b");
        let (ra, rb) = tokio::join!(converter.convert(&a), converter.convert(&b));
        ra.unwrap();
        rb.unwrap();

        assert_eq!(converter.peak_concurrency(), 2);
    }
}
