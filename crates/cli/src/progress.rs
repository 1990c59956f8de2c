//! Terminal progress rendering for batch and download events.

use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;

use metronome_core::converter::truncate_name;
use metronome_core::deps::DownloadProgress;
use metronome_core::scheduler::{BatchEvent, TaskOutcome};

const TASK_TEMPLATE: &str = "{msg:40} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}s";
const TOTAL_TEMPLATE: &str = "{msg:40} [{elapsed_precise}] [{bar:40.green/white}] {pos}/{len}";
const DOWNLOAD_TEMPLATE: &str =
    "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Renders the per-task bars and the "Total Files" bar.
///
/// A single instance consumes the scheduler's event channel, so every
/// display mutation happens on one task.
pub struct BatchRenderer {
    multi: MultiProgress,
    task_style: ProgressStyle,
    total_style: ProgressStyle,
    total: Option<ProgressBar>,
    bars: HashMap<PathBuf, ProgressBar>,
    in_flight: HashMap<PathBuf, PathBuf>,
}

impl BatchRenderer {
    pub fn new(multi: MultiProgress) -> Result<Self> {
        let task_style = ProgressStyle::with_template(TASK_TEMPLATE)
            .context("Invalid progress bar template")?
            .progress_chars("=> ");
        let total_style = ProgressStyle::with_template(TOTAL_TEMPLATE)
            .context("Invalid progress bar template")?
            .progress_chars("=> ");

        Ok(Self {
            multi,
            task_style,
            total_style,
            total: None,
            bars: HashMap::new(),
            in_flight: HashMap::new(),
        })
    }

    /// Consumes events until the scheduler drops its sender.
    ///
    /// Returns the destinations of tasks that started but never finished.
    pub async fn drive(mut self, mut rx: mpsc::Receiver<BatchEvent>) -> Vec<PathBuf> {
        while let Some(event) = rx.recv().await {
            self.handle(event);
        }
        self.finish()
    }

    pub fn handle(&mut self, event: BatchEvent) {
        match event {
            BatchEvent::Discovered { total } => {
                let bar = self.multi.add(ProgressBar::new(total as u64));
                bar.set_style(self.total_style.clone());
                bar.set_message("Total Files");
                self.total = Some(bar);
            }
            BatchEvent::TaskStarted { task, total_secs } => {
                let bar = ProgressBar::new(total_secs);
                let bar = match &self.total {
                    Some(total) => self.multi.insert_before(total, bar),
                    None => self.multi.add(bar),
                };
                bar.set_style(self.task_style.clone());
                bar.set_message(task.display_name());
                self.in_flight.insert(task.source.clone(), task.destination);
                self.bars.insert(task.source, bar);
            }
            BatchEvent::TaskProgress(progress) => {
                if let Some(bar) = self.bars.get(&progress.source) {
                    bar.set_position(progress.position_secs);
                }
            }
            BatchEvent::TaskFinished { task, outcome } => {
                self.in_flight.remove(&task.source);
                if let Some(bar) = self.bars.remove(&task.source) {
                    let label = match &outcome {
                        TaskOutcome::Converted { .. } => "Converted",
                        _ => "Failed",
                    };
                    let name = truncate_name(
                        &format!("{}: {}", label, task.output_name()),
                        metronome_core::converter::MAX_DISPLAY_NAME,
                    );
                    bar.set_message(name);
                    bar.finish_and_clear();
                }
                if let Some(total) = &self.total {
                    total.inc(1);
                }
            }
        }
    }

    /// Clears remaining bars and returns unfinished destinations.
    pub fn finish(mut self) -> Vec<PathBuf> {
        for (_, bar) in self.bars.drain() {
            bar.finish_and_clear();
        }
        if let Some(total) = self.total.take() {
            total.finish_and_clear();
        }
        self.in_flight.into_values().collect()
    }
}

/// Renders one byte-count bar per download.
pub struct DownloadRenderer {
    multi: MultiProgress,
    style: ProgressStyle,
}

impl DownloadRenderer {
    pub fn new(multi: MultiProgress) -> Result<Self> {
        let style = ProgressStyle::with_template(DOWNLOAD_TEMPLATE)
            .context("Invalid progress bar template")?
            .progress_chars("=> ");
        Ok(Self { multi, style })
    }

    pub async fn drive(self, label: String, mut rx: mpsc::Receiver<DownloadProgress>) {
        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(self.style);
        bar.set_message(label);

        while let Some(progress) = rx.recv().await {
            if let Some(total) = progress.total {
                bar.set_length(total);
            }
            bar.set_position(progress.downloaded);
        }
        bar.finish_and_clear();
    }
}
