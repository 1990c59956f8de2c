//! Input discovery.

use std::collections::BTreeSet;
use std::path::{Component, Path};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::converter::{ConversionTask, OutputFormat};
use crate::safety::{is_safe_filename, is_safe_path, normalize_path};

use super::error::SchedulerError;

/// Walks `input` and builds one task per file with a wanted extension.
///
/// The walk is sorted by file name so dispatch order is deterministic.
/// Destinations mirror the relative layout under `output` with the
/// extension replaced. Unsafe paths or names are excluded, as is anything
/// already under `output` when `output` is nested inside `input`. An input
/// root nested inside `output` is walked normally.
pub fn discover_tasks(
    input: &Path,
    output: &Path,
    extensions: &BTreeSet<String>,
    format: OutputFormat,
) -> Result<Vec<ConversionTask>, SchedulerError> {
    let input = normalize_path(input).ok_or_else(|| SchedulerError::UnsafeRoot {
        path: input.to_path_buf(),
    })?;
    let output = normalize_path(output).ok_or_else(|| SchedulerError::UnsafeRoot {
        path: output.to_path_buf(),
    })?;

    if !input.is_dir() {
        return Err(SchedulerError::InputNotFound { path: input });
    }

    let output_nested = output != input && output.starts_with(&input);
    let mut tasks = Vec::new();

    for entry in WalkDir::new(&input)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_symlink() {
            debug!(path = %entry.path().display(), "Skipping symlink");
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !has_wanted_extension(path, extensions) {
            continue;
        }

        if output_nested && path.starts_with(&output) {
            debug!(path = %path.display(), "Excluding file inside output root");
            continue;
        }

        let Ok(relative) = path.strip_prefix(&input) else {
            continue;
        };
        if !is_safe_path(&input, path) || !relative_is_safe(relative) {
            debug!(path = %path.display(), "Excluding unsafe path");
            continue;
        }

        let destination = output
            .join(relative)
            .with_extension(format.extension());
        if !is_safe_path(&output, &destination) {
            debug!(path = %destination.display(), "Excluding unsafe destination");
            continue;
        }

        tasks.push(ConversionTask::new(path.to_path_buf(), destination, format));
    }

    debug!(count = tasks.len(), input = %input.display(), "Discovery complete");
    Ok(tasks)
}

fn has_wanted_extension(path: &Path, extensions: &BTreeSet<String>) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.contains(&e.to_ascii_lowercase()))
        .unwrap_or(false)
}

/// Every component must be a plain, safe name.
fn relative_is_safe(relative: &Path) -> bool {
    relative.components().all(|c| match c {
        Component::Normal(name) => name.to_str().map(is_safe_filename).unwrap_or(false),
        _ => false,
    })
}
